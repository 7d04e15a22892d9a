//! Human-readable audit trail of one bot generation

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    WaitingSignal,
    ValidatingRed,
    ValidatingMeanAverage,
    Forked,
    Waiting,
    ValidatingGreen,
    MacdConfirmation,
    Committed,
    TradeEntered,
    AwaitingExit,
    Finished,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::WaitingSignal => "waiting for signal",
            Phase::ValidatingRed => "validating red candle",
            Phase::ValidatingMeanAverage => "validating mean average",
            Phase::Forked => "forked",
            Phase::Waiting => "waiting",
            Phase::ValidatingGreen => "validating green candle",
            Phase::MacdConfirmation => "waiting for MACD turn",
            Phase::Committed => "committed",
            Phase::TradeEntered => "trade entered",
            Phase::AwaitingExit => "awaiting exit",
            Phase::Finished => "finished",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseEntry {
    pub time: DateTime<Utc>,
    pub phase: Phase,
    pub message: String,
}

/// Append-only list of phase entries
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PhaseLog {
    entries: Vec<PhaseEntry>,
}

impl PhaseLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, time: DateTime<Utc>, phase: Phase, message: impl Into<String>) {
        self.entries.push(PhaseEntry {
            time,
            phase,
            message: message.into(),
        });
    }

    pub fn entries(&self) -> &[PhaseEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&PhaseEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for PhaseLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{} [{}] {}", entry.time.format("%Y-%m-%d %H:%M:%S"), entry.phase, entry.message)?;
        }
        Ok(())
    }
}
