//! Terminal result of one bot generation

use crate::exchange::BuyAndSellTradeInfo;
use crate::phase::PhaseLog;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BotResult {
    Win,
    Loss,
    Even,
    Faulted,
}

impl BotResult {
    /// Classify a closed trade by its exit price
    pub fn from_exit(buy_price: f64, exit_price: f64) -> Self {
        if exit_price > buy_price {
            BotResult::Win
        } else if exit_price < buy_price {
            BotResult::Loss
        } else {
            BotResult::Even
        }
    }
}

impl fmt::Display for BotResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BotResult::Win => "Win",
            BotResult::Loss => "Loss",
            BotResult::Even => "Even",
            BotResult::Faulted => "Faulted",
        };
        f.write_str(name)
    }
}

/// Created once at a generation's terminal transition, never mutated
#[derive(Debug, Clone, Serialize)]
pub struct BotResultDetails {
    pub currency: String,
    pub age: u32,
    pub result: BotResult,
    pub end_time: DateTime<Utc>,
    pub phase_log: PhaseLog,
    pub trade: Option<BuyAndSellTradeInfo>,
    pub exit_price: Option<f64>,
    pub error: Option<String>,
}

impl BotResultDetails {
    /// Realised quote PnL of the trade, zero without one
    pub fn profit(&self, quote_precision: u32) -> f64 {
        match (self.trade, self.exit_price) {
            (Some(trade), Some(exit)) => {
                crate::config::round_to(trade.quantity * (exit - trade.buy_price), quote_precision)
            }
            _ => 0.0,
        }
    }
}

impl fmt::Display for BotResultDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (age {}): {} at {}",
            self.currency,
            self.age,
            self.result,
            self.end_time.format("%Y-%m-%d %H:%M")
        )?;
        if let (Some(trade), Some(exit)) = (self.trade, self.exit_price) {
            write!(f, ", bought {:.5} at {} and sold at {}", trade.quantity, trade.buy_price, exit)?;
        }
        if let Some(error) = &self.error {
            write!(f, ", error: {error}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_exit() {
        assert_eq!(BotResult::from_exit(100.0, 101.0), BotResult::Win);
        assert_eq!(BotResult::from_exit(100.0, 98.9), BotResult::Loss);
        assert_eq!(BotResult::from_exit(100.0, 100.0), BotResult::Even);
    }
}
