//! Indicator store configuration

use crate::error::EngineError;
use crate::indicators::MacdPeriods;
use crate::Result;
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Candle size, indicator periods and repository retention
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorConfig {
    /// Candle size in minutes, folded from 1-minute klines
    pub candle_minutes: u32,
    /// RSI / WSMA period
    pub rsi_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    /// Mean average period
    pub mean_average_period: usize,
    /// Retention window in minutes; `None` keeps every snapshot
    pub retention_minutes: Option<u32>,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            candle_minutes: 15,
            rsi_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            mean_average_period: 20,
            retention_minutes: Some(30),
        }
    }
}

impl IndicatorConfig {
    /// Reject inconsistent settings before anything runs
    pub fn validate(&self) -> Result<()> {
        if self.candle_minutes == 0 {
            return Err(EngineError::Config("candle_minutes must be at least 1".into()));
        }
        if self.rsi_period == 0 || self.mean_average_period == 0 || self.macd_signal == 0 {
            return Err(EngineError::Config("indicator periods must be at least 1".into()));
        }
        if self.macd_fast == 0 || self.macd_fast >= self.macd_slow {
            return Err(EngineError::Config(format!(
                "macd_fast ({}) must be positive and below macd_slow ({})",
                self.macd_fast, self.macd_slow
            )));
        }
        if let Some(retention) = self.retention_minutes {
            // the previous candle must still be retrievable after each write
            if retention <= self.candle_minutes {
                return Err(EngineError::Config(format!(
                    "retention ({} min) must be longer than one candle ({} min)",
                    retention, self.candle_minutes
                )));
            }
        }
        Ok(())
    }

    pub fn candle_duration(&self) -> Duration {
        Duration::minutes(self.candle_minutes as i64)
    }

    pub fn retention(&self) -> Option<Duration> {
        self.retention_minutes.map(|m| Duration::minutes(m as i64))
    }

    pub fn macd_periods(&self) -> MacdPeriods {
        MacdPeriods {
            fast: self.macd_fast,
            slow: self.macd_slow,
            signal: self.macd_signal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        IndicatorConfig::default().validate().unwrap();
    }

    #[test]
    fn test_rejects_short_retention() {
        let config = IndicatorConfig {
            retention_minutes: Some(15),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(EngineError::Config(_))));

        let unbounded = IndicatorConfig {
            retention_minutes: None,
            ..Default::default()
        };
        unbounded.validate().unwrap();
    }

    #[test]
    fn test_rejects_inverted_macd() {
        let config = IndicatorConfig {
            macd_fast: 26,
            macd_slow: 12,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
