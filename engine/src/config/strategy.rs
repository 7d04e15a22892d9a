//! Strategy configuration

use crate::config::IndicatorConfig;
use crate::error::EngineError;
use crate::Result;
use serde::{Deserialize, Serialize};

/// How an open trade is watched until it hits take-profit or stop-loss
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExitWatch {
    /// Sample the last price
    Price,
    /// Sample the current candle's low/high
    Candle,
}

/// Thresholds, cadences and delays of the phase strategy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// RSI must be below this for an entry signal
    pub max_rsi: f64,
    /// Capacity of the price/RSI lookback queue
    pub signal_queue_capacity: usize,
    /// Minimum age of the earlier sample in a divergence match (seconds)
    pub signal_min_age_secs: u64,
    /// Cadence of price sampling (seconds)
    pub price_poll_secs: u64,
    /// Cadence of RSI / MACD / candle sampling (seconds)
    pub indicator_poll_secs: u64,
    /// Cadence of order status polling (seconds)
    pub order_poll_secs: u64,
    pub order_poll_max_iterations: u32,
    pub macd_poll_max_iterations: u32,
    /// Delay before retrying the signal phase when the candle is not red
    pub retry_delay_secs: u64,
    /// How long a parent waits after forking before its green check
    pub fork_wait_secs: u64,
    /// Depth of the fork tree; the deepest generation no longer forks
    pub max_generations: u32,
    /// Minimum close-over-open rise for a green candle (0.005 = 0.5%)
    pub green_candle_min_rise: f64,
    /// Require the MACD histogram to turn non-negative before committing
    pub macd_confirmation: bool,
    /// Require the price to sit below the mean average after a red candle
    pub require_price_below_mean_average: bool,
    pub exit_watch: ExitWatch,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            max_rsi: 35.0,
            signal_queue_capacity: 30,
            signal_min_age_secs: 900,
            price_poll_secs: 10,
            indicator_poll_secs: 60,
            order_poll_secs: 5,
            order_poll_max_iterations: 12,
            macd_poll_max_iterations: 15,
            retry_delay_secs: 60,
            fork_wait_secs: 900,
            max_generations: 5,
            green_candle_min_rise: 0.005,
            macd_confirmation: false,
            require_price_below_mean_average: false,
            exit_watch: ExitWatch::Price,
        }
    }
}

impl StrategyConfig {
    /// Reject settings inconsistent with themselves or with the candle size
    pub fn validate(&self, indicators: &IndicatorConfig) -> Result<()> {
        if self.price_poll_secs == 0 || self.order_poll_secs == 0 {
            return Err(EngineError::Config("polling intervals must be positive".into()));
        }
        // indicator snapshots change once a minute
        if self.indicator_poll_secs == 0 || self.indicator_poll_secs % 60 != 0 {
            return Err(EngineError::Config(format!(
                "indicator_poll_secs ({}) must be a positive multiple of 60",
                self.indicator_poll_secs
            )));
        }
        let candle_secs = indicators.candle_minutes as u64 * 60;
        if self.indicator_poll_secs > candle_secs {
            return Err(EngineError::Config(format!(
                "indicator_poll_secs ({}) exceeds the candle size ({} s)",
                self.indicator_poll_secs, candle_secs
            )));
        }
        if self.signal_queue_capacity == 0 {
            return Err(EngineError::Config("signal_queue_capacity must be at least 1".into()));
        }
        if self.max_generations == 0 {
            return Err(EngineError::Config("max_generations must be at least 1".into()));
        }
        if self.order_poll_max_iterations == 0 || self.macd_poll_max_iterations == 0 {
            return Err(EngineError::Config("iteration caps must be at least 1".into()));
        }
        if self.green_candle_min_rise < 0.0 {
            return Err(EngineError::Config("green_candle_min_rise must not be negative".into()));
        }
        if !(0.0..=100.0).contains(&self.max_rsi) {
            return Err(EngineError::Config(format!("max_rsi ({}) must be within 0..=100", self.max_rsi)));
        }
        Ok(())
    }
}
