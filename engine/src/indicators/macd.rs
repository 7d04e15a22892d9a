//! MACD (Moving Average Convergence Divergence) recurrence

use crate::indicators::ema::next_ema;
use serde::{Deserialize, Serialize};

/// MACD components stored per candle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Macd {
    pub fast_ema: f64,
    pub slow_ema: f64,
    pub signal: f64,
    pub histogram: f64,
}

impl Macd {
    /// First observation: both EMAs start at the close, signal at zero
    pub fn bootstrap(close: f64) -> Self {
        Self {
            fast_ema: close,
            slow_ema: close,
            signal: 0.0,
            histogram: 0.0,
        }
    }

    /// MACD line (fast EMA - slow EMA)
    pub fn line(&self) -> f64 {
        self.fast_ema - self.slow_ema
    }

    pub fn is_negative(&self) -> bool {
        self.histogram < 0.0
    }
}

/// EMA periods for the MACD family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacdPeriods {
    pub fast: usize,
    pub slow: usize,
    pub signal: usize,
}

impl Default for MacdPeriods {
    fn default() -> Self {
        Self {
            fast: 12,
            slow: 26,
            signal: 9,
        }
    }
}

/// Next MACD snapshot from the snapshot one candle earlier
pub fn next_macd(previous: Option<&Macd>, close: f64, periods: MacdPeriods) -> Macd {
    let previous = match previous {
        Some(previous) => previous,
        None => return Macd::bootstrap(close),
    };

    let fast_ema = next_ema(close, previous.fast_ema, periods.fast);
    let slow_ema = next_ema(close, previous.slow_ema, periods.slow);
    let diff = fast_ema - slow_ema;
    let signal = next_ema(diff, previous.signal, periods.signal);

    Macd {
        fast_ema,
        slow_ema,
        signal,
        histogram: diff - signal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrap() {
        let macd = next_macd(None, 250.0, MacdPeriods::default());
        assert_eq!(macd, Macd::bootstrap(250.0));
        assert_eq!(macd.histogram, 0.0);
        assert_eq!(macd.line(), 0.0);
    }

    #[test]
    fn test_flat_market_stays_flat() {
        let periods = MacdPeriods::default();
        let mut macd = next_macd(None, 100.0, periods);
        for _ in 0..50 {
            macd = next_macd(Some(&macd), 100.0, periods);
        }
        assert_eq!(macd, Macd::bootstrap(100.0));
    }

    #[test]
    fn test_linear_trend_converges_to_closed_form() {
        // an EMA of a line with slope k lags by k * (N - 1) / 2, so the MACD
        // line settles at k * (slow - fast) / 2 and the histogram at zero
        let periods = MacdPeriods::default();
        let slope = 0.5;
        let mut macd = next_macd(None, 100.0, periods);
        for step in 1..600 {
            macd = next_macd(Some(&macd), 100.0 + slope * step as f64, periods);
        }

        let expected_line = slope * (periods.slow - periods.fast) as f64 / 2.0;
        assert!((macd.line() - expected_line).abs() < 1e-6);
        assert!((macd.signal - expected_line).abs() < 1e-6);
        assert!(macd.histogram.abs() < 1e-6);
    }

    #[test]
    fn test_sell_off_turns_histogram_negative() {
        let periods = MacdPeriods::default();
        let mut macd = next_macd(None, 100.0, periods);
        for step in 1..10 {
            macd = next_macd(Some(&macd), 100.0 - step as f64, periods);
        }
        assert!(macd.is_negative());
    }
}
