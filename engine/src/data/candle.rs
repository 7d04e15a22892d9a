//! OHLC candle data structures

use crate::data::time::{align_to_minute, is_minute_aligned};
use crate::error::EngineError;
use crate::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// OHLC candle covering whole minutes
///
/// `open_time` sits on second 0 and `close_time` on second 59 of the last
/// minute, so `close_time - open_time` is the candle size minus one second.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Opening price
    pub open: f64,
    /// Closing price
    pub close: f64,
    /// Low price
    pub low: f64,
    /// High price
    pub high: f64,
    /// First second of the candle
    pub open_time: DateTime<Utc>,
    /// Last second of the candle
    pub close_time: DateTime<Utc>,
}

impl Candle {
    /// Create a candle spanning `minutes` whole minutes from `open_time`
    pub fn new(
        open_time: DateTime<Utc>,
        minutes: u32,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    ) -> Result<Self> {
        if minutes == 0 {
            return Err(EngineError::InvalidCandle("candle size must be at least one minute".into()));
        }
        if !is_minute_aligned(open_time) {
            return Err(EngineError::InvalidCandle(format!(
                "open time {} is not minute aligned",
                open_time
            )));
        }
        if low > high || open < low || open > high || close < low || close > high {
            return Err(EngineError::InvalidCandle(format!(
                "prices out of range: o={} h={} l={} c={}",
                open, high, low, close
            )));
        }

        Ok(Self {
            open,
            close,
            low,
            high,
            open_time,
            close_time: open_time + Duration::minutes(minutes as i64) - Duration::seconds(1),
        })
    }

    /// Create a 1-minute candle
    pub fn one_minute(open_time: DateTime<Utc>, open: f64, high: f64, low: f64, close: f64) -> Result<Self> {
        Self::new(open_time, 1, open, high, low, close)
    }

    /// Fold a contiguous run of 1-minute candles into one multi-minute candle
    pub fn fold(run: &[Candle]) -> Result<Self> {
        let (first, last) = match (run.first(), run.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Err(EngineError::InvalidCandle("cannot fold an empty run".into())),
        };

        for pair in run.windows(2) {
            if pair[1].open_time != pair[0].close_time + Duration::seconds(1) {
                return Err(EngineError::InvalidCandle(format!(
                    "gap between {} and {}",
                    pair[0].close_time, pair[1].open_time
                )));
            }
        }

        let low = run.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
        let high = run.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);

        Ok(Self {
            open: first.open,
            close: last.close,
            low,
            high,
            open_time: first.open_time,
            close_time: last.close_time,
        })
    }

    /// Storage key: the minute boundary at which the candle closed
    pub fn key(&self) -> DateTime<Utc> {
        self.close_time + Duration::seconds(1)
    }

    /// Candle size in whole minutes
    pub fn minutes(&self) -> i64 {
        (self.key() - self.open_time).num_minutes()
    }

    /// Candle size as a duration
    pub fn duration(&self) -> Duration {
        self.key() - self.open_time
    }

    /// Check if candle closed below its open
    pub fn is_red(&self) -> bool {
        self.close < self.open
    }

    /// Check if candle closed above its open
    pub fn is_green(&self) -> bool {
        self.close > self.open
    }

    /// Signed move from open to close
    pub fn change(&self) -> f64 {
        self.close - self.open
    }

    /// Relative move from open to close (0.01 = 1%)
    pub fn change_ratio(&self) -> f64 {
        if self.open == 0.0 {
            0.0
        } else {
            self.change() / self.open
        }
    }

    /// Get body size (absolute difference between open and close)
    pub fn body_size(&self) -> f64 {
        self.change().abs()
    }

    /// Whether `time` falls inside the candle
    pub fn contains(&self, time: DateTime<Utc>) -> bool {
        time >= self.open_time && time <= self.close_time
    }

    /// Open time of the minute containing `time`
    pub fn minute_of(time: DateTime<Utc>) -> DateTime<Utc> {
        align_to_minute(time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_candle_bounds() {
        let candle = Candle::new(t0(), 15, 100.0, 110.0, 95.0, 105.0).unwrap();
        assert_eq!(candle.close_time, Utc.with_ymd_and_hms(2024, 3, 1, 12, 14, 59).unwrap());
        assert_eq!(candle.key(), Utc.with_ymd_and_hms(2024, 3, 1, 12, 15, 0).unwrap());
        assert_eq!(candle.minutes(), 15);
        assert!(candle.is_green());
        assert_eq!(candle.body_size(), 5.0);
    }

    #[test]
    fn test_rejects_unaligned_open() {
        let err = Candle::new(t0() + Duration::seconds(3), 1, 1.0, 1.0, 1.0, 1.0).unwrap_err();
        assert!(matches!(err, EngineError::InvalidCandle(_)));
    }

    #[test]
    fn test_fold_run() {
        let run = vec![
            Candle::one_minute(t0(), 10.0, 12.0, 9.0, 11.0).unwrap(),
            Candle::one_minute(t0() + Duration::minutes(1), 11.0, 15.0, 10.5, 14.0).unwrap(),
            Candle::one_minute(t0() + Duration::minutes(2), 14.0, 14.5, 8.0, 9.5).unwrap(),
        ];
        let folded = Candle::fold(&run).unwrap();
        assert_eq!(folded.open, 10.0);
        assert_eq!(folded.close, 9.5);
        assert_eq!(folded.low, 8.0);
        assert_eq!(folded.high, 15.0);
        assert_eq!(folded.minutes(), 3);
        assert!(folded.is_red());
    }

    #[test]
    fn test_fold_rejects_gap() {
        let run = vec![
            Candle::one_minute(t0(), 10.0, 12.0, 9.0, 11.0).unwrap(),
            Candle::one_minute(t0() + Duration::minutes(2), 11.0, 15.0, 10.5, 14.0).unwrap(),
        ];
        assert!(Candle::fold(&run).is_err());
        assert!(Candle::fold(&[]).is_err());
    }
}
