//! Indicator store: the repositories of one symbol universe plus the updaters

use crate::config::IndicatorConfig;
use crate::data::{Candle, Repository};
use crate::error::EngineError;
use crate::indicators::{next_macd, next_mean_average, next_wsma, rsi, Macd, Wsma};
use crate::Result;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::debug;

/// Everything computed for one symbol at one time key
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IndicatorSnapshot {
    pub time: DateTime<Utc>,
    pub candle: Candle,
    pub wsma: Wsma,
    pub rsi: f64,
    pub macd: Macd,
    pub mean_average: f64,
}

/// Candle, WSMA, RSI, MACD and mean-average repositories
///
/// Written by exactly one storage worker per symbol, read by any number of
/// bot generations.
#[derive(Debug)]
pub struct IndicatorStore {
    config: IndicatorConfig,
    candles: Repository<Candle>,
    wsma: Repository<Wsma>,
    rsi: Repository<f64>,
    macd: Repository<Macd>,
    mean_average: Repository<f64>,
}

impl IndicatorStore {
    pub fn new(config: IndicatorConfig) -> Result<Self> {
        config.validate()?;
        let retention = config.retention();
        Ok(Self {
            candles: Repository::with_retention("candle", retention),
            wsma: Repository::with_retention("wsma", retention),
            rsi: Repository::with_retention("rsi", retention),
            macd: Repository::with_retention("macd", retention),
            mean_average: Repository::with_retention("mean_average", retention),
            config,
        })
    }

    pub fn config(&self) -> &IndicatorConfig {
        &self.config
    }

    pub fn candle_duration(&self) -> Duration {
        self.config.candle_duration()
    }

    /// Compute and store every indicator for a newly closed candle
    ///
    /// Each recurrence reads the snapshot exactly one candle earlier and
    /// bootstraps when it is absent.
    pub fn apply(&self, symbol: &str, candle: &Candle) -> Result<IndicatorSnapshot> {
        if candle.minutes() != self.config.candle_minutes as i64 {
            return Err(EngineError::InvalidCandle(format!(
                "expected a {}-minute candle, got {} minutes",
                self.config.candle_minutes,
                candle.minutes()
            )));
        }

        let time = candle.key();
        let previous = time - self.candle_duration();

        let wsma = next_wsma(
            self.wsma.try_get(symbol, previous).as_ref(),
            candle,
            self.config.rsi_period,
        );
        let rsi_value = rsi(&wsma);
        let macd = next_macd(
            self.macd.try_get(symbol, previous).as_ref(),
            candle.close,
            self.config.macd_periods(),
        );
        let mean_average = next_mean_average(
            self.mean_average.try_get(symbol, previous),
            candle.close,
            self.config.mean_average_period,
        );

        self.store(symbol, IndicatorSnapshot {
            time,
            candle: *candle,
            wsma,
            rsi: rsi_value,
            macd,
            mean_average,
        });

        debug!(symbol = %symbol, %time, rsi = rsi_value, histogram = macd.histogram, "indicators updated");

        Ok(IndicatorSnapshot {
            time,
            candle: *candle,
            wsma,
            rsi: rsi_value,
            macd,
            mean_average,
        })
    }

    /// Write a precomputed snapshot into every repository
    ///
    /// The candle goes in last: a reader that finds the candle at a key
    /// also finds its indicators.
    pub fn store(&self, symbol: &str, snapshot: IndicatorSnapshot) {
        self.wsma.add(symbol, snapshot.time, snapshot.wsma);
        self.rsi.add(symbol, snapshot.time, snapshot.rsi);
        self.macd.add(symbol, snapshot.time, snapshot.macd);
        self.mean_average.add(symbol, snapshot.time, snapshot.mean_average);
        self.candles.add(symbol, snapshot.time, snapshot.candle);
    }

    /// Full snapshot at an exact key
    pub fn snapshot(&self, symbol: &str, time: DateTime<Utc>) -> Result<IndicatorSnapshot> {
        Ok(IndicatorSnapshot {
            time,
            candle: self.candles.get(symbol, time)?,
            wsma: self.wsma.get(symbol, time)?,
            rsi: self.rsi.get(symbol, time)?,
            macd: self.macd.get(symbol, time)?,
            mean_average: self.mean_average.get(symbol, time)?,
        })
    }

    /// Every complete snapshot of a symbol, oldest first
    pub fn snapshots(&self, symbol: &str) -> Vec<IndicatorSnapshot> {
        self.candles
            .keys(symbol)
            .into_iter()
            .filter_map(|time| self.snapshot(symbol, time).ok())
            .collect()
    }

    pub fn symbols(&self) -> Vec<String> {
        self.candles.symbols()
    }

    pub fn candles(&self) -> &Repository<Candle> {
        &self.candles
    }

    pub fn wsma(&self) -> &Repository<Wsma> {
        &self.wsma
    }

    pub fn rsi(&self) -> &Repository<f64> {
        &self.rsi
    }

    pub fn macd(&self) -> &Repository<Macd> {
        &self.macd
    }

    pub fn mean_average(&self) -> &Repository<f64> {
        &self.mean_average
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn config() -> IndicatorConfig {
        IndicatorConfig {
            candle_minutes: 3,
            retention_minutes: Some(6),
            ..Default::default()
        }
    }

    fn candle(offset: i64, open: f64, close: f64) -> Candle {
        Candle::new(
            start() + Duration::minutes(offset),
            3,
            open,
            open.max(close),
            open.min(close),
            close,
        )
        .unwrap()
    }

    #[test]
    fn test_first_candle_bootstraps() {
        let store = IndicatorStore::new(config()).unwrap();
        let snapshot = store.apply("BTCUSDT", &candle(0, 100.0, 97.0)).unwrap();

        assert_eq!(snapshot.time, start() + Duration::minutes(3));
        assert_eq!(snapshot.wsma, Wsma { up: 0.0, down: 3.0 });
        assert_eq!(snapshot.macd, Macd::bootstrap(97.0));
        assert_eq!(snapshot.mean_average, 97.0);
        assert_eq!(store.rsi().get("BTCUSDT", snapshot.time).unwrap(), snapshot.rsi);
    }

    #[test]
    fn test_recurrence_uses_snapshot_one_candle_earlier() {
        let store = IndicatorStore::new(config()).unwrap();
        let first = store.apply("BTCUSDT", &candle(0, 100.0, 97.0)).unwrap();
        // rolling candle one minute later has no predecessor at key - 3 min
        let rolling = store.apply("BTCUSDT", &candle(1, 99.0, 98.0)).unwrap();
        assert_eq!(rolling.wsma, Wsma { up: 0.0, down: 1.0 });

        let next = store.apply("BTCUSDT", &candle(3, 97.0, 99.0)).unwrap();
        let period = config().rsi_period as f64;
        assert!((next.wsma.up - 2.0 / period).abs() < 1e-12);
        assert!((next.wsma.down - first.wsma.down * (1.0 - 1.0 / period)).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_wrong_candle_size() {
        let store = IndicatorStore::new(config()).unwrap();
        let one_minute = Candle::one_minute(start(), 1.0, 1.0, 1.0, 1.0).unwrap();
        assert!(store.apply("BTCUSDT", &one_minute).is_err());
    }

    #[test]
    fn test_eviction_applies_to_every_repository() {
        let store = IndicatorStore::new(config()).unwrap();
        for offset in 0..20 {
            store.apply("BTCUSDT", &candle(offset, 100.0, 100.0 + offset as f64)).unwrap();
        }
        let latest = start() + Duration::minutes(22);
        assert_eq!(store.rsi().len("BTCUSDT"), 6);
        assert!(store.macd().get("BTCUSDT", latest - Duration::minutes(6)).is_err());
        assert!(store.snapshot("BTCUSDT", latest - Duration::minutes(5)).is_ok());
        assert_eq!(store.snapshots("BTCUSDT").len(), 6);
    }

    #[test]
    fn test_visible_candle_has_its_indicators() {
        let store = IndicatorStore::new(IndicatorConfig {
            candle_minutes: 1,
            retention_minutes: None,
            ..Default::default()
        })
        .unwrap();
        let candles: Vec<Candle> = (0..500)
            .map(|i| {
                let open = 100.0 + (i % 7) as f64;
                Candle::one_minute(start() + Duration::minutes(i), open, open + 1.0, open - 1.0, open + 0.5).unwrap()
            })
            .collect();

        std::thread::scope(|s| {
            s.spawn(|| {
                for candle in &candles {
                    store.apply("BTCUSDT", candle).unwrap();
                }
            });
            s.spawn(|| {
                for candle in &candles {
                    let key = candle.key();
                    while store.candles().try_get("BTCUSDT", key).is_none() {
                        std::hint::spin_loop();
                    }
                    assert!(store.wsma().try_get("BTCUSDT", key).is_some());
                    assert!(store.rsi().try_get("BTCUSDT", key).is_some());
                    assert!(store.macd().try_get("BTCUSDT", key).is_some());
                    assert!(store.mean_average().try_get("BTCUSDT", key).is_some());
                }
            });
        });
    }
}
