//! CSV persistence of indicator snapshots, replay candles and bot results
//!
//! Records are plain serde rows converted explicitly to and from the
//! in-memory types. Exports merge with an existing file: rows already present
//! (by equality) are kept once.

use crate::bot::BotResultDetails;
use crate::data::{Candle, IndicatorSnapshot, IndicatorStore};
use crate::exchange::ReplayFeed;
use crate::indicators::{Macd, Wsma};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// One indicator snapshot row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorRecord {
    pub symbol: String,
    pub time: DateTime<Utc>,
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub wsma_up: f64,
    pub wsma_down: f64,
    pub rsi: f64,
    pub fast_ema: f64,
    pub slow_ema: f64,
    pub macd_signal: f64,
    pub macd_histogram: f64,
    pub mean_average: f64,
}

impl IndicatorRecord {
    pub fn from_snapshot(symbol: &str, snapshot: &IndicatorSnapshot) -> Self {
        Self {
            symbol: symbol.to_string(),
            time: snapshot.time,
            open_time: snapshot.candle.open_time,
            close_time: snapshot.candle.close_time,
            open: snapshot.candle.open,
            high: snapshot.candle.high,
            low: snapshot.candle.low,
            close: snapshot.candle.close,
            wsma_up: snapshot.wsma.up,
            wsma_down: snapshot.wsma.down,
            rsi: snapshot.rsi,
            fast_ema: snapshot.macd.fast_ema,
            slow_ema: snapshot.macd.slow_ema,
            macd_signal: snapshot.macd.signal,
            macd_histogram: snapshot.macd.histogram,
            mean_average: snapshot.mean_average,
        }
    }

    pub fn to_snapshot(&self) -> Result<IndicatorSnapshot> {
        let minutes = (self.close_time - self.open_time).num_minutes() + 1;
        let candle = Candle::new(self.open_time, minutes as u32, self.open, self.high, self.low, self.close)?;
        Ok(IndicatorSnapshot {
            time: self.time,
            candle,
            wsma: Wsma {
                up: self.wsma_up,
                down: self.wsma_down,
            },
            rsi: self.rsi,
            macd: Macd {
                fast_ema: self.fast_ema,
                slow_ema: self.slow_ema,
                signal: self.macd_signal,
                histogram: self.macd_histogram,
            },
            mean_average: self.mean_average,
        })
    }
}

/// One 1-minute candle row for replay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandleRecord {
    pub symbol: String,
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// One bot result row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub currency: String,
    pub age: u32,
    pub result: String,
    pub end_time: DateTime<Utc>,
    pub buy_price: Option<f64>,
    pub sell_price: Option<f64>,
    pub stop_loss_limit_price: Option<f64>,
    pub quantity: Option<f64>,
    pub exit_price: Option<f64>,
    pub error: Option<String>,
}

impl From<&BotResultDetails> for ResultRecord {
    fn from(details: &BotResultDetails) -> Self {
        Self {
            currency: details.currency.clone(),
            age: details.age,
            result: details.result.to_string(),
            end_time: details.end_time,
            buy_price: details.trade.map(|t| t.buy_price),
            sell_price: details.trade.map(|t| t.sell_price),
            stop_loss_limit_price: details.trade.map(|t| t.stop_loss_limit_price),
            quantity: details.trade.map(|t| t.quantity),
            exit_price: details.exit_price,
            error: details.error.clone(),
        }
    }
}

fn read_records<R: DeserializeOwned>(path: &Path) -> Result<Vec<R>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut records = Vec::new();
    for record in reader.deserialize() {
        records.push(record?);
    }
    Ok(records)
}

/// Write `records` merged with whatever `path` already holds
///
/// Returns the number of rows that were not already present.
fn merge_write<R>(path: &Path, records: Vec<R>) -> Result<usize>
where
    R: Serialize + DeserializeOwned + PartialEq,
{
    let mut merged: Vec<R> = if path.exists() { read_records(path)? } else { Vec::new() };
    let mut added = 0;
    for record in records {
        if !merged.contains(&record) {
            merged.push(record);
            added += 1;
        }
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    for record in &merged {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(added)
}

/// Export every complete snapshot in the store
pub fn export_store(store: &IndicatorStore, path: &Path) -> Result<usize> {
    let mut records = Vec::new();
    for symbol in store.symbols() {
        records.extend(
            store
                .snapshots(&symbol)
                .iter()
                .map(|snapshot| IndicatorRecord::from_snapshot(&symbol, snapshot)),
        );
    }
    let total = records.len();
    let added = merge_write(path, records)?;
    info!(path = %path.display(), total, added, "indicator store exported");
    Ok(added)
}

/// Load exported snapshots back into a store
pub fn restore_store(store: &IndicatorStore, path: &Path) -> Result<usize> {
    let records: Vec<IndicatorRecord> = read_records(path)?;
    for record in &records {
        store.store(&record.symbol, record.to_snapshot()?);
    }
    info!(path = %path.display(), records = records.len(), "indicator store restored");
    Ok(records.len())
}

/// Load 1-minute candles into a replay feed
pub fn load_candles(path: &Path) -> Result<ReplayFeed> {
    let records: Vec<CandleRecord> = read_records(path)?;
    let mut feed = ReplayFeed::new();
    for record in records {
        let candle = Candle::one_minute(record.open_time, record.open, record.high, record.low, record.close)?;
        feed.insert(&record.symbol, candle)?;
    }
    Ok(feed)
}

/// Write 1-minute candles for later replay
pub fn save_candles(path: &Path, symbol: &str, candles: &[Candle]) -> Result<usize> {
    let records = candles
        .iter()
        .map(|candle| CandleRecord {
            symbol: symbol.to_string(),
            open_time: candle.open_time,
            open: candle.open,
            high: candle.high,
            low: candle.low,
            close: candle.close,
        })
        .collect();
    merge_write(path, records)
}

pub fn export_results(results: &[BotResultDetails], path: &Path) -> Result<usize> {
    let added = merge_write(path, results.iter().map(ResultRecord::from).collect())?;
    info!(path = %path.display(), added, "results exported");
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndicatorConfig;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn store_with(closes: &[f64]) -> IndicatorStore {
        let store = IndicatorStore::new(IndicatorConfig {
            candle_minutes: 1,
            retention_minutes: None,
            ..Default::default()
        })
        .unwrap();
        for (i, close) in closes.iter().enumerate() {
            let candle = Candle::one_minute(t0() + Duration::minutes(i as i64), 100.0, 110.0, 90.0, *close).unwrap();
            store.apply("BTCUSDT", &candle).unwrap();
        }
        store
    }

    #[test]
    fn test_export_merges_by_equality() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.csv");

        assert_eq!(export_store(&store_with(&[101.0, 99.0]), &path).unwrap(), 2);
        // the first two rows are identical, only the third is new
        assert_eq!(export_store(&store_with(&[101.0, 99.0, 105.0]), &path).unwrap(), 1);

        let records: Vec<IndicatorRecord> = read_records(&path).unwrap();
        assert_eq!(records.len(), 3);
    }

    #[test]
    fn test_restore_round_trips_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.csv");
        let original = store_with(&[101.0, 99.0, 105.0]);
        export_store(&original, &path).unwrap();

        let restored = IndicatorStore::new(original.config().clone()).unwrap();
        assert_eq!(restore_store(&restored, &path).unwrap(), 3);

        let time = t0() + Duration::minutes(3);
        assert_eq!(
            restored.snapshot("BTCUSDT", time).unwrap(),
            original.snapshot("BTCUSDT", time).unwrap()
        );
    }

    #[test]
    fn test_candles_load_into_feed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("candles.csv");
        let candles: Vec<Candle> = (0..3)
            .map(|i| Candle::one_minute(t0() + Duration::minutes(i), 1.0, 2.0, 0.5, 1.5).unwrap())
            .collect();

        save_candles(&path, "ETHUSDT", &candles).unwrap();
        let feed = load_candles(&path).unwrap();

        assert_eq!(feed.symbols(), vec!["ETHUSDT".to_string()]);
        assert_eq!(feed.range("ETHUSDT"), Some((t0(), t0() + Duration::minutes(3))));
    }
}
