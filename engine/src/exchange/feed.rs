//! Market data feeds: replayed history and the public Binance REST API

use crate::data::{align_to_minute, Candle};
use crate::error::EngineError;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Read-only source of prices and 1-minute candles
#[async_trait]
pub trait MarketFeed: Send + Sync {
    /// Last traded price as of `time`
    async fn price(&self, symbol: &str, time: DateTime<Utc>) -> Result<f64>;

    /// Up to `limit` 1-minute candles closed by `end`, oldest first
    async fn klines(&self, symbol: &str, end: DateTime<Utc>, limit: usize) -> Result<Vec<Candle>>;

    /// 1-minute candles opened at or after `from` and closed by `to`
    async fn candles_between(
        &self,
        symbol: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>>;
}

/// In-memory 1-minute history, keyed by open time
#[derive(Debug, Clone, Default)]
pub struct ReplayFeed {
    candles: HashMap<String, BTreeMap<DateTime<Utc>, Candle>>,
}

impl ReplayFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_candles(symbol: &str, candles: impl IntoIterator<Item = Candle>) -> Result<Self> {
        let mut feed = Self::new();
        feed.extend(symbol, candles)?;
        Ok(feed)
    }

    pub fn insert(&mut self, symbol: &str, candle: Candle) -> Result<()> {
        if candle.minutes() != 1 {
            return Err(EngineError::InvalidCandle(format!(
                "replay feeds hold 1-minute candles, got {} minutes",
                candle.minutes()
            )));
        }
        self.candles
            .entry(symbol.to_string())
            .or_default()
            .insert(candle.open_time, candle);
        Ok(())
    }

    pub fn extend(&mut self, symbol: &str, candles: impl IntoIterator<Item = Candle>) -> Result<()> {
        for candle in candles {
            self.insert(symbol, candle)?;
        }
        Ok(())
    }

    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.candles.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    /// Open time of the first and key of the last candle
    pub fn range(&self, symbol: &str) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let series = self.candles.get(symbol)?;
        let first = series.values().next()?;
        let last = series.values().next_back()?;
        Some((first.open_time, last.key()))
    }

    fn series(&self, symbol: &str, time: DateTime<Utc>) -> Result<&BTreeMap<DateTime<Utc>, Candle>> {
        let series = self
            .candles
            .get(symbol)
            .ok_or_else(|| EngineError::Exchange(format!("no replay data for {symbol}")))?;
        // the next candle would already be closed past this point
        let exhausted = series
            .values()
            .next_back()
            .map_or(true, |last| time >= last.key() + Duration::minutes(1));
        if exhausted {
            return Err(EngineError::DataExhausted {
                symbol: symbol.to_string(),
                time,
            });
        }
        Ok(series)
    }
}

#[async_trait]
impl MarketFeed for ReplayFeed {
    async fn price(&self, symbol: &str, time: DateTime<Utc>) -> Result<f64> {
        let series = self.series(symbol, time)?;
        series
            .range(..=time - Duration::minutes(1))
            .next_back()
            .map(|(_, candle)| candle.close)
            .ok_or_else(|| EngineError::Exchange(format!("no price for {symbol} before {time}")))
    }

    async fn klines(&self, symbol: &str, end: DateTime<Utc>, limit: usize) -> Result<Vec<Candle>> {
        let series = self.series(symbol, end)?;
        let mut candles: Vec<Candle> = series
            .range(..=end - Duration::minutes(1))
            .rev()
            .take(limit)
            .map(|(_, candle)| *candle)
            .collect();
        candles.reverse();
        Ok(candles)
    }

    async fn candles_between(
        &self,
        symbol: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>> {
        let Some(series) = self.candles.get(symbol) else {
            return Ok(Vec::new());
        };
        let last_open = to - Duration::minutes(1);
        if last_open < from {
            return Ok(Vec::new());
        }
        Ok(series.range(from..=last_open).map(|(_, candle)| *candle).collect())
    }
}

/// Public Binance spot endpoints; no credentials needed
#[derive(Debug, Clone)]
pub struct BinanceFeed {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct TickerPrice {
    price: String,
}

impl BinanceFeed {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.binance.com";

    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn fetch_klines(&self, symbol: &str, params: &[(&str, String)]) -> Result<Vec<Candle>> {
        let url = format!("{}/api/v3/klines", self.base_url);
        let mut query = vec![("symbol", symbol.to_uppercase()), ("interval", "1m".to_string())];
        query.extend(params.iter().cloned());

        let rows: Vec<Vec<serde_json::Value>> = self
            .client
            .get(&url)
            .query(&query)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        debug!(symbol = %symbol, rows = rows.len(), "fetched klines");
        rows.iter().map(|row| parse_kline(row)).collect()
    }
}

/// One kline row: `[openTime, open, high, low, close, ...]`
fn parse_kline(row: &[serde_json::Value]) -> Result<Candle> {
    let number = |index: usize| -> Result<f64> {
        row.get(index)
            .and_then(|v| v.as_str())
            .and_then(|v| v.parse::<f64>().ok())
            .ok_or_else(|| EngineError::Exchange(format!("malformed kline field {index}")))
    };
    let open_ms = row
        .first()
        .and_then(|v| v.as_i64())
        .ok_or_else(|| EngineError::Exchange("malformed kline open time".into()))?;
    let open_time = Utc
        .timestamp_millis_opt(open_ms)
        .single()
        .ok_or_else(|| EngineError::Exchange(format!("invalid kline timestamp {open_ms}")))?;

    Candle::one_minute(open_time, number(1)?, number(2)?, number(3)?, number(4)?)
}

#[async_trait]
impl MarketFeed for BinanceFeed {
    async fn price(&self, symbol: &str, _time: DateTime<Utc>) -> Result<f64> {
        let url = format!("{}/api/v3/ticker/price", self.base_url);
        let ticker: TickerPrice = self
            .client
            .get(&url)
            .query(&[("symbol", symbol.to_uppercase())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        ticker
            .price
            .parse()
            .map_err(|_| EngineError::Exchange(format!("malformed price {:?}", ticker.price)))
    }

    async fn klines(&self, symbol: &str, end: DateTime<Utc>, limit: usize) -> Result<Vec<Candle>> {
        // endTime is inclusive of open time; only closed candles
        let end = align_to_minute(end) - Duration::minutes(1);
        self.fetch_klines(
            symbol,
            &[
                ("endTime", end.timestamp_millis().to_string()),
                ("limit", limit.to_string()),
            ],
        )
        .await
    }

    async fn candles_between(
        &self,
        symbol: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>> {
        let last_open = align_to_minute(to) - Duration::minutes(1);
        if last_open < from {
            return Ok(Vec::new());
        }
        self.fetch_klines(
            symbol,
            &[
                ("startTime", from.timestamp_millis().to_string()),
                ("endTime", last_open.timestamp_millis().to_string()),
                ("limit", "1000".to_string()),
            ],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn feed(closes: &[f64]) -> ReplayFeed {
        let candles = closes.iter().enumerate().map(|(i, close)| {
            Candle::one_minute(t0() + Duration::minutes(i as i64), *close, *close, *close, *close).unwrap()
        });
        ReplayFeed::from_candles("BTCUSDT", candles).unwrap()
    }

    #[tokio::test]
    async fn test_price_is_last_closed_candle() {
        let feed = feed(&[10.0, 11.0, 12.0]);
        assert_eq!(feed.price("BTCUSDT", t0() + Duration::minutes(1)).await.unwrap(), 10.0);
        assert_eq!(feed.price("BTCUSDT", t0() + Duration::seconds(150)).await.unwrap(), 11.0);
        assert!(feed.price("BTCUSDT", t0()).await.is_err());
    }

    #[tokio::test]
    async fn test_exhausted_past_last_candle() {
        let feed = feed(&[10.0, 11.0, 12.0]);
        assert_eq!(feed.price("BTCUSDT", t0() + Duration::seconds(239)).await.unwrap(), 12.0);
        let err = feed.price("BTCUSDT", t0() + Duration::minutes(4)).await.unwrap_err();
        assert!(matches!(err, EngineError::DataExhausted { .. }));
    }

    #[tokio::test]
    async fn test_klines_and_range_queries() {
        let feed = feed(&[10.0, 11.0, 12.0, 13.0]);
        let klines = feed.klines("BTCUSDT", t0() + Duration::minutes(3), 2).await.unwrap();
        assert_eq!(klines.iter().map(|c| c.close).collect::<Vec<_>>(), vec![11.0, 12.0]);

        let between = feed
            .candles_between("BTCUSDT", t0() + Duration::minutes(1), t0() + Duration::seconds(200))
            .await
            .unwrap();
        assert_eq!(between.iter().map(|c| c.close).collect::<Vec<_>>(), vec![11.0, 12.0]);
        assert_eq!(feed.range("BTCUSDT"), Some((t0(), t0() + Duration::minutes(4))));
    }

    #[test]
    fn test_parse_kline_row() {
        let row = vec![
            json!(1704067200000i64),
            json!("42000.10"),
            json!("42010.00"),
            json!("41990.50"),
            json!("42005.00"),
            json!("12.5"),
        ];
        let candle = parse_kline(&row).unwrap();
        assert_eq!(candle.open_time, t0());
        assert_eq!(candle.close, 42005.0);
        assert!(parse_kline(&row[..3]).is_err());
    }
}
