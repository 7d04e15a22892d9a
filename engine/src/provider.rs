//! Read-only view of one symbol universe at a given logical time

use crate::clock::{Clock, WallClock};
use crate::data::{align_to_minute, Candle, IndicatorStore};
use crate::exchange::{retry_read, ExchangeClient};
use crate::indicators::Macd;
use crate::strategy::PriceAndRsi;
use crate::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Combines the indicator store with the live price source
///
/// Indicator reads at time T use the key `align_to_minute(T)`: the snapshot
/// of the candle that closed at that minute boundary. Exchange reads are
/// retried with the provider's clock, real time unless replaced.
#[derive(Clone)]
pub struct DataProvider {
    store: Arc<IndicatorStore>,
    exchange: Arc<dyn ExchangeClient>,
    clock: Arc<dyn Clock>,
}

impl DataProvider {
    pub fn new(store: Arc<IndicatorStore>, exchange: Arc<dyn ExchangeClient>) -> Self {
        Self {
            store,
            exchange,
            clock: Arc::new(WallClock::default()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn store(&self) -> &Arc<IndicatorStore> {
        &self.store
    }

    pub fn exchange(&self) -> &Arc<dyn ExchangeClient> {
        &self.exchange
    }

    pub async fn price(&self, symbol: &str, time: DateTime<Utc>) -> Result<f64> {
        retry_read(self.clock.as_ref(), "price", || self.exchange.price(symbol, time)).await
    }

    pub fn rsi(&self, symbol: &str, time: DateTime<Utc>) -> Result<f64> {
        self.store.rsi().get(symbol, align_to_minute(time))
    }

    pub fn macd(&self, symbol: &str, time: DateTime<Utc>) -> Result<Macd> {
        self.store.macd().get(symbol, align_to_minute(time))
    }

    pub fn mean_average(&self, symbol: &str, time: DateTime<Utc>) -> Result<f64> {
        self.store.mean_average().get(symbol, align_to_minute(time))
    }

    /// Candle that closed at the minute of `time`
    pub fn candle(&self, symbol: &str, time: DateTime<Utc>) -> Result<Candle> {
        self.store.candles().get(symbol, align_to_minute(time))
    }

    /// Candle one full candle interval before [`Self::candle`]
    pub fn previous_candle(&self, symbol: &str, time: DateTime<Utc>) -> Result<Candle> {
        let key = align_to_minute(time) - self.store.candle_duration();
        self.store.candles().get(symbol, key)
    }

    pub async fn price_and_rsi(&self, symbol: &str, time: DateTime<Utc>) -> Result<PriceAndRsi> {
        let price = self.price(symbol, time).await?;
        let rsi = self.rsi(symbol, time)?;
        Ok(PriceAndRsi { price, rsi, time })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndicatorConfig;
    use crate::error::EngineError;
    use crate::exchange::{PaperExchange, ReplayFeed};
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn provider() -> DataProvider {
        let config = IndicatorConfig {
            candle_minutes: 1,
            retention_minutes: None,
            ..Default::default()
        };
        let store = Arc::new(IndicatorStore::new(config).unwrap());
        let mut feed = ReplayFeed::new();
        for (i, close) in [100.0, 98.0, 99.0].into_iter().enumerate() {
            let candle = Candle::one_minute(t0() + Duration::minutes(i as i64), 100.0, 100.0, close, close).unwrap();
            store.apply("BTCUSDT", &candle).unwrap();
            feed.insert("BTCUSDT", candle).unwrap();
        }
        DataProvider::new(store, Arc::new(PaperExchange::new(Arc::new(feed))))
    }

    #[tokio::test]
    async fn test_reads_align_to_minute() {
        let provider = provider();
        let t = t0() + Duration::seconds(150);

        assert_eq!(provider.candle("BTCUSDT", t).unwrap().close, 98.0);
        assert_eq!(provider.previous_candle("BTCUSDT", t).unwrap().close, 100.0);

        let sample = provider.price_and_rsi("BTCUSDT", t).await.unwrap();
        assert_eq!(sample.price, 98.0);
        assert_eq!(sample.time, t);
        assert_eq!(sample.rsi, provider.rsi("BTCUSDT", t0() + Duration::minutes(2)).unwrap());
    }

    #[test]
    fn test_missing_key_is_not_found() {
        let provider = provider();
        let err = provider.rsi("BTCUSDT", t0()).unwrap_err();
        assert!(matches!(err, EngineError::NotFound { repository: "rsi", .. }));
    }
}
