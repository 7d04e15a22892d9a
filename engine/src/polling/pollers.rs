//! Concrete pollers: one stop predicate and one sampler each

use crate::cancel::CancelScope;
use crate::clock::Clock;
use crate::config::StrategyConfig;
use crate::data::Candle;
use crate::exchange::{retry_read, Order};
use crate::indicators::Macd;
use crate::polling::{poll, PollingResponse, PollingSettings};
use crate::provider::DataProvider;
use crate::strategy::{PriceAndRsi, SignalQueue};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

/// Polling loops bound to one data provider and clock
#[derive(Clone)]
pub struct PollingEngine {
    clock: Arc<dyn Clock>,
    provider: DataProvider,
    config: StrategyConfig,
}

impl PollingEngine {
    pub fn new(clock: Arc<dyn Clock>, provider: DataProvider, config: StrategyConfig) -> Self {
        Self {
            clock,
            provider,
            config,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn provider(&self) -> &DataProvider {
        &self.provider
    }

    /// Sample the price until it leaves `(low, high)`
    pub async fn price_range(
        &self,
        symbol: &str,
        scope: &CancelScope,
        start: DateTime<Utc>,
        low: f64,
        high: f64,
    ) -> PollingResponse<f64> {
        let settings = PollingSettings::new("price range", self.config.price_poll_secs);
        poll(
            self.clock.as_ref(),
            scope,
            symbol,
            start,
            settings,
            |time| self.provider.price(symbol, time),
            |price| *price <= low || *price >= high,
        )
        .await
    }

    /// Sample RSI until it drops below `max_rsi`
    pub async fn rsi_below(
        &self,
        symbol: &str,
        scope: &CancelScope,
        start: DateTime<Utc>,
        max_rsi: f64,
    ) -> PollingResponse<f64> {
        let settings = PollingSettings::new("rsi", self.config.indicator_poll_secs);
        poll(
            self.clock.as_ref(),
            scope,
            symbol,
            start,
            settings,
            |time| async move { self.provider.rsi(symbol, time) },
            |rsi| *rsi < max_rsi,
        )
        .await
    }

    /// Sample price and RSI until an oversold sample shows a lower price and
    /// a higher RSI than an old enough sample in `queue`
    ///
    /// Every sample is checked against the queue first, then enqueued.
    pub async fn lower_price_higher_rsi(
        &self,
        symbol: &str,
        scope: &CancelScope,
        start: DateTime<Utc>,
        queue: &mut SignalQueue,
    ) -> PollingResponse<PriceAndRsi> {
        let settings = PollingSettings::new("price and rsi", self.config.indicator_poll_secs);
        let max_rsi = self.config.max_rsi;
        poll(
            self.clock.as_ref(),
            scope,
            symbol,
            start,
            settings,
            |time| self.provider.price_and_rsi(symbol, time),
            |sample| {
                let earlier = if sample.rsi < max_rsi {
                    queue.find_older_higher_rsi_lower_price(sample)
                } else {
                    None
                };
                queue.enqueue(*sample);
                if let Some(earlier) = earlier {
                    debug!(
                        symbol = %symbol,
                        price = sample.price,
                        rsi = sample.rsi,
                        earlier_price = earlier.price,
                        earlier_rsi = earlier.rsi,
                        "divergence found"
                    );
                }
                earlier.is_some()
            },
        )
        .await
    }

    /// Sample the MACD histogram until it is no longer negative, at most
    /// `macd_poll_max_iterations` times
    pub async fn macd_non_negative(
        &self,
        symbol: &str,
        scope: &CancelScope,
        start: DateTime<Utc>,
    ) -> PollingResponse<Macd> {
        let settings = PollingSettings::new("macd", self.config.indicator_poll_secs)
            .with_max_iterations(self.config.macd_poll_max_iterations);
        poll(
            self.clock.as_ref(),
            scope,
            symbol,
            start,
            settings,
            |time| async move { self.provider.macd(symbol, time) },
            |macd| !macd.is_negative(),
        )
        .await
    }

    /// Sample the current candle until its range touches `low` or `high`
    pub async fn candle_range(
        &self,
        symbol: &str,
        scope: &CancelScope,
        start: DateTime<Utc>,
        low: f64,
        high: f64,
    ) -> PollingResponse<Candle> {
        let settings = PollingSettings::new("candle range", self.config.indicator_poll_secs);
        poll(
            self.clock.as_ref(),
            scope,
            symbol,
            start,
            settings,
            |time| async move { self.provider.candle(symbol, time) },
            |candle| candle.low <= low || candle.high >= high,
        )
        .await
    }

    /// Query an order until it is no longer active, at most
    /// `order_poll_max_iterations` times
    pub async fn order_status(
        &self,
        symbol: &str,
        scope: &CancelScope,
        start: DateTime<Utc>,
        order_id: &str,
    ) -> PollingResponse<Order> {
        let settings = PollingSettings::new("order status", self.config.order_poll_secs)
            .with_max_iterations(self.config.order_poll_max_iterations);
        let exchange = self.provider.exchange();
        poll(
            self.clock.as_ref(),
            scope,
            symbol,
            start,
            settings,
            |time| {
                retry_read(self.clock.as_ref(), "order status", move || {
                    exchange.order_status(symbol, order_id, time)
                })
            },
            |order| !order.is_active(),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::BacktestClock;
    use crate::config::IndicatorConfig;
    use crate::data::IndicatorStore;
    use crate::exchange::{PaperExchange, ReplayFeed};
    use crate::polling::PollingOutcome;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn engine(store: Arc<IndicatorStore>, feed: ReplayFeed, config: StrategyConfig) -> PollingEngine {
        let provider = DataProvider::new(store, Arc::new(PaperExchange::new(Arc::new(feed))));
        PollingEngine::new(Arc::new(BacktestClock), provider, config)
    }

    fn one_minute_store() -> Arc<IndicatorStore> {
        Arc::new(
            IndicatorStore::new(IndicatorConfig {
                candle_minutes: 1,
                retention_minutes: None,
                ..Default::default()
            })
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_rsi_below_stops_at_first_oversold_sample() {
        let store = one_minute_store();
        for (i, rsi) in [40.0, 38.0, 30.0, 20.0].into_iter().enumerate() {
            store.rsi().add("BTCUSDT", t0() + Duration::minutes(i as i64), rsi);
        }
        let engine = engine(store, ReplayFeed::new(), StrategyConfig::default());
        let scope = CancelScope::root();

        let response = engine.rsi_below("BTCUSDT", &scope, t0(), 35.0).await;

        assert!(!response.is_cancelled());
        let (time, rsi) = response.into_result().unwrap();
        assert_eq!(rsi, 30.0);
        assert_eq!(time, t0() + Duration::minutes(2));
    }

    #[tokio::test]
    async fn test_missing_snapshot_faults() {
        let engine = engine(one_minute_store(), ReplayFeed::new(), StrategyConfig::default());
        let scope = CancelScope::root();

        let response = engine.rsi_below("BTCUSDT", &scope, t0(), 35.0).await;

        assert!(matches!(response.outcome, PollingOutcome::Faulted(_)));
        assert_eq!(response.time, t0());
    }

    #[tokio::test]
    async fn test_macd_poll_times_out() {
        let store = one_minute_store();
        let negative = Macd {
            fast_ema: 9.0,
            slow_ema: 10.0,
            signal: 0.0,
            histogram: -1.0,
        };
        for i in 0..10 {
            store.macd().add("BTCUSDT", t0() + Duration::minutes(i), negative);
        }
        let config = StrategyConfig {
            macd_poll_max_iterations: 3,
            ..Default::default()
        };
        let engine = engine(store, ReplayFeed::new(), config);
        let scope = CancelScope::root();

        let response = engine.macd_non_negative("BTCUSDT", &scope, t0()).await;

        assert!(response.is_timed_out());
        assert_eq!(response.time, t0() + Duration::minutes(2));
    }

    #[tokio::test]
    async fn test_divergence_poll_fills_queue_until_match() {
        let store = one_minute_store();
        let mut feed = ReplayFeed::new();
        // falling closes, rising RSI
        let closes = [100.0, 99.0, 98.0, 97.0, 96.0];
        for (i, close) in closes.into_iter().enumerate() {
            let open_time = t0() + Duration::minutes(i as i64);
            feed.insert("BTCUSDT", Candle::one_minute(open_time, close, close, close, close).unwrap())
                .unwrap();
            store.rsi().add("BTCUSDT", open_time + Duration::minutes(1), 20.0 + i as f64);
        }
        let engine = engine(store, feed, StrategyConfig::default());
        let scope = CancelScope::root();
        let mut queue = SignalQueue::new(30, Duration::seconds(90));

        let response = engine
            .lower_price_higher_rsi("BTCUSDT", &scope, t0() + Duration::minutes(1), &mut queue)
            .await;

        let (time, sample) = response.into_result().unwrap();
        // the 1-minute sample is the first one more than 90 s older than a later one
        assert_eq!(time, t0() + Duration::minutes(3));
        assert_eq!(sample.price, 98.0);
        assert_eq!(queue.len(), 3);
    }
}
