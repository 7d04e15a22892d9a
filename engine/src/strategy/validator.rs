//! Candle, MACD and mean-average predicates over the data provider

use crate::data::Candle;
use crate::notify::Notifier;
use crate::provider::DataProvider;
use crate::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

/// Closed lower than it opened
pub fn is_red(candle: &Candle) -> bool {
    candle.close < candle.open
}

/// Rose by at least `min_rise` over its open and closed above the previous
/// candle's high
pub fn is_green(candle: &Candle, previous: &Candle, min_rise: f64) -> bool {
    candle.close >= candle.open * (1.0 + min_rise) && previous.high < candle.close
}

/// Stateless validators; a positive result is announced to the notifier
#[derive(Clone)]
pub struct Validators {
    provider: DataProvider,
    notifier: Arc<dyn Notifier>,
    green_min_rise: f64,
}

impl Validators {
    pub fn new(provider: DataProvider, notifier: Arc<dyn Notifier>, green_min_rise: f64) -> Self {
        Self {
            provider,
            notifier,
            green_min_rise,
        }
    }

    pub fn provider(&self) -> &DataProvider {
        &self.provider
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    async fn announce(&self, symbol: &str, time: DateTime<Utc>, what: &str, positive: bool) -> bool {
        debug!(symbol = %symbol, %time, what, positive, "validated");
        if positive {
            self.notifier.notify(&format!("{symbol}: {what} at {time}")).await;
        }
        positive
    }

    pub async fn is_red_candle(&self, symbol: &str, time: DateTime<Utc>) -> Result<bool> {
        let candle = self.provider.candle(symbol, time)?;
        Ok(self.announce(symbol, time, "red candle", is_red(&candle)).await)
    }

    pub async fn is_green_candle(&self, symbol: &str, time: DateTime<Utc>) -> Result<bool> {
        let candle = self.provider.candle(symbol, time)?;
        let previous = self.provider.previous_candle(symbol, time)?;
        let green = is_green(&candle, &previous, self.green_min_rise);
        Ok(self.announce(symbol, time, "green candle", green).await)
    }

    pub async fn is_macd_negative(&self, symbol: &str, time: DateTime<Utc>) -> Result<bool> {
        let macd = self.provider.macd(symbol, time)?;
        Ok(self.announce(symbol, time, "negative MACD", macd.is_negative()).await)
    }

    pub async fn is_price_below_mean_average(&self, symbol: &str, time: DateTime<Utc>) -> Result<bool> {
        let mean_average = self.provider.mean_average(symbol, time)?;
        let price = self.provider.price(symbol, time).await?;
        Ok(self
            .announce(symbol, time, "price below mean average", price < mean_average)
            .await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndicatorConfig;
    use crate::data::IndicatorStore;
    use crate::exchange::{PaperExchange, ReplayFeed};
    use crate::notify::RecordingNotifier;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn bar(minute: i64, open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle::one_minute(t0() + Duration::minutes(minute), open, high, low, close).unwrap()
    }

    #[test]
    fn test_green_needs_rise_and_breakout() {
        let previous = bar(0, 100.0, 101.0, 99.0, 100.0);

        assert!(is_green(&bar(1, 100.0, 101.5, 100.0, 101.2), &previous, 0.005));
        // rise too small
        assert!(!is_green(&bar(1, 100.0, 100.5, 100.0, 100.3), &previous, 0.005));
        // rise is fine but the previous high is not cleared
        assert!(!is_green(&bar(1, 100.0, 101.0, 100.0, 100.8), &bar(0, 100.0, 100.9, 99.0, 100.0), 0.005));
    }

    #[test]
    fn test_red() {
        assert!(is_red(&bar(0, 100.0, 100.0, 98.0, 99.0)));
        assert!(!is_red(&bar(0, 100.0, 100.0, 100.0, 100.0)));
    }

    #[tokio::test]
    async fn test_positive_results_are_notified() {
        let store = Arc::new(
            IndicatorStore::new(IndicatorConfig {
                candle_minutes: 1,
                retention_minutes: None,
                ..Default::default()
            })
            .unwrap(),
        );
        let mut feed = ReplayFeed::new();
        for candle in [bar(0, 100.0, 100.0, 99.0, 99.5), bar(1, 99.5, 99.5, 97.0, 98.0)] {
            store.apply("BTCUSDT", &candle).unwrap();
            feed.insert("BTCUSDT", candle).unwrap();
        }
        let provider = DataProvider::new(store, Arc::new(PaperExchange::new(Arc::new(feed))));
        let notifier = Arc::new(RecordingNotifier::new());
        let validators = Validators::new(provider, notifier.clone(), 0.005);
        let t = t0() + Duration::minutes(2);

        assert!(validators.is_red_candle("BTCUSDT", t).await.unwrap());
        assert!(!validators.is_green_candle("BTCUSDT", t).await.unwrap());
        assert!(validators.is_price_below_mean_average("BTCUSDT", t).await.unwrap());

        assert_eq!(notifier.messages().len(), 2);
    }
}
