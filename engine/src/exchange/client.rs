//! Exchange collaborator and read retries

use crate::clock::Clock;
use crate::data::Candle;
use crate::exchange::{BuyAndSellTradeInfo, Order};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use tracing::warn;

/// Attempts made by [`retry_read`] before giving up
pub const READ_ATTEMPTS: u32 = 3;

/// Price source, order placement and account queries for one venue
///
/// Every method takes the caller's logical time so simulated venues can
/// replay history. Live venues ignore it.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    fn name(&self) -> &str;

    /// Last traded price
    async fn price(&self, symbol: &str, time: DateTime<Utc>) -> Result<f64>;

    /// Up to `limit` closed 1-minute candles ending before `end`, oldest first
    async fn klines(&self, symbol: &str, end: DateTime<Utc>, limit: usize) -> Result<Vec<Candle>>;

    /// Free balance of one asset
    async fn balance(&self, asset: &str) -> Result<f64>;

    async fn market_buy(&self, symbol: &str, quantity: f64, time: DateTime<Utc>) -> Result<Order>;

    async fn place_oco_sell(
        &self,
        symbol: &str,
        trade: &BuyAndSellTradeInfo,
        time: DateTime<Utc>,
    ) -> Result<Order>;

    async fn cancel_order(&self, symbol: &str, order_id: &str, time: DateTime<Utc>) -> Result<Order>;

    async fn order_status(&self, symbol: &str, order_id: &str, time: DateTime<Utc>) -> Result<Order>;

    /// Quote asset of a symbol, e.g. `USDT` for `BTCUSDT`
    fn quote_asset(&self, symbol: &str) -> String {
        split_symbol(symbol).1
    }
}

/// Split a concatenated pair into base and quote
pub fn split_symbol(symbol: &str) -> (String, String) {
    let upper = symbol.to_uppercase();
    for quote in ["USDT", "USDC", "BUSD", "FDUSD", "BTC", "ETH", "BNB"] {
        if upper.len() > quote.len() && upper.ends_with(quote) {
            let base = &upper[..upper.len() - quote.len()];
            return (base.to_string(), quote.to_string());
        }
    }
    (upper, String::new())
}

/// Run an idempotent read up to [`READ_ATTEMPTS`] times
///
/// Only transient faults are retried; anything else, including
/// cancellation, is returned immediately. The pause between attempts is
/// taken on `clock`. Never wrap order-mutating calls.
pub async fn retry_read<T, F, Fut>(clock: &dyn Clock, label: &str, mut read: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match read().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < READ_ATTEMPTS => {
                warn!(label, attempt, error = %e, "read failed, retrying");
                clock.backoff(attempt).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{BacktestClock, WallClock};
    use crate::error::EngineError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_split_symbol() {
        assert_eq!(split_symbol("btcusdt"), ("BTC".to_string(), "USDT".to_string()));
        assert_eq!(split_symbol("ETHBTC"), ("ETH".to_string(), "BTC".to_string()));
        assert_eq!(split_symbol("USDT"), ("USDT".to_string(), String::new()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_read_recovers_from_transient_errors() {
        let calls = &AtomicU32::new(0);
        let value = retry_read(&WallClock::default(), "price", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(EngineError::Exchange("503".into()))
            } else {
                Ok(42.0)
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 42.0);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_read_gives_up_after_three_attempts() {
        let calls = &AtomicU32::new(0);
        let result: Result<f64> = retry_read(&WallClock::default(), "price", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(EngineError::Exchange("503".into()))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), READ_ATTEMPTS);
    }

    #[tokio::test]
    async fn test_retry_read_does_not_retry_permanent_errors() {
        let calls = &AtomicU32::new(0);
        let result: Result<f64> = retry_read(&WallClock::default(), "price", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(EngineError::Cancelled)
        })
        .await;

        assert!(result.unwrap_err().is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backtest_retries_take_no_wall_time() {
        let calls = &AtomicU32::new(0);
        let started = tokio::time::Instant::now();
        let value = retry_read(&BacktestClock, "klines", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(EngineError::Exchange("timeout".into()))
            } else {
                Ok(7)
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(started.elapsed(), std::time::Duration::ZERO);
    }
}
