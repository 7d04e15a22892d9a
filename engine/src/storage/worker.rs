//! Per-symbol writer of the indicator store

use crate::cancel::CancelScope;
use crate::clock::{Clock, WallClock};
use crate::data::{align_to_minute, Candle, IndicatorSnapshot, IndicatorStore};
use crate::error::EngineError;
use crate::exchange::{retry_read, ExchangeClient};
use crate::Result;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Folds the latest 1-minute klines into one candle each minute and applies
/// the indicator updaters
///
/// Exactly one worker writes a given symbol.
pub struct StorageWorker {
    symbol: String,
    store: Arc<IndicatorStore>,
    exchange: Arc<dyn ExchangeClient>,
    clock: Arc<dyn Clock>,
}

impl StorageWorker {
    pub fn new(symbol: impl Into<String>, store: Arc<IndicatorStore>, exchange: Arc<dyn ExchangeClient>) -> Self {
        Self {
            symbol: symbol.into(),
            store,
            exchange,
            clock: Arc::new(WallClock::default()),
        }
    }

    /// Clock used between kline read retries
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Build and store the candle that closed at the minute of `now`
    pub async fn update_once(&self, now: DateTime<Utc>) -> Result<IndicatorSnapshot> {
        let end = align_to_minute(now);
        let minutes = self.store.config().candle_minutes as usize;
        let klines = retry_read(self.clock.as_ref(), "klines", || {
            self.exchange.klines(&self.symbol, end, minutes)
        })
        .await?;

        if klines.len() < minutes {
            return Err(EngineError::InvalidCandle(format!(
                "{} klines available for {} before {end}, need {minutes}",
                klines.len(),
                self.symbol
            )));
        }
        let candle = Candle::fold(&klines)?;
        if candle.key() != end {
            return Err(EngineError::InvalidCandle(format!(
                "latest kline for {} closes at {}, expected {end}",
                self.symbol,
                candle.key()
            )));
        }
        self.store.apply(&self.symbol, &candle)
    }

    /// Replay every minute in `[from, to]`; minutes without enough history
    /// are skipped
    pub async fn backfill(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<usize> {
        let mut time = align_to_minute(from);
        let mut written = 0;
        while time <= to {
            match self.update_once(time).await {
                Ok(_) => written += 1,
                Err(EngineError::InvalidCandle(reason)) => {
                    debug!(symbol = %self.symbol, %time, %reason, "skipping minute");
                }
                Err(e) => return Err(e),
            }
            time += Duration::minutes(1);
        }
        info!(symbol = %self.symbol, written, "backfill finished");
        Ok(written)
    }

    /// Update once a minute, shortly after each boundary, until cancelled
    ///
    /// Failures are logged and the loop carries on.
    pub async fn run(self, scope: CancelScope) {
        info!(symbol = %self.symbol, "storage worker started");
        loop {
            let now = Utc::now();
            let next = align_to_minute(now) + Duration::minutes(1) + Duration::seconds(2);
            let delay = (next - now).to_std().unwrap_or_default();

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = scope.cancelled() => break,
            }

            match self.update_once(Utc::now()).await {
                Ok(snapshot) => debug!(
                    symbol = %self.symbol,
                    time = %snapshot.time,
                    rsi = snapshot.rsi,
                    "snapshot stored"
                ),
                Err(e) => warn!(symbol = %self.symbol, error = %e, "storage update failed"),
            }
        }
        info!(symbol = %self.symbol, "storage worker stopped");
    }
}
