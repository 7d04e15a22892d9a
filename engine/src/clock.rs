//! Logical time source for bots and pollers

use crate::cancel::CancelScope;
use crate::data::align_to_minute;
use crate::error::EngineError;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::trace;

/// Advances logical time by a requested duration, honouring cancellation
///
/// `wait` is the only suspension point of the polling loops. It fails with
/// [`EngineError::Cancelled`] once the scope is cancelled.
#[async_trait]
pub trait Clock: Send + Sync {
    async fn wait(
        &self,
        scope: &CancelScope,
        symbol: &str,
        seconds: u64,
        label: &str,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>>;

    /// Pause before retry number `attempt` of a failed exchange read
    async fn backoff(&self, attempt: u32) {
        tokio::time::sleep(std::time::Duration::from_millis(250 * attempt as u64)).await;
    }
}

/// Real time: sleeps, then reports the current minute
#[derive(Debug, Clone)]
pub struct WallClock {
    settle: Duration,
}

impl WallClock {
    /// `settle` lags the reported minute so readers target minutes the
    /// storage worker has already written
    pub fn new(settle: Duration) -> Self {
        Self { settle }
    }

    pub fn now(&self) -> DateTime<Utc> {
        align_to_minute(Utc::now() - self.settle)
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new(Duration::seconds(10))
    }
}

#[async_trait]
impl Clock for WallClock {
    async fn wait(
        &self,
        scope: &CancelScope,
        symbol: &str,
        seconds: u64,
        label: &str,
        _now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>> {
        trace!(symbol = %symbol, seconds, label, "waiting");
        tokio::select! {
            _ = tokio::time::sleep(std::time::Duration::from_secs(seconds)) => Ok(self.now()),
            _ = scope.cancelled() => Err(EngineError::Cancelled),
        }
    }
}

/// Accelerated time for deterministic replay: no real delay
#[derive(Debug, Clone, Copy, Default)]
pub struct BacktestClock;

#[async_trait]
impl Clock for BacktestClock {
    async fn wait(
        &self,
        scope: &CancelScope,
        _symbol: &str,
        seconds: u64,
        _label: &str,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>> {
        if scope.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        // let racing generations interleave
        tokio::task::yield_now().await;
        if scope.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        Ok(now + Duration::seconds(seconds as i64))
    }

    async fn backoff(&self, _attempt: u32) {
        tokio::task::yield_now().await;
    }
}
