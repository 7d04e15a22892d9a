//! Cooperative sampling loops
//!
//! Every concrete poller is an instance of [`poll`]: sample, check the stop
//! condition, wait one interval on the [`Clock`], repeat. The loop ends on
//! success, cancellation, a sampling fault or an optional iteration cap.

pub mod pollers;

pub use pollers::*;

use crate::cancel::CancelScope;
use crate::clock::Clock;
use crate::error::EngineError;
use crate::Result;
use chrono::{DateTime, Utc};
use std::future::Future;
use tracing::{debug, trace};

/// Terminal cause of a polling loop; exactly one holds
#[derive(Debug)]
pub enum PollingOutcome<T> {
    Success(T),
    /// The iteration cap was reached without meeting the stop condition
    TimedOut { iterations: u32 },
    Cancelled,
    Faulted(EngineError),
}

/// Result of one polling loop
///
/// `time` is the time of the successful or faulting sample, or the last
/// successfully sampled time when cancelled.
#[derive(Debug)]
pub struct PollingResponse<T> {
    pub label: &'static str,
    pub time: DateTime<Utc>,
    pub outcome: PollingOutcome<T>,
}

impl<T> PollingResponse<T> {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, PollingOutcome::Success(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.outcome, PollingOutcome::Cancelled)
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self.outcome, PollingOutcome::TimedOut { .. })
    }

    pub fn value(&self) -> Option<&T> {
        match &self.outcome {
            PollingOutcome::Success(value) => Some(value),
            _ => None,
        }
    }

    /// Collapse into the time and value, mapping every other outcome onto
    /// the matching [`EngineError`]
    pub fn into_result(self) -> Result<(DateTime<Utc>, T)> {
        match self.outcome {
            PollingOutcome::Success(value) => Ok((self.time, value)),
            PollingOutcome::TimedOut { iterations } => Err(EngineError::TimedOut {
                label: self.label.to_string(),
                iterations,
            }),
            PollingOutcome::Cancelled => Err(EngineError::Cancelled),
            PollingOutcome::Faulted(e) => Err(e),
        }
    }
}

/// Cadence and bounds of one polling loop
#[derive(Debug, Clone, Copy)]
pub struct PollingSettings {
    pub label: &'static str,
    pub interval_secs: u64,
    /// Cap on successful samples; `None` polls until stopped
    pub max_iterations: Option<u32>,
}

impl PollingSettings {
    pub fn new(label: &'static str, interval_secs: u64) -> Self {
        Self {
            label,
            interval_secs,
            max_iterations: None,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }
}

/// Generic polling primitive
///
/// The first sample is taken at `start` without waiting. `sample` may fail;
/// a cancellation error from it counts as cancellation, anything else faults
/// the loop. `stop` sees every successful sample in order.
pub async fn poll<T, S, Fut, P>(
    clock: &dyn Clock,
    scope: &CancelScope,
    symbol: &str,
    start: DateTime<Utc>,
    settings: PollingSettings,
    mut sample: S,
    mut stop: P,
) -> PollingResponse<T>
where
    S: FnMut(DateTime<Utc>) -> Fut,
    Fut: Future<Output = Result<T>>,
    P: FnMut(&T) -> bool,
{
    let respond = |time, outcome| PollingResponse {
        label: settings.label,
        time,
        outcome,
    };

    let mut time = start;
    let mut last_ok = start;
    let mut iterations = 0u32;

    loop {
        if scope.is_cancelled() {
            debug!(symbol = %symbol, label = settings.label, "polling cancelled");
            return respond(last_ok, PollingOutcome::Cancelled);
        }

        match sample(time).await {
            Ok(value) => {
                iterations += 1;
                last_ok = time;
                if stop(&value) {
                    trace!(symbol = %symbol, label = settings.label, iterations, "polling condition met");
                    return respond(time, PollingOutcome::Success(value));
                }
            }
            Err(e) if e.is_cancelled() => return respond(last_ok, PollingOutcome::Cancelled),
            Err(e) => return respond(time, PollingOutcome::Faulted(e)),
        }

        if settings.max_iterations.is_some_and(|max| iterations >= max) {
            debug!(symbol = %symbol, label = settings.label, iterations, "polling timed out");
            return respond(time, PollingOutcome::TimedOut { iterations });
        }

        match clock
            .wait(scope, symbol, settings.interval_secs, settings.label, time)
            .await
        {
            Ok(next) => time = next,
            Err(e) if e.is_cancelled() => {
                debug!(symbol = %symbol, label = settings.label, "polling cancelled");
                return respond(last_ok, PollingOutcome::Cancelled);
            }
            Err(e) => return respond(time, PollingOutcome::Faulted(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::BacktestClock;
    use chrono::{Duration, TimeZone};
    use std::cell::Cell;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_success_after_k_samples() {
        let scope = CancelScope::root();
        let calls = Cell::new(0u32);

        let response = poll(
            &BacktestClock,
            &scope,
            "BTCUSDT",
            t0(),
            PollingSettings::new("k", 60),
            |time| {
                calls.set(calls.get() + 1);
                async move { Ok(time) }
            },
            |_| calls.get() == 4,
        )
        .await;

        assert!(response.is_success());
        assert_eq!(calls.get(), 4);
        // three waits of 60 s precede the fourth sample
        assert_eq!(response.time, t0() + Duration::seconds(180));
        assert_eq!(response.value(), Some(&response.time));
    }

    #[tokio::test]
    async fn test_immediate_success_does_not_wait() {
        let scope = CancelScope::root();
        let response = poll(
            &BacktestClock,
            &scope,
            "BTCUSDT",
            t0(),
            PollingSettings::new("now", 60),
            |_| async { Ok(1) },
            |_| true,
        )
        .await;
        assert_eq!(response.time, t0());
        assert_eq!(response.into_result().unwrap().1, 1);
    }

    #[tokio::test]
    async fn test_iteration_cap_times_out() {
        let scope = CancelScope::root();
        let response = poll(
            &BacktestClock,
            &scope,
            "BTCUSDT",
            t0(),
            PollingSettings::new("macd", 60).with_max_iterations(3),
            |_| async { Ok(()) },
            |_| false,
        )
        .await;

        assert!(matches!(response.outcome, PollingOutcome::TimedOut { iterations: 3 }));
        assert_eq!(response.time, t0() + Duration::seconds(120));
        assert!(matches!(response.into_result(), Err(EngineError::TimedOut { .. })));
    }

    #[tokio::test]
    async fn test_fault_carries_attempted_time() {
        let scope = CancelScope::root();
        let response: PollingResponse<()> = poll(
            &BacktestClock,
            &scope,
            "BTCUSDT",
            t0(),
            PollingSettings::new("fault", 60),
            |time| async move {
                if time > t0() {
                    Err(EngineError::Invariant("boom".into()))
                } else {
                    Ok(())
                }
            },
            |_| false,
        )
        .await;

        assert!(matches!(response.outcome, PollingOutcome::Faulted(EngineError::Invariant(_))));
        assert_eq!(response.time, t0() + Duration::seconds(60));
    }

    #[tokio::test]
    async fn test_cancel_during_wait_keeps_last_good_time() {
        let scope = CancelScope::root();
        let calls = Cell::new(0u32);
        let response = poll(
            &BacktestClock,
            &scope,
            "BTCUSDT",
            t0(),
            PollingSettings::new("cancel", 60),
            |_| {
                calls.set(calls.get() + 1);
                if calls.get() == 2 {
                    scope.cancel();
                }
                async { Ok(()) }
            },
            |_| false,
        )
        .await;

        assert!(response.is_cancelled());
        assert_eq!(response.time, t0() + Duration::seconds(60));
        assert_eq!(calls.get(), 2);
    }
}
