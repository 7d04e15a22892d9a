//! Recursive per-symbol scheduler
//!
//! A generation waits for the entry signal and a red candle, then forks a
//! child generation that starts the same cycle while the parent waits for a
//! green candle. Parent and child race; the first branch to claim the
//! family commit gate trades and every branch below it is cancelled. A
//! branch that faults after a descendant committed waits for that
//! descendant's trade instead of cancelling it.

use crate::bot::{BotResult, BotResultDetails};
use crate::cancel::CancelScope;
use crate::phase::{Phase, PhaseExecutor, PhaseLog, TradeOutcome};
use crate::strategy::SignalQueue;
use crate::Result;
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument, Span};

pub struct CurrencyBot {
    symbol: String,
    age: u32,
    executor: Arc<PhaseExecutor>,
    scope: CancelScope,
    queue: SignalQueue,
    log: PhaseLog,
    now: DateTime<Utc>,
    span: Span,
    child: Option<JoinHandle<Option<BotResultDetails>>>,
    committed: bool,
}

impl CurrencyBot {
    /// Root generation of one strategy run
    ///
    /// `scope` should be a fresh tree (`CancelScope::root()` or
    /// `child_tree()`) so that commits of earlier runs do not block this one.
    pub fn new(
        symbol: impl Into<String>,
        executor: Arc<PhaseExecutor>,
        scope: CancelScope,
        start: DateTime<Utc>,
    ) -> Self {
        let symbol = symbol.into();
        let queue = executor.signal_queue();
        let span = info_span!("currency_bot", symbol = %symbol, age = 0u32);
        Self {
            symbol,
            age: 0,
            executor,
            scope,
            queue,
            log: PhaseLog::new(),
            now: start,
            span,
            child: None,
            committed: false,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn age(&self) -> u32 {
        self.age
    }

    pub fn scope(&self) -> &CancelScope {
        &self.scope
    }

    /// Run the whole strategy; always produces a terminal result
    ///
    /// A cancelled root yields a `Faulted` result marked "cancelled".
    pub async fn run(self) -> BotResultDetails {
        let symbol = self.symbol.clone();
        let start = self.now;
        match self.run_branch().await {
            Some(details) => details,
            None => {
                debug!(symbol = %symbol, "strategy run cancelled");
                BotResultDetails {
                    currency: symbol,
                    age: 0,
                    result: BotResult::Faulted,
                    end_time: start,
                    phase_log: PhaseLog::new(),
                    trade: None,
                    exit_price: None,
                    error: Some("cancelled".to_string()),
                }
            }
        }
    }

    /// Run this generation; `None` when the branch was cancelled or lost
    /// the commit race without a child to yield to
    fn run_branch(self) -> BoxFuture<'static, Option<BotResultDetails>> {
        let span = self.span.clone();
        self.cycle().instrument(span).boxed()
    }

    async fn cycle(mut self) -> Option<BotResultDetails> {
        match self.phases().await {
            Ok(details) => details,
            Err(e) if e.is_cancelled() => {
                debug!("branch cancelled");
                None
            }
            Err(e) => {
                warn!(error = %e, "branch faulted");
                if let Some(time) = e.time() {
                    self.now = self.now.max(time);
                }
                if !self.committed && self.scope.is_committed() {
                    if let Some(handle) = self.child.take() {
                        return match self.yield_to(handle).await {
                            Ok(details) => details,
                            Err(e) => Some(self.finish(BotResult::Faulted, None, Some(e.to_string()))),
                        };
                    }
                }
                self.scope.cancel_descendants();
                Some(self.finish(BotResult::Faulted, None, Some(e.to_string())))
            }
        }
    }

    fn fork(&self) -> CurrencyBot {
        let age = self.age + 1;
        let mut log = PhaseLog::new();
        log.push(self.now, Phase::Forked, format!("forked from generation {}", self.age));
        CurrencyBot {
            symbol: self.symbol.clone(),
            age,
            executor: Arc::clone(&self.executor),
            scope: self.scope.child(),
            queue: self.queue.clone(),
            log,
            now: self.now,
            span: info_span!("currency_bot", symbol = %self.symbol, age),
            child: None,
            committed: false,
        }
    }

    async fn phases(&mut self) -> Result<Option<BotResultDetails>> {
        let executor = Arc::clone(&self.executor);
        let strategy = executor.strategy();
        let symbol = self.symbol.clone();

        loop {
            loop {
                let (time, _) = executor
                    .wait_for_signal(&symbol, self.now, &self.scope, &mut self.log, &mut self.queue)
                    .await?;
                self.now = time;

                let (time, mut ready) = executor
                    .validate_red(&symbol, self.now, &self.scope, &mut self.log)
                    .await?;
                self.now = time;

                if ready && strategy.require_price_below_mean_average {
                    let (time, below) = executor
                        .validate_price_below_mean_average(&symbol, self.now, &self.scope, &mut self.log)
                        .await?;
                    self.now = time;
                    ready = below;
                }
                if ready {
                    break;
                }

                self.now = executor
                    .wait(&symbol, self.now, &self.scope, &mut self.log, strategy.retry_delay_secs, "retry")
                    .await?;
            }

            if self.age + 1 < strategy.max_generations {
                let child = self.fork();
                self.log.push(self.now, Phase::Forked, format!("started generation {}", child.age));
                info!(child_age = child.age, "forked");
                self.child = Some(tokio::spawn(child.run_branch()));
            }

            self.now = executor
                .wait(&symbol, self.now, &self.scope, &mut self.log, strategy.fork_wait_secs, "fork wait")
                .await?;

            let (time, mut green) = executor
                .validate_green(&symbol, self.now, &self.scope, &mut self.log)
                .await?;
            self.now = time;

            if green && strategy.macd_confirmation {
                let (time, confirmed) = executor
                    .wait_for_macd_turn(&symbol, self.now, &self.scope, &mut self.log)
                    .await?;
                self.now = time;
                green = confirmed;
            }

            if !green {
                match self.child.take() {
                    Some(handle) => return self.yield_to(handle).await,
                    // deepest generation: start over without forking
                    None => continue,
                }
            }

            if !self.scope.try_commit() {
                debug!("commit gate already taken");
                return match self.child.take() {
                    Some(handle) => self.yield_to(handle).await,
                    None => Ok(None),
                };
            }

            self.committed = true;
            self.log.push(self.now, Phase::Committed, "committed to trade");
            info!("committed");

            let (time, outcome) = executor
                .buy_and_place_sell(&symbol, self.now, &self.scope, &mut self.log)
                .await?;
            self.now = time;
            return Ok(Some(self.finish(outcome.result, Some(outcome), None)));
        }
    }

    async fn yield_to(
        &self,
        handle: JoinHandle<Option<BotResultDetails>>,
    ) -> Result<Option<BotResultDetails>> {
        debug!("yielding to child");
        Ok(handle.await?)
    }

    fn finish(&self, result: BotResult, outcome: Option<TradeOutcome>, error: Option<String>) -> BotResultDetails {
        let details = BotResultDetails {
            currency: self.symbol.clone(),
            age: self.age,
            result,
            end_time: self.now,
            phase_log: self.log.clone(),
            trade: outcome.map(|o| o.trade),
            exit_price: outcome.map(|o| o.exit_price),
            error,
        };
        info!(result = %details.result, end_time = %details.end_time, "generation finished");
        details
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::BacktestClock;
    use crate::config::{IndicatorConfig, RiskConfig, StrategyConfig};
    use crate::data::IndicatorStore;
    use crate::exchange::{PaperExchange, ReplayFeed};
    use crate::notify::RecordingNotifier;
    use crate::provider::DataProvider;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    /// Executor over an empty feed: the first price read faults
    fn executor() -> Arc<PhaseExecutor> {
        let store = Arc::new(
            IndicatorStore::new(IndicatorConfig {
                candle_minutes: 1,
                ..Default::default()
            })
            .unwrap(),
        );
        let exchange = Arc::new(PaperExchange::new(Arc::new(ReplayFeed::new())));
        let executor = PhaseExecutor::new(
            Arc::new(BacktestClock),
            DataProvider::new(store, exchange),
            Arc::new(RecordingNotifier::new()),
            StrategyConfig::default(),
            RiskConfig::default(),
        )
        .unwrap();
        Arc::new(executor)
    }

    fn child_result(age: u32) -> BotResultDetails {
        BotResultDetails {
            currency: "BTCUSDT".to_string(),
            age,
            result: BotResult::Win,
            end_time: t0(),
            phase_log: PhaseLog::new(),
            trade: None,
            exit_price: Some(101.0),
            error: None,
        }
    }

    #[test]
    fn test_fork_shares_the_commit_gate() {
        let bot = CurrencyBot::new("BTCUSDT", executor(), CancelScope::root(), t0());
        let child = bot.fork();

        assert_eq!(child.age(), 1);
        assert_eq!(child.scope().depth(), 1);
        assert_eq!(child.log.entries()[0].phase, Phase::Forked);

        assert!(child.scope().try_commit());
        assert!(bot.scope().is_committed());
        assert!(!bot.scope().try_commit());
    }

    #[tokio::test]
    async fn test_fault_after_descendant_commit_keeps_the_child_trade() {
        let mut bot = CurrencyBot::new("BTCUSDT", executor(), CancelScope::root(), t0());
        let child_scope = bot.scope().child();
        assert!(child_scope.try_commit());
        bot.child = Some(tokio::spawn(async { Some(child_result(1)) }));

        let details = bot.cycle().await.unwrap();

        assert_eq!(details.age, 1);
        assert_eq!(details.result, BotResult::Win);
        assert!(!child_scope.is_cancelled());
    }

    #[tokio::test]
    async fn test_fault_before_any_commit_cancels_descendants() {
        let mut bot = CurrencyBot::new("BTCUSDT", executor(), CancelScope::root(), t0());
        let child_scope = bot.scope().child();
        bot.child = Some(tokio::spawn(async { Some(child_result(1)) }));

        let details = bot.cycle().await.unwrap();

        assert_eq!(details.age, 0);
        assert_eq!(details.result, BotResult::Faulted);
        assert!(details.error.unwrap().contains("no replay data"));
        assert!(child_scope.is_cancelled());
    }
}
