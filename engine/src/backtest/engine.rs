//! Backtesting engine
//!
//! Replays recorded 1-minute candles through the paper exchange on logical
//! time. The indicator store is backfilled up front with eviction disabled,
//! then strategy runs are started back to back for each symbol.

use crate::backtest::BacktestReport;
use crate::bot::{BotResult, CurrencyBot};
use crate::cancel::CancelScope;
use crate::clock::BacktestClock;
use crate::config::{IndicatorConfig, RiskConfig, StrategyConfig};
use crate::data::{align_to_minute, IndicatorStore};
use crate::exchange::{split_symbol, ExchangeClient, PaperExchange, ReplayFeed};
use crate::notify::{LogNotifier, Notifier};
use crate::phase::PhaseExecutor;
use crate::provider::DataProvider;
use crate::storage::StorageWorker;
use crate::Result;
use chrono::Duration;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};

/// Backtest runner
pub struct BacktestRunner {
    feed: Arc<ReplayFeed>,
    indicators: IndicatorConfig,
    strategy: StrategyConfig,
    risk: RiskConfig,
    starting_balance: f64,
    notifier: Arc<dyn Notifier>,
}

impl BacktestRunner {
    pub fn new(
        feed: ReplayFeed,
        indicators: IndicatorConfig,
        strategy: StrategyConfig,
        risk: RiskConfig,
        starting_balance: f64,
    ) -> Result<Self> {
        // history is replayed in full, nothing may be evicted
        let indicators = IndicatorConfig {
            retention_minutes: None,
            ..indicators
        };
        indicators.validate()?;
        strategy.validate(&indicators)?;
        risk.validate()?;
        Ok(Self {
            feed: Arc::new(feed),
            indicators,
            strategy,
            risk,
            starting_balance,
            notifier: Arc::new(LogNotifier),
        })
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Run every symbol of the feed, or only `symbols` when non-empty
    pub async fn run(&self, symbols: &[String], scope: &CancelScope) -> Result<BacktestReport> {
        let symbols: Vec<String> = if symbols.is_empty() {
            self.feed.symbols()
        } else {
            symbols.to_vec()
        };

        let store = Arc::new(IndicatorStore::new(self.indicators.clone())?);
        let mut exchange = PaperExchange::new(self.feed.clone());
        let quotes: BTreeSet<String> = symbols.iter().map(|s| split_symbol(s).1).collect();
        for quote in &quotes {
            exchange = exchange.with_balance(quote, self.starting_balance);
        }
        let exchange = Arc::new(exchange);
        let client: Arc<dyn ExchangeClient> = exchange.clone();

        let provider = DataProvider::new(store.clone(), client.clone());
        let executor = Arc::new(PhaseExecutor::new(
            Arc::new(BacktestClock),
            provider,
            self.notifier.clone(),
            self.strategy.clone(),
            self.risk.clone(),
        )?);

        let mut results = Vec::new();
        for symbol in &symbols {
            let Some((first, last)) = self.feed.range(symbol) else {
                warn!(symbol = %symbol, "no replay data, skipping");
                continue;
            };

            StorageWorker::new(symbol.clone(), store.clone(), client.clone())
                .with_clock(Arc::new(BacktestClock))
                .backfill(first, last)
                .await?;

            let mut start = first + self.indicators.candle_duration();
            while start < last && !scope.is_cancelled() {
                let details = CurrencyBot::new(symbol.clone(), executor.clone(), scope.child_tree(), start)
                    .run()
                    .await;

                // a run that reaches the end of the data without trading is discarded
                if details.result == BotResult::Faulted && details.trade.is_none() && details.end_time >= last {
                    break;
                }
                if scope.is_cancelled() {
                    break;
                }

                let next = align_to_minute(details.end_time);
                start = if next > start { next } else { start + Duration::minutes(1) };
                info!(symbol = %symbol, result = %details.result, age = details.age, "strategy run finished");
                results.push(details);
            }
        }

        let ending_balance = self.quote_balance(&exchange, &quotes).await?;
        Ok(BacktestReport::new(
            results,
            self.starting_balance * quotes.len() as f64,
            ending_balance,
            self.risk.quote_precision,
        ))
    }

    async fn quote_balance(&self, exchange: &PaperExchange, quotes: &BTreeSet<String>) -> Result<f64> {
        let mut total = 0.0;
        for quote in quotes {
            total += exchange.balance(quote).await?;
        }
        Ok(total)
    }
}
