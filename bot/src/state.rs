use crate::config::Config;
use chrono::{DateTime, Utc};
use cryptobot_engine::bot::{BotResult, BotResultDetails};
use cryptobot_engine::cancel::CancelScope;
use cryptobot_engine::clock::WallClock;
use cryptobot_engine::data::IndicatorStore;
use cryptobot_engine::exchange::{split_symbol, BinanceFeed, PaperExchange};
use cryptobot_engine::notify::Notifier;
use cryptobot_engine::phase::PhaseExecutor;
use cryptobot_engine::provider::DataProvider;
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::RwLock;

pub type HandlerResult = Result<(), anyhow::Error>;

/// What a symbol's strategy loop is doing right now
#[derive(Debug, Clone)]
pub struct SymbolStatus {
    pub runs: u32,
    pub running_since: DateTime<Utc>,
    pub last_result: Option<BotResult>,
}

pub struct AppState {
    pub config: Config,
    pub store: Arc<IndicatorStore>,
    pub exchange: Arc<PaperExchange>,
    pub executor: Arc<PhaseExecutor>,
    pub clock: Arc<WallClock>,
    pub notifier: Arc<dyn Notifier>,
    /// Cancelled by `/stop` or Ctrl-C; every worker and bot hangs below it
    pub root: CancelScope,
    pub results: RwLock<Vec<BotResultDetails>>,
    pub status: DashMap<String, SymbolStatus>,
}

impl AppState {
    pub fn new(config: Config, notifier: Arc<dyn Notifier>) -> Result<Self, anyhow::Error> {
        let store = Arc::new(IndicatorStore::new(config.indicators.clone())?);
        let feed = BinanceFeed::new(config.binance_base_url.clone())?;

        // live prices, simulated fills
        let mut exchange = PaperExchange::new(Arc::new(feed));
        let quotes: BTreeSet<String> = config.symbols.iter().map(|s| split_symbol(s).1).collect();
        for quote in &quotes {
            exchange = exchange.with_balance(quote, config.starting_balance);
        }
        let exchange = Arc::new(exchange);

        let clock = Arc::new(WallClock::default());
        let executor = PhaseExecutor::new(
            clock.clone(),
            DataProvider::new(store.clone(), exchange.clone()),
            notifier.clone(),
            config.strategy.clone(),
            config.risk.clone(),
        )?;

        Ok(AppState {
            config,
            store,
            exchange,
            executor: Arc::new(executor),
            clock,
            notifier,
            root: CancelScope::root(),
            results: RwLock::new(Vec::new()),
            status: DashMap::new(),
        })
    }

    pub async fn record(&self, details: BotResultDetails) {
        if let Some(mut status) = self.status.get_mut(&details.currency) {
            status.last_result = Some(details.result);
        }
        self.results.write().await.push(details);
    }
}
