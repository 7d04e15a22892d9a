use crate::state::{AppState, SymbolStatus};
use cryptobot_engine::bot::{BotResult, CurrencyBot};
use cryptobot_engine::clock::Clock;
use cryptobot_engine::notify::Notifier;
use cryptobot_engine::storage::StorageWorker;
use std::sync::Arc;
use tracing::{info, warn};

/// History the storage worker replays before the first strategy run
const WARM_UP_MINUTES: i64 = 120;

/// Backfill recent minutes, then keep the store current until shutdown
pub async fn run_storage(state: Arc<AppState>, symbol: String) {
    let worker = StorageWorker::new(symbol.clone(), state.store.clone(), state.exchange.clone());

    let now = state.clock.now();
    let from = now - chrono::Duration::minutes(WARM_UP_MINUTES);
    if let Err(e) = worker.backfill(from, now).await {
        warn!(symbol = %symbol, error = %e, "warm-up backfill failed");
    }

    worker.run(state.root.child()).await;
}

/// Run strategy after strategy for one symbol until the root is cancelled
///
/// Each run gets its own commit gate. A faulted run is retried after the
/// strategy's retry delay.
pub async fn run_symbol(state: Arc<AppState>, symbol: String) {
    let strategy = state.executor.strategy();
    let mut runs = 0u32;

    while !state.root.is_cancelled() {
        runs += 1;
        let start = state.clock.now();
        let last_result = state.status.get(&symbol).and_then(|s| s.last_result);
        state.status.insert(
            symbol.clone(),
            SymbolStatus {
                runs,
                running_since: start,
                last_result,
            },
        );
        info!(symbol = %symbol, run = runs, %start, "starting strategy run");

        let details = CurrencyBot::new(symbol.clone(), state.executor.clone(), state.root.child_tree(), start)
            .run()
            .await;

        if state.root.is_cancelled() && details.trade.is_none() {
            info!(symbol = %symbol, "strategy loop stopped");
            break;
        }

        info!(symbol = %symbol, result = %details.result, age = details.age, "strategy run finished");
        state.notifier.notify(&details.to_string()).await;
        let faulted = details.result == BotResult::Faulted;
        state.record(details).await;

        if faulted {
            let delay = strategy.retry_delay_secs;
            if let Err(e) = state.clock.wait(&state.root, &symbol, delay, "restart", start).await {
                if !e.is_cancelled() {
                    warn!(symbol = %symbol, error = %e, "restart delay failed");
                }
                break;
            }
        }
    }
    state.status.remove(&symbol);
}
