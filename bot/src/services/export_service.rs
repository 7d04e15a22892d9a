use crate::state::AppState;
use cryptobot_engine::storage::{export_results, export_store, restore_store};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Load a previous export into the store, if there is one
pub fn restore(state: &AppState) {
    let path = &state.config.export_path;
    if !path.exists() {
        return;
    }
    match restore_store(&state.store, path) {
        Ok(records) => info!(path = %path.display(), records, "indicator store restored"),
        Err(e) => warn!(path = %path.display(), error = %e, "could not restore indicator store"),
    }
}

/// Export the store and results every `export_interval_secs` until the root
/// is cancelled
pub async fn run(state: Arc<AppState>) {
    let interval = Duration::from_secs(state.config.export_interval_secs.max(1));
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = state.root.cancelled() => break,
        }
        export_once(&state).await;
    }
}

pub async fn export_once(state: &AppState) {
    if let Err(e) = export_store(&state.store, &state.config.export_path) {
        warn!(error = %e, "indicator export failed");
    }
    let results = state.results.read().await.clone();
    if let Err(e) = export_results(&results, &state.config.results_path) {
        warn!(error = %e, "results export failed");
    }
}
