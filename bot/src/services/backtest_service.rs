use crate::config::Config;
use anyhow::Context;
use cryptobot_engine::backtest::BacktestRunner;
use cryptobot_engine::cancel::CancelScope;
use cryptobot_engine::storage::{export_results, load_candles};
use tracing::info;

/// Replay the recorded candles, print the report and export the results
pub async fn run(config: Config) -> Result<(), anyhow::Error> {
    let path = config
        .backtest_candles_path
        .clone()
        .context("BACKTEST_CANDLES_PATH is not set")?;
    let feed = load_candles(&path).with_context(|| format!("loading {}", path.display()))?;
    info!(path = %path.display(), symbols = ?feed.symbols(), "replay data loaded");

    let runner = BacktestRunner::new(
        feed,
        config.indicators.clone(),
        config.strategy.clone(),
        config.risk.clone(),
        config.starting_balance,
    )?;

    let root = CancelScope::root();
    let on_interrupt = root.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupted, stopping backtest");
            on_interrupt.cancel();
        }
    });

    let report = runner.run(&config.symbols, &root).await?;
    println!("{}", report.format());

    let added = export_results(report.results(), &config.results_path)?;
    info!(path = %config.results_path.display(), added, "backtest results exported");
    Ok(())
}
