use anyhow::Result;
use std::sync::Arc;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod services;
mod state;

use crate::commands::{handle_help, handle_invalid, handle_results, handle_status, handle_stop, handle_version, Command};
use crate::config::{Config, Mode};
use crate::state::AppState;
use cryptobot_engine::notify::{LogNotifier, Notifier};

fn schema() -> UpdateHandler<anyhow::Error> {
    use dptree::case;

    let command_handler = teloxide::filter_command::<Command, _>()
        .branch(case![Command::Help].endpoint(handle_help))
        .branch(case![Command::Status].endpoint(handle_status))
        .branch(case![Command::Results].endpoint(handle_results))
        .branch(case![Command::Stop].endpoint(handle_stop))
        .branch(case![Command::Version].endpoint(handle_version));

    Update::filter_message()
        .branch(command_handler)
        .branch(dptree::endpoint(handle_invalid))
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    match config.mode {
        Mode::Backtest => {
            tracing::info!("Starting cryptobot backtest...");
            services::backtest_service::run(config).await
        }
        Mode::Live => run_live(config).await,
    }
}

async fn run_live(config: Config) -> Result<(), anyhow::Error> {
    tracing::info!(symbols = ?config.symbols, "Starting cryptobot...");

    let bot = config.bot_token.as_deref().map(Bot::new);
    let notifier: Arc<dyn Notifier> = match (&bot, config.notify_chat_id) {
        (Some(bot), Some(chat_id)) => Arc::new(services::TelegramNotifier::new(bot.clone(), chat_id)),
        _ => Arc::new(LogNotifier),
    };

    let app_state = Arc::new(AppState::new(config, notifier)?);
    services::export_service::restore(&app_state);
    tracing::info!("AppState initialized");

    let mut tasks = Vec::new();
    for symbol in app_state.config.symbols.clone() {
        tasks.push(tokio::spawn(services::bot_service::run_storage(app_state.clone(), symbol.clone())));
        tasks.push(tokio::spawn(services::bot_service::run_symbol(app_state.clone(), symbol)));
    }
    tasks.push(tokio::spawn(services::export_service::run(app_state.clone())));

    let dispatcher = bot.map(|bot| {
        let mut dispatcher = Dispatcher::builder(bot, schema())
            .dependencies(dptree::deps![app_state.clone()])
            .build();
        tracing::info!("Bot is running and waiting for updates...");
        tokio::spawn(async move { dispatcher.dispatch().await })
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Ctrl-C received, shutting down");
            app_state.root.cancel();
        }
        _ = app_state.root.cancelled() => {
            tracing::info!("Stop requested, shutting down");
        }
    }

    for task in tasks {
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "task ended abnormally");
        }
    }
    if let Some(dispatcher) = dispatcher {
        dispatcher.abort();
    }

    services::export_service::export_once(&app_state).await;
    tracing::info!("Shutdown complete");
    Ok(())
}
