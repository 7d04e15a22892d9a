use crate::state::{AppState, HandlerResult};
use std::sync::Arc;
use teloxide::prelude::*;

/// Results shown by /results
const RESULTS_SHOWN: usize = 10;

pub async fn handle_status(bot: Bot, msg: Message, state: Arc<AppState>) -> HandlerResult {
    tracing::info!(chat_id = msg.chat.id.0, "Handling /status command");

    let mut lines: Vec<String> = state
        .status
        .iter()
        .map(|entry| {
            let status = entry.value();
            let last = status
                .last_result
                .map(|r| r.to_string())
                .unwrap_or_else(|| "-".to_string());
            format!(
                "{}: run #{} since {}, last result {}",
                entry.key(),
                status.runs,
                status.running_since.format("%Y-%m-%d %H:%M"),
                last
            )
        })
        .collect();
    lines.sort();

    let mut text = if lines.is_empty() {
        "No bots running".to_string()
    } else {
        lines.join("\n")
    };
    for (asset, balance) in state.exchange.balances() {
        text.push_str(&format!("\n{asset}: {balance:.8}"));
    }
    if state.root.is_cancelled() {
        text.push_str("\nShutting down");
    }

    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

pub async fn handle_results(bot: Bot, msg: Message, state: Arc<AppState>) -> HandlerResult {
    tracing::info!(chat_id = msg.chat.id.0, "Handling /results command");

    let text = {
        let results = state.results.read().await;
        if results.is_empty() {
            "No results yet".to_string()
        } else {
            results
                .iter()
                .rev()
                .take(RESULTS_SHOWN)
                .map(|details| details.to_string())
                .collect::<Vec<_>>()
                .join("\n")
        }
    };

    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}
