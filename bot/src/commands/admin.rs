use crate::state::{AppState, HandlerResult};
use chrono::{TimeZone, Utc};
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::ParseMode;

pub async fn handle_version(bot: Bot, msg: Message, _state: Arc<AppState>) -> HandlerResult {
    tracing::info!(chat_id = msg.chat.id.0, "Handling /version command");

    // Set by build.rs
    let git_hash = option_env!("GIT_HASH").unwrap_or("unknown");
    let git_branch = option_env!("GIT_BRANCH").unwrap_or("unknown");
    let git_tag = option_env!("GIT_TAG").unwrap_or("unknown");

    let build_time_raw = option_env!("BUILD_TIME").unwrap_or("unknown");
    let build_time_human = build_time_raw
        .parse::<i64>()
        .ok()
        .and_then(|epoch| Utc.timestamp_opt(epoch, 0).single())
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| build_time_raw.to_string());

    let version_info = format!(
        "<b>Cryptobot {}</b>\n\
        <b>Branch:</b> <code>{}</code>\n\
        <b>Tag:</b> <code>{}</code>\n\
        <b>Commit:</b> <code>{}</code>\n\
        <b>Build Time:</b> <code>{}</code>",
        env!("CARGO_PKG_VERSION"),
        git_branch,
        git_tag,
        git_hash,
        build_time_human,
    );

    bot.send_message(msg.chat.id, version_info)
        .parse_mode(ParseMode::Html)
        .await?;

    Ok(())
}

/// Cancel the root scope; only the notification chat may do this when one
/// is configured
pub async fn handle_stop(bot: Bot, msg: Message, state: Arc<AppState>) -> HandlerResult {
    if let Some(admin_chat) = state.config.notify_chat_id {
        if msg.chat.id.0 != admin_chat {
            tracing::warn!(chat_id = msg.chat.id.0, "Rejected /stop from foreign chat");
            bot.send_message(msg.chat.id, "Not allowed").await?;
            return Ok(());
        }
    }

    tracing::info!(chat_id = msg.chat.id.0, "Handling /stop command");
    if state.root.is_cancelled() {
        bot.send_message(msg.chat.id, "Already stopping").await?;
        return Ok(());
    }
    state.root.cancel();
    bot.send_message(msg.chat.id, "Stopping all bots, results will be exported")
        .await?;
    Ok(())
}
