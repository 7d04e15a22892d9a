use crate::state::{AppState, HandlerResult};
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;

pub mod admin;
pub mod status;

pub use admin::{handle_stop, handle_version};
pub use status::{handle_results, handle_status};

/// Cryptobot commands
#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase")]
pub enum Command {
    /// Show this help
    Help,
    /// What each symbol's bot is doing
    Status,
    /// Latest strategy results
    Results,
    /// Stop every bot and storage worker
    Stop,
    /// What is the current version ?
    Version,
}

pub async fn handle_help(bot: Bot, msg: Message, _state: Arc<AppState>) -> HandlerResult {
    tracing::info!(chat_id = msg.chat.id.0, "Handling /help command");
    bot.send_message(msg.chat.id, Command::descriptions().to_string())
        .await?;
    Ok(())
}

pub async fn handle_invalid(bot: Bot, msg: Message) -> HandlerResult {
    bot.send_message(msg.chat.id, "Unknown command, try /help")
        .await?;
    Ok(())
}
