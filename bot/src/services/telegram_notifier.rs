use async_trait::async_trait;
use cryptobot_engine::notify::Notifier;
use teloxide::prelude::*;

/// Sends notifications to one Telegram chat; failures are only logged
pub struct TelegramNotifier {
    bot: Bot,
    chat_id: ChatId,
}

impl TelegramNotifier {
    pub fn new(bot: Bot, chat_id: i64) -> Self {
        Self {
            bot,
            chat_id: ChatId(chat_id),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, text: &str) {
        if let Err(e) = self.bot.send_message(self.chat_id, text.to_string()).await {
            tracing::warn!(chat_id = self.chat_id.0, error = %e, "Telegram notification failed");
        }
    }
}
