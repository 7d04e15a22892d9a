pub mod backtest_service;
pub mod bot_service;
pub mod export_service;
pub mod telegram_notifier;

pub use telegram_notifier::TelegramNotifier;
