//! Telegram transport runtime for Tally: long-polling loop, conversation
//! flows, and the daily reminder sweep.

mod telegram_runtime;

pub use telegram_runtime::{run_telegram_bot, TelegramBotConfig};
