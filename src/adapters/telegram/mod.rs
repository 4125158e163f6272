//! Telegram adapter - delivers entitlement notifications to the chat.

mod notifier;

pub use notifier::{TelegramConfig, TelegramNotifier};
