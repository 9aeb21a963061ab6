//! Telegram front-end: Bot API client, command parsing and dispatch.

pub mod api;
pub mod commands;
pub mod handler;
pub mod notifier;
pub mod poller;
pub mod types;

pub use api::BotApi;
pub use commands::Command;
pub use handler::Handler;
pub use notifier::TelegramNotifier;
pub use poller::run_polling;
