pub mod commands;
pub mod sender;

pub use commands::{start_bot, BotDeps, Command};
pub use sender::TelegramSender;
