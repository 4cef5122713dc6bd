//! Telegram front end: bot commands and the Telegram delivery channel

pub mod bot;
pub mod destination;
pub mod handlers;
pub mod status;

// Re-exports for convenience
pub use bot::{create_bot, setup_bot_commands, Command};
pub use destination::TelegramDestination;
pub use handlers::{schema, HandlerDeps, HandlerError};
