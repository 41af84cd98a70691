//! 具体渠道实现

pub mod console;
pub mod telegram;

pub use console::LogNotifier;
pub use telegram::{TelegramConfig, TelegramNotifier};
