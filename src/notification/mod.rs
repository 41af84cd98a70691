//! 通知层 - 把引擎的状态变化报告给人类操作员
//!
//! 所有渠道实现 `Notifier` trait；引擎只依赖 trait，通知失败只记录日志。

pub mod channel;
pub mod channels;
pub mod formatter;

pub use channel::{notify_logged, Notifier, SendResult};
pub use channels::{LogNotifier, TelegramConfig, TelegramNotifier};
