//! 控制台渠道 - 未配置任何推送渠道时的回退

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use crate::notification::channel::Notifier;

/// 把通知打印到 stdout 并记录日志
#[derive(Debug, Default)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "console"
    }

    async fn notify(&self, recipient: &str, text: &str) -> Result<()> {
        info!(recipient, "Operator notification");
        println!("[通知] {}", text);
        Ok(())
    }
}
