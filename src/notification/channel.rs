//! 通知渠道 trait 定义

use anyhow::Result;
use async_trait::async_trait;
use tracing::warn;

/// 发送结果
#[derive(Debug, Clone, PartialEq)]
pub enum SendResult {
    /// 发送成功
    Sent,
    /// 发送失败（已记录日志，不重试）
    Failed(String),
}

impl SendResult {
    pub fn is_sent(&self) -> bool {
        matches!(self, SendResult::Sent)
    }
}

/// 通知渠道，向人类操作员报告状态变化
#[async_trait]
pub trait Notifier: Send + Sync {
    /// 渠道名称（用于日志）
    fn name(&self) -> &str;

    /// 向指定接收者发送一条文本
    async fn notify(&self, recipient: &str, text: &str) -> Result<()>;
}

/// 发送通知，失败只记录日志
///
/// 引擎内部的所有通知都走这里：通知失败不应该打断调用方的流程。
pub async fn notify_logged(notifier: &dyn Notifier, recipient: &str, text: &str) -> SendResult {
    match notifier.notify(recipient, text).await {
        Ok(()) => SendResult::Sent,
        Err(e) => {
            warn!(channel = notifier.name(), recipient, error = %e, "Failed to send notification");
            SendResult::Failed(e.to_string())
        }
    }
}
