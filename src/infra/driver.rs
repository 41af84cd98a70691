//! 会话驱动抽象 - 引擎只通过这六个操作接触被管理的会话

use async_trait::async_trait;
use thiserror::Error;

/// 驱动错误
#[derive(Debug, Error)]
pub enum DriverError {
    /// 会话不存在
    #[error("tmux session \"{0}\" does not exist")]
    SessionMissing(String),
    /// 底层命令执行失败
    #[error("{op} failed: {stderr}")]
    CommandFailed { op: &'static str, stderr: String },
    /// 无法启动子进程
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// 被管理会话的驱动
///
/// 实现方需要自行保证并发调用安全；引擎的多个循环可能同时调用同一个驱动。
#[async_trait]
pub trait SessionDriver: Send + Sync {
    /// 会话是否存在
    async fn exists(&self) -> Result<bool, DriverError>;

    /// 确保会话存在（幂等）
    async fn ensure(&self) -> Result<(), DriverError>;

    /// 发送一行输入（自动回车），会话不存在时失败
    async fn send(&self, text: &str) -> Result<(), DriverError>;

    /// 捕获最近 N 行终端输出，会话不存在时失败
    async fn capture(&self) -> Result<String, DriverError>;

    /// 终止会话，会话不存在时为空操作
    async fn kill(&self) -> Result<(), DriverError>;

    /// 会话描述信息（用于调试）
    async fn info(&self) -> Result<String, DriverError>;
}
