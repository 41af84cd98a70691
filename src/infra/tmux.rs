//! tmux 管理模块 - 封装 tmux 操作

use async_trait::async_trait;
use std::process::Output;
use tokio::process::Command;
use tracing::{debug, error, info};

use super::driver::{DriverError, SessionDriver};

/// 默认捕获行数
pub const DEFAULT_CAPTURE_LINES: u32 = 3000;

/// tmux 管理器
///
/// 绑定到单个 session，session 内运行配置好的命令。
#[derive(Debug, Clone)]
pub struct TmuxManager {
    session_name: String,
    command: String,
    capture_lines: u32,
}

impl TmuxManager {
    pub fn new(session_name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            session_name: session_name.into(),
            command: command.into(),
            capture_lines: DEFAULT_CAPTURE_LINES,
        }
    }

    /// 设置捕获行数
    pub fn with_capture_lines(mut self, lines: u32) -> Self {
        self.capture_lines = lines;
        self
    }

    pub fn session_name(&self) -> &str {
        &self.session_name
    }

    /// 检查 tmux 是否可用
    pub fn is_available(&self) -> bool {
        which::which("tmux").is_ok()
    }

    async fn tmux(&self, args: &[&str]) -> Result<Output, DriverError> {
        Ok(Command::new("tmux").args(args).output().await?)
    }

    fn check(&self, op: &'static str, output: Output) -> Result<Output, DriverError> {
        if output.status.success() {
            Ok(output)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            error!(session = %self.session_name, op, stderr = %stderr, "tmux command failed");
            Err(DriverError::CommandFailed { op, stderr })
        }
    }

    async fn require_session(&self) -> Result<(), DriverError> {
        if self.exists().await? {
            Ok(())
        } else {
            Err(DriverError::SessionMissing(self.session_name.clone()))
        }
    }
}

#[async_trait]
impl SessionDriver for TmuxManager {
    async fn exists(&self) -> Result<bool, DriverError> {
        let output = self.tmux(&["has-session", "-t", &self.session_name]).await?;
        Ok(output.status.success())
    }

    async fn ensure(&self) -> Result<(), DriverError> {
        if self.exists().await? {
            return Ok(());
        }

        debug!(session = %self.session_name, command = %self.command, "Creating tmux session");
        let output = self
            .tmux(&["new-session", "-d", "-s", &self.session_name, &self.command])
            .await?;
        self.check("new-session", output)?;
        info!(session = %self.session_name, "Tmux session created");
        Ok(())
    }

    async fn send(&self, text: &str) -> Result<(), DriverError> {
        self.require_session().await?;
        info!(session = %self.session_name, text_len = text.len(), "Sending keys to tmux session");

        // -l 按字面发送，避免 "Enter" 之类的文本被解释为按键；
        // "--" 之后的参数不再解析为选项，以 "-" 开头的文本也能发送
        let output = self
            .tmux(&["send-keys", "-t", &self.session_name, "-l", "--", text])
            .await?;
        self.check("send-keys", output)?;

        let output = self.tmux(&["send-keys", "-t", &self.session_name, "Enter"]).await?;
        self.check("send-keys", output)?;
        debug!(session = %self.session_name, "Enter key sent");
        Ok(())
    }

    async fn capture(&self) -> Result<String, DriverError> {
        self.require_session().await?;
        let start = format!("-{}", self.capture_lines);
        let output = self
            .tmux(&["capture-pane", "-t", &self.session_name, "-p", "-S", &start])
            .await?;
        let output = self.check("capture-pane", output)?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn kill(&self) -> Result<(), DriverError> {
        if !self.exists().await? {
            return Ok(());
        }

        debug!(session = %self.session_name, "Killing tmux session");
        let output = self.tmux(&["kill-session", "-t", &self.session_name]).await?;
        self.check("kill-session", output)?;
        info!(session = %self.session_name, "Tmux session killed");
        Ok(())
    }

    async fn info(&self) -> Result<String, DriverError> {
        self.require_session().await?;
        let output = self
            .tmux(&[
                "display-message",
                "-t",
                &self.session_name,
                "-p",
                "#{session_name} #{pane_width}x#{pane_height} #{pane_current_command}",
            ])
            .await?;
        let output = self.check("display-message", output)?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// 全局计数器，确保测试 session 名称唯一
    static TEST_SESSION_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn unique_session_name(prefix: &str) -> String {
        let counter = TEST_SESSION_COUNTER.fetch_add(1, Ordering::SeqCst);
        format!("{}-{}-{}", prefix, std::process::id(), counter)
    }

    #[test]
    fn test_builder_sets_capture_lines() {
        let manager = TmuxManager::new("relay-test", "cat").with_capture_lines(50);
        assert_eq!(manager.capture_lines, 50);
        assert_eq!(manager.session_name(), "relay-test");
    }

    #[tokio::test]
    #[ignore = "requires tmux"]
    async fn test_ensure_is_idempotent() {
        // Given: 一个不存在的 session
        let manager = TmuxManager::new(unique_session_name("relay-test"), "sleep 60");

        // When: 连续两次 ensure
        manager.ensure().await.unwrap();
        manager.ensure().await.unwrap();

        // Then: session 存在
        assert!(manager.exists().await.unwrap());

        manager.kill().await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires tmux"]
    async fn test_capture_contains_output() {
        let manager = TmuxManager::new(
            unique_session_name("relay-test"),
            "echo 'test output'; sleep 60",
        );
        manager.ensure().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;

        let output = manager.capture().await.unwrap();
        assert!(output.contains("test output"));

        manager.kill().await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires tmux"]
    async fn test_send_dash_prefixed_text() {
        // Given: 回显输入的 session
        let manager = TmuxManager::new(unique_session_name("relay-test"), "cat");
        manager.ensure().await.unwrap();

        // When: 文本以 "-" 开头
        manager.send("-v what does this flag do").await.unwrap();
        manager.send("- list the files").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;

        // Then: 按字面出现在输出中
        let output = manager.capture().await.unwrap();
        assert!(output.contains("-v what does this flag do"));
        assert!(output.contains("- list the files"));

        manager.kill().await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires tmux"]
    async fn test_missing_session_behaviour() {
        let manager = TmuxManager::new("relay-nonexistent-session-xyz", "cat");

        assert!(!manager.exists().await.unwrap());
        // kill 对不存在的 session 是空操作
        assert!(manager.kill().await.is_ok());
        assert!(matches!(
            manager.send("hello").await,
            Err(DriverError::SessionMissing(_))
        ));
        assert!(matches!(
            manager.capture().await,
            Err(DriverError::SessionMissing(_))
        ));
    }
}
