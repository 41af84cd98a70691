//! 会话中继 - 向被管理会话转发提问并取回回应

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

use crate::infra::driver::{DriverError, SessionDriver};
use crate::monitor::{CompletionHandler, DiffDetector, OutputMonitor};
use crate::notification::formatter::{self, msg};
use crate::service::{ResourceStatus, StatusSource};

/// 清空会话上下文的命令
pub const CLEAR_COMMAND: &str = "/clear";

/// 会话状态
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub active: bool,
    pub info: Option<String>,
    pub context: Option<ResourceStatus>,
}

impl SessionStatus {
    /// 可读形式
    pub fn render(&self) -> String {
        let mut text = String::from("📊 Claude Code 状态\n\n");
        text.push_str(&format!(
            "Session: {}\n",
            if self.active {
                msg::SESSION_ACTIVE
            } else {
                msg::SESSION_INACTIVE
            }
        ));
        if let Some(context) = &self.context {
            text.push_str(&format!(
                "Context Usage: {} ({}/{} tokens)\n",
                formatter::format_usage(context.usage),
                context.token_count,
                context.max_tokens
            ));
        }
        if let Some(info) = &self.info {
            text.push_str(&format!("\nSession Info:\n{}\n", info));
        }
        text
    }
}

/// 把完整输出裁剪为相对基线的新增部分再交给下游
struct ReplyExtractor {
    baseline: String,
    detector: DiffDetector,
    inner: Arc<dyn CompletionHandler>,
}

#[async_trait]
impl CompletionHandler for ReplyExtractor {
    async fn on_complete(&self, output: String) {
        let reply = self
            .detector
            .extract_new_content(&self.baseline, &output)
            .to_string();
        info!(output_len = output.len(), reply_len = reply.len(), "Reply extracted");
        self.inner.on_complete(reply).await;
    }

    async fn on_failure(&self, error: &DriverError) {
        self.inner.on_failure(error).await;
    }
}

/// 把完成结果转发到 channel
struct ChannelHandler {
    tx: mpsc::UnboundedSender<Result<String, String>>,
}

#[async_trait]
impl CompletionHandler for ChannelHandler {
    async fn on_complete(&self, output: String) {
        let _ = self.tx.send(Ok(output));
    }

    async fn on_failure(&self, error: &DriverError) {
        let _ = self.tx.send(Err(error.to_string()));
    }
}

/// 会话中继
pub struct SessionRelay {
    driver: Arc<dyn SessionDriver>,
    monitor: OutputMonitor,
    status_source: Option<Arc<dyn StatusSource>>,
    compact_command: String,
    settle_delay: Duration,
    /// 串行化 ask：检查空闲到启动监控之间不能插入另一次发送
    ask_lock: Mutex<()>,
}

impl SessionRelay {
    pub fn new(driver: Arc<dyn SessionDriver>, monitor: OutputMonitor) -> Self {
        Self {
            driver,
            monitor,
            status_source: None,
            compact_command: "/compact".to_string(),
            settle_delay: Duration::from_secs(2),
            ask_lock: Mutex::new(()),
        }
    }

    /// 设置 context 状态来源
    pub fn with_status_source(mut self, source: Arc<dyn StatusSource>) -> Self {
        self.status_source = Some(source);
        self
    }

    pub fn with_compact_command(mut self, command: impl Into<String>) -> Self {
        self.compact_command = command.into();
        self
    }

    /// 设置 reset 后的等待时间
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn monitor(&self) -> &OutputMonitor {
        &self.monitor
    }

    /// 提问
    ///
    /// 返回是否启动了新的监控；已有提问在等待回应时不发送，返回 false。
    /// `handler` 收到的是相对提问前输出的新增内容。
    pub async fn ask(&self, prompt: &str, handler: Arc<dyn CompletionHandler>) -> Result<bool> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            bail!("prompt must not be empty");
        }
        let _guard = self.ask_lock.lock().await;
        if self.monitor.is_running() {
            warn!("A previous prompt is still being answered");
            return Ok(false);
        }

        self.driver.ensure().await?;
        let baseline = self.driver.capture().await?;
        info!(prompt_len = prompt.len(), "Relaying prompt");
        self.driver.send(prompt).await?;

        let extractor = ReplyExtractor {
            baseline,
            detector: DiffDetector::new(),
            inner: handler,
        };
        let poll_interval = self.monitor.config().poll_interval;
        Ok(self
            .monitor
            .start(self.driver.clone(), Arc::new(extractor), poll_interval))
    }

    /// 提问并等待回应
    pub async fn ask_and_wait(&self, prompt: &str, timeout: Duration) -> Result<String> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        if !self.ask(prompt, Arc::new(ChannelHandler { tx })).await? {
            bail!("another prompt is still being answered");
        }

        match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Some(Ok(reply))) => Ok(reply),
            Ok(Some(Err(e))) => Err(anyhow!("capture failed: {}", e)),
            Ok(None) => Err(anyhow!("output monitor exited without a reply")),
            Err(_) => {
                self.monitor.stop();
                Err(anyhow!("no reply within {}s", timeout.as_secs()))
            }
        }
    }

    /// 清空会话上下文
    pub async fn reset(&self) -> Result<()> {
        self.driver.send(CLEAR_COMMAND).await?;
        tokio::time::sleep(self.settle_delay).await;
        info!("Session reset");
        Ok(())
    }

    /// 手动压缩
    pub async fn compact(&self) -> Result<()> {
        self.driver.send(&self.compact_command).await?;
        info!(command = %self.compact_command, "Compact command sent");
        Ok(())
    }

    /// 当前状态
    pub async fn status(&self) -> Result<SessionStatus> {
        let active = self.driver.exists().await?;
        let info = if active {
            Some(self.driver.info().await?)
        } else {
            None
        };
        let context = match &self.status_source {
            Some(source) => source.fetch().await,
            None => None,
        };
        Ok(SessionStatus {
            active,
            info,
            context,
        })
    }
}
