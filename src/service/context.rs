//! Context window 监控 - 使用率超过阈值时自动执行 /compact
//!
//! 状态来源不可用时静默跳过本轮；压缩流程中的失败通知操作员后照常继续下一轮。

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, info_span, warn};

use crate::infra::driver::SessionDriver;
use crate::notification::{formatter, notify_logged, Notifier};
use crate::scheduler::{spawn_periodic, LoopControl, LoopHandle, PeriodicTask};

/// 默认状态接口
pub const DEFAULT_STATUS_URL: &str = "http://localhost:37777/api/status";

/// 默认 max tokens（接口未返回时）
pub const DEFAULT_MAX_TOKENS: u64 = 200_000;

/// Context window 状态
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceStatus {
    /// 使用率 0.0 - 1.0，缺省按 0 处理
    #[serde(default)]
    pub usage: f64,
    #[serde(default)]
    pub token_count: u64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u64,
}

fn default_max_tokens() -> u64 {
    DEFAULT_MAX_TOKENS
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusEnvelope {
    context_window: Option<ResourceStatus>,
}

/// 解析状态接口的响应体
///
/// 缺少 `contextWindow`、格式错误或 usage 超出 [0, 1] 都视为未知。
pub fn parse_status(body: &str) -> Option<ResourceStatus> {
    let envelope: StatusEnvelope = match serde_json::from_str(body) {
        Ok(envelope) => envelope,
        Err(e) => {
            debug!(error = %e, "Malformed status response");
            return None;
        }
    };

    envelope
        .context_window
        .filter(|status| (0.0..=1.0).contains(&status.usage))
}

/// 外部状态来源
#[async_trait]
pub trait StatusSource: Send + Sync {
    /// 取当前状态，不可用时返回 None
    async fn fetch(&self) -> Option<ResourceStatus>;
}

/// 基于 HTTP 的状态来源
#[derive(Debug)]
pub struct HttpStatusSource {
    client: Client,
    url: String,
}

impl HttpStatusSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl StatusSource for HttpStatusSource {
    async fn fetch(&self) -> Option<ResourceStatus> {
        let response = match self.client.get(&self.url).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!(url = %self.url, error = %e, "Status endpoint unreachable");
                return None;
            }
        };

        if !response.status().is_success() {
            warn!(url = %self.url, status = %response.status(), "Status endpoint returned error");
            return None;
        }

        let body = response.text().await.ok()?;
        parse_status(&body)
    }
}

/// Context 监控配置
#[derive(Debug, Clone)]
pub struct ContextMonitorConfig {
    /// 触发压缩的使用率阈值
    pub threshold: f64,
    /// 检查间隔
    pub check_interval: Duration,
    /// 发送压缩命令后等待生效的时间
    pub compact_grace: Duration,
    /// 压缩命令
    pub compact_command: String,
}

impl Default for ContextMonitorConfig {
    fn default() -> Self {
        Self {
            threshold: 0.8,
            check_interval: Duration::from_secs(30),
            compact_grace: Duration::from_secs(5),
            compact_command: "/compact".to_string(),
        }
    }
}

/// 单次检查的结果
#[derive(Debug, Clone, PartialEq)]
pub enum CheckOutcome {
    /// 状态未知，本轮跳过
    Unknown,
    /// 低于阈值
    Normal(f64),
    /// 已执行压缩
    Compacted { before: f64, after: Option<f64> },
    /// 压缩命令发送失败
    CompactFailed { before: f64 },
}

struct Shared {
    config: ContextMonitorConfig,
    source: Arc<dyn StatusSource>,
    driver: Arc<dyn SessionDriver>,
    notifier: Arc<dyn Notifier>,
    recipient: String,
    last_usage: Mutex<Option<f64>>,
}

impl Shared {
    fn set_last_usage(&self, usage: Option<f64>) {
        *self.last_usage.lock().unwrap_or_else(|e| e.into_inner()) = usage;
    }

    async fn check(&self) -> CheckOutcome {
        let Some(status) = self.source.fetch().await else {
            debug!("Context status unavailable, skipping");
            return CheckOutcome::Unknown;
        };

        if status.usage >= self.config.threshold {
            warn!(
                usage = status.usage,
                threshold = self.config.threshold,
                "Context window near limit, compacting"
            );
            self.compact(status).await
        } else {
            debug!(usage = status.usage, "Context window usage normal");
            self.set_last_usage(Some(status.usage));
            CheckOutcome::Normal(status.usage)
        }
    }

    async fn compact(&self, status: ResourceStatus) -> CheckOutcome {
        let before = status.usage;
        notify_logged(
            self.notifier.as_ref(),
            &self.recipient,
            &formatter::compact_started(before),
        )
        .await;

        info!(command = %self.config.compact_command, usage = before, "Sending compact command");
        if let Err(e) = self.driver.send(&self.config.compact_command).await {
            error!(error = %e, "Failed to send compact command");
            notify_logged(
                self.notifier.as_ref(),
                &self.recipient,
                formatter::msg::COMPACT_FAILED,
            )
            .await;
            return CheckOutcome::CompactFailed { before };
        }

        tokio::time::sleep(self.config.compact_grace).await;

        let after = self.source.fetch().await.map(|s| s.usage);
        notify_logged(
            self.notifier.as_ref(),
            &self.recipient,
            &formatter::compact_finished(before, after),
        )
        .await;

        info!(old_usage = before, new_usage = ?after, "Compact finished");
        self.set_last_usage(after);
        CheckOutcome::Compacted { before, after }
    }
}

struct CompactTask {
    shared: Arc<Shared>,
}

#[async_trait]
impl PeriodicTask for CompactTask {
    async fn tick(&mut self, _control: &LoopControl) {
        self.shared.check().await;
    }
}

/// Context window 监控器
pub struct ContextMonitor {
    shared: Arc<Shared>,
    active: Mutex<Option<LoopHandle>>,
}

impl ContextMonitor {
    pub fn new(
        config: ContextMonitorConfig,
        source: Arc<dyn StatusSource>,
        driver: Arc<dyn SessionDriver>,
        notifier: Arc<dyn Notifier>,
        recipient: impl Into<String>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                source,
                driver,
                notifier,
                recipient: recipient.into(),
                last_usage: Mutex::new(None),
            }),
            active: Mutex::new(None),
        }
    }

    /// 开始周期检查，已在运行时返回 false
    pub fn start(&self) -> bool {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if active.as_ref().is_some_and(LoopHandle::is_running) {
            warn!("Context monitor already running");
            return false;
        }

        let config = &self.shared.config;
        info!(
            threshold = config.threshold,
            interval_ms = config.check_interval.as_millis() as u64,
            "Starting context monitor"
        );
        *active = Some(spawn_periodic(
            "context_monitor",
            config.check_interval,
            info_span!("context_monitor"),
            CompactTask {
                shared: self.shared.clone(),
            },
        ));
        true
    }

    pub fn stop(&self) {
        if let Some(handle) = self.active.lock().unwrap_or_else(|e| e.into_inner()).take() {
            info!("Stopping context monitor");
            handle.stop();
        }
    }

    /// 停止并等待进行中的检查完成
    pub async fn shutdown(&self) {
        let handle = self.active.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            info!("Shutting down context monitor");
            handle.shutdown().await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(LoopHandle::is_running)
    }

    /// 立即执行一次检查（不影响周期调度）
    pub async fn check_once(&self) -> CheckOutcome {
        self.shared.check().await
    }

    /// 最近一次观测到的使用率
    pub fn last_usage(&self) -> Option<f64> {
        *self.shared.last_usage.lock().unwrap_or_else(|e| e.into_inner())
    }
}
