//! 自动重启服务 - 健康检查升级后的限速补救
//!
//! 滚动窗口内的重启次数有上限：超过上限时只通知操作员，不再尝试重启。

use async_trait::async_trait;
use chrono::{DateTime, Local};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{error, info, warn};

use super::health::{HealthCheck, HealthCheckConfig, UnhealthyHandler};
use crate::infra::driver::SessionDriver;
use crate::notification::{formatter, notify_logged, Notifier};

/// 重启策略配置
#[derive(Debug, Clone)]
pub struct RestartPolicyConfig {
    /// 窗口内最多重启次数
    pub max_restarts: usize,
    /// 滚动窗口
    pub window: Duration,
    /// kill 之后等待多久再创建新 session
    pub settle_delay: Duration,
}

impl Default for RestartPolicyConfig {
    fn default() -> Self {
        Self {
            max_restarts: 3,
            window: Duration::from_secs(60 * 60),
            settle_delay: Duration::from_secs(2),
        }
    }
}

/// 一次重启尝试的记录
#[derive(Debug, Clone)]
pub struct RestartRecord {
    pub at: Instant,
    pub wall_clock: DateTime<Local>,
}

/// 策略判定
#[derive(Debug, Clone, PartialEq)]
pub enum RestartDecision {
    /// 允许重启，`attempt` 为窗口内的第几次
    Allowed { attempt: usize },
    /// 额度耗尽
    Refused {
        recent: usize,
        next_allowed_at: Option<DateTime<Local>>,
    },
}

/// 滚动窗口重启限速
#[derive(Debug)]
pub struct RestartPolicy {
    max_restarts: usize,
    window: Duration,
    records: VecDeque<RestartRecord>,
}

impl RestartPolicy {
    pub fn new(max_restarts: usize, window: Duration) -> Self {
        Self {
            max_restarts,
            window,
            records: VecDeque::new(),
        }
    }

    pub fn max_restarts(&self) -> usize {
        self.max_restarts
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// 移除窗口之外的记录
    pub fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.records.front() {
            if now.saturating_duration_since(oldest.at) >= self.window {
                self.records.pop_front();
            } else {
                break;
            }
        }
    }

    /// 窗口内的重启次数
    pub fn recent(&mut self, now: Instant) -> usize {
        self.prune(now);
        self.records.len()
    }

    /// 判定并在允许时记录一次重启
    pub fn evaluate(&mut self) -> RestartDecision {
        self.evaluate_at(Instant::now(), Local::now())
    }

    /// 判定（带时间戳，用于测试）
    pub fn evaluate_at(&mut self, now: Instant, wall_clock: DateTime<Local>) -> RestartDecision {
        self.prune(now);

        if self.records.len() >= self.max_restarts {
            let next_allowed_at = self.records.front().and_then(|oldest| {
                chrono::Duration::from_std(self.window)
                    .ok()
                    .map(|window| oldest.wall_clock + window)
            });
            return RestartDecision::Refused {
                recent: self.records.len(),
                next_allowed_at,
            };
        }

        self.records.push_back(RestartRecord { at: now, wall_clock });
        RestartDecision::Allowed {
            attempt: self.records.len(),
        }
    }
}

/// 重启服务（健康检查的升级回调）
pub struct RestartService {
    driver: Arc<dyn SessionDriver>,
    notifier: Arc<dyn Notifier>,
    recipient: String,
    policy: Mutex<RestartPolicy>,
    settle_delay: Duration,
}

impl RestartService {
    pub fn new(
        config: RestartPolicyConfig,
        driver: Arc<dyn SessionDriver>,
        notifier: Arc<dyn Notifier>,
        recipient: impl Into<String>,
    ) -> Self {
        Self {
            driver,
            notifier,
            recipient: recipient.into(),
            policy: Mutex::new(RestartPolicy::new(config.max_restarts, config.window)),
            settle_delay: config.settle_delay,
        }
    }

    /// 窗口内已发生的重启次数
    pub async fn recent_restarts(&self) -> usize {
        self.policy.lock().await.recent(Instant::now())
    }

    async fn notify(&self, text: &str) {
        notify_logged(self.notifier.as_ref(), &self.recipient, text).await;
    }

    async fn restart(&self, attempt: usize, max_restarts: usize) {
        self.notify(&formatter::restart_started(attempt, max_restarts))
            .await;

        if let Err(e) = self.driver.kill().await {
            warn!(error = %e, "Failed to kill session (may already be gone)");
        }

        tokio::time::sleep(self.settle_delay).await;

        match self.driver.ensure().await {
            Ok(()) => {
                info!(attempt, "Session restarted");
                self.notify(formatter::msg::RESTART_SUCCEEDED).await;
            }
            Err(e) => {
                error!(error = %e, attempt, "Failed to recreate session");
                self.notify(formatter::msg::RESTART_FAILED).await;
            }
        }
    }
}

#[async_trait]
impl UnhealthyHandler for RestartService {
    async fn on_unhealthy(&self) {
        let (decision, max_restarts, window) = {
            let mut policy = self.policy.lock().await;
            (policy.evaluate(), policy.max_restarts(), policy.window())
        };

        match decision {
            RestartDecision::Refused {
                recent,
                next_allowed_at,
            } => {
                error!(
                    recent,
                    window_secs = window.as_secs(),
                    "Restart limit reached, not restarting"
                );
                self.notify(&formatter::restart_budget_exhausted(
                    max_restarts,
                    window,
                    next_allowed_at,
                ))
                .await;
            }
            RestartDecision::Allowed { attempt } => {
                warn!(attempt, max_restarts, "Session unhealthy, restarting");
                self.restart(attempt, max_restarts).await;
            }
        }
    }
}

/// 存活监督：健康检查 + 限速重启
pub struct LivenessSupervisor {
    driver: Arc<dyn SessionDriver>,
    health: HealthCheck,
    restart: Arc<RestartService>,
}

impl LivenessSupervisor {
    pub fn new(
        health_config: HealthCheckConfig,
        restart_config: RestartPolicyConfig,
        driver: Arc<dyn SessionDriver>,
        notifier: Arc<dyn Notifier>,
        recipient: impl Into<String>,
    ) -> Self {
        let restart = Arc::new(RestartService::new(
            restart_config,
            driver.clone(),
            notifier,
            recipient,
        ));
        Self {
            driver,
            health: HealthCheck::new(health_config),
            restart,
        }
    }

    pub fn start(&self) -> bool {
        info!("Starting auto-restart supervisor");
        self.health.start(self.driver.clone(), self.restart.clone())
    }

    pub fn stop(&self) {
        self.health.stop();
        info!("Stopped auto-restart supervisor");
    }

    /// 停止并等待进行中的重启跑完（kill 之后一定会尝试重建）
    pub async fn shutdown(&self) {
        self.health.shutdown().await;
        info!("Auto-restart supervisor shut down");
    }

    pub fn is_running(&self) -> bool {
        self.health.is_running()
    }

    pub fn restart_service(&self) -> &RestartService {
        &self.restart
    }
}
