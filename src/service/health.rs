//! 健康检查 - 周期探测会话是否存在，连续失败达到上限后升级

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, info_span, warn};

use crate::infra::driver::SessionDriver;
use crate::scheduler::{spawn_periodic, LoopControl, LoopHandle, PeriodicTask};

/// 健康检查配置
#[derive(Debug, Clone)]
pub struct HealthCheckConfig {
    /// 检查间隔
    pub interval: Duration,
    /// 连续失败多少次后升级
    pub max_consecutive_failures: u32,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            max_consecutive_failures: 3,
        }
    }
}

/// 升级回调（通常是重启服务）
#[async_trait]
pub trait UnhealthyHandler: Send + Sync {
    async fn on_unhealthy(&self);
}

/// 连续失败计数
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthState {
    consecutive_failures: u32,
}

impl HealthState {
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    /// 记录一次失败，返回是否达到升级上限
    pub fn record_failure(&mut self, max_consecutive_failures: u32) -> bool {
        self.consecutive_failures += 1;
        self.consecutive_failures >= max_consecutive_failures
    }

    pub fn reset(&mut self) {
        self.consecutive_failures = 0;
    }
}

/// 执行一次探测，驱动出错按不健康处理
pub async fn probe(driver: &dyn SessionDriver) -> bool {
    match driver.exists().await {
        Ok(true) => {
            debug!("Health check passed");
            true
        }
        Ok(false) => {
            warn!("Session does not exist");
            false
        }
        Err(e) => {
            error!(error = %e, "Health check errored");
            false
        }
    }
}

struct ProbeTask {
    driver: Arc<dyn SessionDriver>,
    handler: Arc<dyn UnhealthyHandler>,
    state: HealthState,
    max_consecutive_failures: u32,
}

#[async_trait]
impl PeriodicTask for ProbeTask {
    async fn tick(&mut self, _control: &LoopControl) {
        if probe(self.driver.as_ref()).await {
            self.state.record_success();
            return;
        }

        let escalate = self.state.record_failure(self.max_consecutive_failures);
        warn!(
            consecutive_failures = self.state.consecutive_failures(),
            "Health check failed"
        );

        if escalate {
            error!("Consecutive health checks failed, escalating");
            self.handler.on_unhealthy().await;
            // 重启进行中时不要每个 tick 都再次升级
            self.state.reset();
        }
    }
}

/// 健康检查器
pub struct HealthCheck {
    config: HealthCheckConfig,
    active: Mutex<Option<LoopHandle>>,
}

impl HealthCheck {
    pub fn new(config: HealthCheckConfig) -> Self {
        Self {
            config,
            active: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &HealthCheckConfig {
        &self.config
    }

    /// 开始健康检查，已在运行时返回 false
    pub fn start(
        &self,
        driver: Arc<dyn SessionDriver>,
        handler: Arc<dyn UnhealthyHandler>,
    ) -> bool {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if active.as_ref().is_some_and(LoopHandle::is_running) {
            warn!("Health check already running");
            return false;
        }

        info!(
            interval_ms = self.config.interval.as_millis() as u64,
            max_consecutive_failures = self.config.max_consecutive_failures,
            "Starting health check"
        );
        *active = Some(spawn_periodic(
            "health_check",
            self.config.interval,
            info_span!("health_check"),
            ProbeTask {
                driver,
                handler,
                state: HealthState::default(),
                max_consecutive_failures: self.config.max_consecutive_failures,
            },
        ));
        true
    }

    pub fn stop(&self) {
        if let Some(handle) = self.active.lock().unwrap_or_else(|e| e.into_inner()).take() {
            info!("Stopping health check");
            handle.stop();
        }
    }

    /// 停止并等待进行中的探测（包括它触发的重启）完成
    pub async fn shutdown(&self) {
        let handle = self.active.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            info!("Shutting down health check");
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
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self::new(HealthCheckConfig::default())
    }
}
