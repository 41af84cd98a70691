//! 输出监控 - 轮询捕获会话输出，判断回应是否完成
//!
//! 状态: Idle -> Polling -> {Completed, StalledTimeout}。两个终态都会停止轮询，
//! 每次运行最多调用一次完成回调。

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, info_span, warn};

use super::diff::DiffDetector;
use crate::infra::driver::{DriverError, SessionDriver};
use crate::scheduler::{spawn_periodic, LoopControl, LoopHandle, PeriodicTask};

/// 默认轮询间隔
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// 默认停滞上限（tick 数）
pub const DEFAULT_MAX_UNCHANGED_TICKS: u32 = 15;

/// 输出监控配置
#[derive(Debug, Clone)]
pub struct OutputMonitorConfig {
    /// 默认轮询间隔
    pub poll_interval: Duration,
    /// 输出连续不变多少个 tick 后判定停滞
    ///
    /// 按 tick 计数而不是墙钟时间：默认 15 个 tick 在 2 秒间隔下约为 30 秒，
    /// 间隔改变时实际停滞时长随之成比例变化。
    pub max_unchanged_ticks: u32,
}

impl Default for OutputMonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_unchanged_ticks: DEFAULT_MAX_UNCHANGED_TICKS,
        }
    }
}

/// 完成回调
#[async_trait]
pub trait CompletionHandler: Send + Sync {
    /// 回应完成（或停滞超时）时调用，参数为最后一次捕获的完整输出
    async fn on_complete(&self, output: String);

    /// 捕获失败导致监控停止时调用
    async fn on_failure(&self, _error: &DriverError) {}
}

/// 单次 tick 的判定结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// 继续轮询
    Continue,
    /// 检测到提示符，回应完成
    Completed(String),
    /// 输出长时间不变，尽力交付当前输出
    StalledTimeout(String),
}

/// 单次运行的监控状态
#[derive(Debug, Clone, Default)]
pub struct MonitorState {
    last_output: String,
    unchanged_ticks: u32,
    running: bool,
}

impl MonitorState {
    pub fn new() -> Self {
        Self {
            running: true,
            ..Self::default()
        }
    }

    pub fn last_output(&self) -> &str {
        &self.last_output
    }

    pub fn unchanged_ticks(&self) -> u32 {
        self.unchanged_ticks
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// 用一次新的捕获推进状态机
    pub fn advance(
        &mut self,
        detector: &DiffDetector,
        current: String,
        max_unchanged_ticks: u32,
    ) -> TickOutcome {
        if !self.running {
            return TickOutcome::Continue;
        }

        if !detector.has_changed(&self.last_output, &current) {
            self.unchanged_ticks += 1;
            debug!(unchanged_ticks = self.unchanged_ticks, "Output unchanged");

            if self.unchanged_ticks >= max_unchanged_ticks {
                warn!(
                    unchanged_ticks = self.unchanged_ticks,
                    "Output stalled, delivering current output"
                );
                self.running = false;
                return TickOutcome::StalledTimeout(current);
            }
            return TickOutcome::Continue;
        }

        self.unchanged_ticks = 0;
        let ended = detector.detect_response_end(&current);
        self.last_output = current;

        if ended {
            info!(output_len = self.last_output.len(), "Response completed");
            self.running = false;
            TickOutcome::Completed(self.last_output.clone())
        } else {
            debug!("Output changed, still waiting");
            TickOutcome::Continue
        }
    }
}

struct PollTask {
    driver: Arc<dyn SessionDriver>,
    detector: Arc<DiffDetector>,
    on_complete: Arc<dyn CompletionHandler>,
    state: MonitorState,
    max_unchanged_ticks: u32,
}

#[async_trait]
impl PeriodicTask for PollTask {
    async fn tick(&mut self, control: &LoopControl) {
        let current = match self.driver.capture().await {
            Ok(output) => output,
            Err(e) => {
                error!(error = %e, "Failed to capture output, stopping monitor");
                control.stop();
                self.on_complete.on_failure(&e).await;
                return;
            }
        };

        // 捕获期间被外部 stop，结果作废
        if control.is_stopped() {
            debug!("Monitor stopped while capturing, discarding output");
            return;
        }

        match self
            .state
            .advance(&self.detector, current, self.max_unchanged_ticks)
        {
            TickOutcome::Continue => {}
            TickOutcome::Completed(output) | TickOutcome::StalledTimeout(output) => {
                control.stop();
                self.on_complete.on_complete(output).await;
            }
        }
    }
}

/// 输出监控器
///
/// 同一时刻最多只有一个运行；运行中再次 `start` 会被拒绝而不是排队。
pub struct OutputMonitor {
    config: OutputMonitorConfig,
    detector: Arc<DiffDetector>,
    active: Mutex<Option<LoopHandle>>,
}

impl OutputMonitor {
    pub fn new(config: OutputMonitorConfig) -> Self {
        Self::with_detector(config, DiffDetector::new())
    }

    pub fn with_detector(config: OutputMonitorConfig, detector: DiffDetector) -> Self {
        Self {
            config,
            detector: Arc::new(detector),
            active: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &OutputMonitorConfig {
        &self.config
    }

    pub fn detector(&self) -> &DiffDetector {
        &self.detector
    }

    /// 开始监控，返回是否真正启动
    pub fn start(
        &self,
        driver: Arc<dyn SessionDriver>,
        on_complete: Arc<dyn CompletionHandler>,
        poll_interval: Duration,
    ) -> bool {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if active.as_ref().is_some_and(LoopHandle::is_running) {
            warn!("Output monitor already running, ignoring start");
            return false;
        }

        info!(
            poll_interval_ms = poll_interval.as_millis() as u64,
            max_unchanged_ticks = self.config.max_unchanged_ticks,
            "Starting output monitor"
        );

        let task = PollTask {
            driver,
            detector: self.detector.clone(),
            on_complete,
            state: MonitorState::new(),
            max_unchanged_ticks: self.config.max_unchanged_ticks,
        };
        *active = Some(spawn_periodic(
            "output_monitor",
            poll_interval,
            info_span!("output_monitor"),
            task,
        ));
        true
    }

    /// 停止监控（幂等）
    pub fn stop(&self) {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = active.take() {
            if handle.is_running() {
                info!("Stopping output monitor");
            }
            handle.stop();
        }
    }

    /// 停止并等待进行中的捕获结束（结果作废，不会回调）
    pub async fn shutdown(&self) {
        let handle = self.active.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
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

impl Default for OutputMonitor {
    fn default() -> Self {
        Self::new(OutputMonitorConfig::default())
    }
}
