//! 周期任务调度 - 每个轮询循环都通过这里启动
//!
//! 同一循环内的 tick 严格串行：上一个 tick 完成前不会开始下一个，
//! 错过的 tick 顺延而不是补发。`LoopHandle` 是唯一的取消入口。

use async_trait::async_trait;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn, Instrument, Span};

/// 周期任务
///
/// 任务自己持有私有状态，状态只在 `tick` 中被修改。
#[async_trait]
pub trait PeriodicTask: Send + 'static {
    /// 执行一次 tick；任务可通过 `control.stop()` 结束自己所在的循环
    async fn tick(&mut self, control: &LoopControl);
}

/// tick 内可用的循环控制
#[derive(Debug, Clone)]
pub struct LoopControl {
    token: CancellationToken,
}

impl LoopControl {
    /// 停止循环（幂等）
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// 运行中循环的句柄
#[derive(Debug)]
pub struct LoopHandle {
    name: &'static str,
    token: CancellationToken,
    join: JoinHandle<()>,
}

impl LoopHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// 是否仍在运行（已请求停止即视为不在运行）
    pub fn is_running(&self) -> bool {
        !self.token.is_cancelled() && !self.join.is_finished()
    }

    /// 请求停止；下一个 tick 不会再开始，正在进行的 tick 跑完后结果被丢弃
    pub fn stop(&self) {
        if !self.token.is_cancelled() {
            debug!(loop_name = self.name, "Stopping periodic loop");
        }
        self.token.cancel();
    }

    /// 停止并等待循环退出
    pub async fn shutdown(self) {
        self.stop();
        let _ = self.join.await;
    }
}

/// 允许的最短周期
pub const MIN_PERIOD: Duration = Duration::from_millis(10);

/// 把周期限制在 `MIN_PERIOD` 以上（零周期会让 tokio interval panic）
pub fn clamp_period(name: &str, period: Duration) -> Duration {
    if period < MIN_PERIOD {
        warn!(
            loop_name = name,
            period_ms = period.as_millis() as u64,
            min_ms = MIN_PERIOD.as_millis() as u64,
            "Period too short, clamping"
        );
        MIN_PERIOD
    } else {
        period
    }
}

/// 启动周期任务
///
/// 第一个 tick 在一个完整周期之后触发。循环在 `span` 内运行。
/// 短于 `MIN_PERIOD` 的周期按 `MIN_PERIOD` 处理。
pub fn spawn_periodic<T: PeriodicTask>(
    name: &'static str,
    period: Duration,
    span: Span,
    mut task: T,
) -> LoopHandle {
    let period = clamp_period(name, period);
    let token = CancellationToken::new();
    let control = LoopControl {
        token: token.clone(),
    };

    let join = tokio::spawn(
        async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = control.token.cancelled() => break,
                    _ = ticker.tick() => {
                        task.tick(&control).await;
                        if control.is_stopped() {
                            break;
                        }
                    }
                }
            }
            debug!(loop_name = name, "Periodic loop exited");
        }
        .instrument(span),
    );

    LoopHandle { name, token, join }
}
