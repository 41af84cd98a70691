//! Session Relay - 远程控制运行在 tmux 中的 Claude Code 会话
//!
//! 通过轮询判断回应是否完成，context 接近上限时自动压缩，
//! session 异常退出时在限速策略下自动重启。

pub mod cli;
pub mod config;
pub mod infra;
pub mod monitor;
pub mod notification;
pub mod relay;
pub mod scheduler;
pub mod service;

pub use config::Config;
pub use infra::{DriverError, SessionDriver, TmuxManager};
pub use monitor::{CompletionHandler, DiffDetector, OutputMonitor, OutputMonitorConfig, PromptMatcher};
pub use notification::{LogNotifier, Notifier, SendResult, TelegramNotifier};
pub use relay::{SessionRelay, SessionStatus};
pub use scheduler::{spawn_periodic, LoopControl, LoopHandle, PeriodicTask};
pub use service::{
    ContextMonitor, ContextMonitorConfig, HealthCheck, HealthCheckConfig, LivenessSupervisor,
    ResourceStatus, RestartPolicy, RestartPolicyConfig, RestartService, StatusSource,
    UnhealthyHandler,
};
