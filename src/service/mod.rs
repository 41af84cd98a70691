//! 常驻服务 - context 压缩、健康检查与自动重启

pub mod context;
pub mod health;
pub mod restart;

pub use context::{
    parse_status, CheckOutcome, ContextMonitor, ContextMonitorConfig, HttpStatusSource,
    ResourceStatus, StatusSource,
};
pub use health::{probe, HealthCheck, HealthCheckConfig, HealthState, UnhealthyHandler};
pub use restart::{
    LivenessSupervisor, RestartDecision, RestartPolicy, RestartPolicyConfig, RestartRecord,
    RestartService,
};
