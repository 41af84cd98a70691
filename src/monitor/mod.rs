//! 输出监控子系统 - 差异检测与完成判定

pub mod diff;
pub mod output;

pub use diff::{DiffDetector, EndMarker, PromptMatcher};
pub use output::{
    CompletionHandler, MonitorState, OutputMonitor, OutputMonitorConfig, TickOutcome,
};
