//! 通知消息格式化 - 发给操作员的文本

use chrono::{DateTime, Local};
use std::time::Duration;

/// 固定文案
pub mod msg {
    pub const UNKNOWN: &str = "未知";
    pub const COMPACT_FAILED: &str = "❌ 执行 compact 时发生错误";
    pub const RESTART_SUCCEEDED: &str = "✅ Claude Code session 已重启";
    pub const RESTART_FAILED: &str = "❌ 重启 Claude Code session 失败，请手动检查";
    pub const SESSION_ACTIVE: &str = "✅ 运行中";
    pub const SESSION_INACTIVE: &str = "❌ 未运行";
}

/// 使用率百分比，保留一位小数
pub fn format_usage(usage: f64) -> String {
    format!("{:.1}%", usage * 100.0)
}

/// 可能未知的使用率
pub fn format_optional_usage(usage: Option<f64>) -> String {
    usage.map(format_usage).unwrap_or_else(|| msg::UNKNOWN.to_string())
}

/// 开始压缩
pub fn compact_started(usage: f64) -> String {
    format!(
        "⚠️ Context window 已达 {}，正在执行压缩...",
        format_usage(usage)
    )
}

/// 压缩结束（前后对比）
pub fn compact_finished(before: f64, after: Option<f64>) -> String {
    format!(
        "✅ Context window 已压缩（{} → {}）",
        format_usage(before),
        format_optional_usage(after)
    )
}

/// 开始重启
pub fn restart_started(attempt: usize, max_restarts: usize) -> String {
    format!(
        "⚠️ Claude Code session 异常，正在重启... ({}/{})",
        attempt, max_restarts
    )
}

/// 重启额度耗尽
pub fn restart_budget_exhausted(
    max_restarts: usize,
    window: Duration,
    next_allowed_at: Option<DateTime<Local>>,
) -> String {
    let mut text = format!(
        "❌ Claude Code session 异常，但重启次数已达上限（{} 次/{}）\n\n请手动检查",
        max_restarts,
        format_window(window)
    );
    if let Some(at) = next_allowed_at {
        text.push_str(&format!(
            "\n最早可在 {} 后自动重启",
            at.format("%H:%M:%S")
        ));
    }
    text
}

/// 时间窗口的可读形式
pub fn format_window(window: Duration) -> String {
    let secs = window.as_secs();
    if secs >= 3600 && secs % 3600 == 0 {
        match secs / 3600 {
            1 => "小时".to_string(),
            hours => format!("{} 小时", hours),
        }
    } else if secs >= 60 && secs % 60 == 0 {
        format!("{} 分钟", secs / 60)
    } else {
        format!("{} 秒", secs)
    }
}
