//! 配置加载
//!
//! 优先级（后者覆盖前者）：
//! 1. 内置默认值
//! 2. 配置文件 `~/.config/session-relay/config.json`（或 `--config` 指定的路径）
//! 3. 环境变量（时间单位均为毫秒）

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::monitor::OutputMonitorConfig;
use crate::service::{ContextMonitorConfig, HealthCheckConfig, RestartPolicyConfig};

/// 无通知渠道时使用的接收者
pub const DEFAULT_RECIPIENT: &str = "operator";

/// 运行配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // tmux
    pub session_name: String,
    pub claude_command: String,
    pub capture_lines: u32,

    // 输出监控
    pub poll_interval_ms: u64,
    pub max_unchanged_ticks: u32,

    // context 监控
    pub context_threshold: f64,
    pub context_check_interval_ms: u64,
    pub compact_grace_ms: u64,
    pub compact_command: String,
    pub context_status_url: String,
    pub status_timeout_ms: u64,

    // 健康检查与重启
    pub health_check_interval_ms: u64,
    pub max_consecutive_failures: u32,
    pub max_restarts: usize,
    pub restart_window_secs: u64,
    pub restart_settle_ms: u64,

    // 通知
    pub telegram_bot_token: Option<String>,
    pub notify_chat_id: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            session_name: "claude-relay".to_string(),
            claude_command: "claude --dangerously-skip-permissions".to_string(),
            capture_lines: 3000,
            poll_interval_ms: 2000,
            max_unchanged_ticks: 15,
            context_threshold: 0.8,
            context_check_interval_ms: 30_000,
            compact_grace_ms: 5000,
            compact_command: "/compact".to_string(),
            context_status_url: crate::service::context::DEFAULT_STATUS_URL.to_string(),
            status_timeout_ms: 5000,
            health_check_interval_ms: 10_000,
            max_consecutive_failures: 3,
            max_restarts: 3,
            restart_window_secs: 60 * 60,
            restart_settle_ms: 2000,
            telegram_bot_token: None,
            notify_chat_id: None,
        }
    }
}

impl Config {
    /// 默认配置文件路径
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".config/session-relay/config.json"))
    }

    /// 按优先级加载并校验
    ///
    /// 显式指定的路径必须存在；默认路径不存在时直接使用默认值。
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// 从 JSON 文件读取（未出现的字段取默认值）
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// 用环境变量覆盖
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("TMUX_SESSION_NAME") {
            self.session_name = v;
        }
        if let Some(v) = get("CLAUDE_COMMAND") {
            self.claude_command = v;
        }
        if let Some(v) = get("POLL_INTERVAL") {
            self.poll_interval_ms = parse_env("POLL_INTERVAL", &v)?;
        }
        if let Some(v) = get("CONTEXT_CHECK_INTERVAL") {
            self.context_check_interval_ms = parse_env("CONTEXT_CHECK_INTERVAL", &v)?;
        }
        if let Some(v) = get("CONTEXT_THRESHOLD") {
            self.context_threshold = parse_env("CONTEXT_THRESHOLD", &v)?;
        }
        if let Some(v) = get("HEALTH_CHECK_INTERVAL") {
            self.health_check_interval_ms = parse_env("HEALTH_CHECK_INTERVAL", &v)?;
        }
        if let Some(v) = get("CONTEXT_STATUS_URL") {
            self.context_status_url = v;
        }
        if let Some(v) = get("TELEGRAM_BOT_TOKEN") {
            self.telegram_bot_token = Some(v);
        }
        if let Some(v) = get("NOTIFY_CHAT_ID") {
            self.notify_chat_id = Some(v);
        }
        Ok(())
    }

    /// 校验取值范围
    pub fn validate(&self) -> Result<()> {
        if self.session_name.trim().is_empty() {
            bail!("session_name must not be empty");
        }
        if self.claude_command.trim().is_empty() {
            bail!("claude_command must not be empty");
        }
        if !(self.context_threshold > 0.0 && self.context_threshold <= 1.0) {
            bail!(
                "context_threshold must be in (0, 1], got {}",
                self.context_threshold
            );
        }

        let non_zero = [
            ("capture_lines", self.capture_lines as u64),
            ("poll_interval_ms", self.poll_interval_ms),
            ("max_unchanged_ticks", self.max_unchanged_ticks as u64),
            ("context_check_interval_ms", self.context_check_interval_ms),
            ("status_timeout_ms", self.status_timeout_ms),
            ("health_check_interval_ms", self.health_check_interval_ms),
            ("max_consecutive_failures", self.max_consecutive_failures as u64),
            ("max_restarts", self.max_restarts as u64),
            ("restart_window_secs", self.restart_window_secs),
        ];
        for (name, value) in non_zero {
            if value == 0 {
                bail!("{} must be greater than 0", name);
            }
        }
        Ok(())
    }

    /// 通知接收者
    pub fn recipient(&self) -> String {
        self.notify_chat_id
            .clone()
            .unwrap_or_else(|| DEFAULT_RECIPIENT.to_string())
    }

    pub fn output_monitor_config(&self) -> OutputMonitorConfig {
        OutputMonitorConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            max_unchanged_ticks: self.max_unchanged_ticks,
        }
    }

    pub fn context_monitor_config(&self) -> ContextMonitorConfig {
        ContextMonitorConfig {
            threshold: self.context_threshold,
            check_interval: Duration::from_millis(self.context_check_interval_ms),
            compact_grace: Duration::from_millis(self.compact_grace_ms),
            compact_command: self.compact_command.clone(),
        }
    }

    pub fn health_check_config(&self) -> HealthCheckConfig {
        HealthCheckConfig {
            interval: Duration::from_millis(self.health_check_interval_ms),
            max_consecutive_failures: self.max_consecutive_failures,
        }
    }

    pub fn restart_policy_config(&self) -> RestartPolicyConfig {
        RestartPolicyConfig {
            max_restarts: self.max_restarts,
            window: Duration::from_secs(self.restart_window_secs),
            settle_delay: Duration::from_millis(self.restart_settle_ms),
        }
    }

    pub fn status_timeout(&self) -> Duration {
        Duration::from_millis(self.status_timeout_ms)
    }
}

fn parse_env<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| anyhow!("Invalid value for {}: {} ({})", key, value, e))
}
