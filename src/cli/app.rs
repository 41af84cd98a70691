//! 从配置组装运行时组件

use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::infra::{SessionDriver, TmuxManager};
use crate::monitor::OutputMonitor;
use crate::notification::{LogNotifier, Notifier, TelegramConfig, TelegramNotifier};
use crate::relay::SessionRelay;
use crate::service::{ContextMonitor, HttpStatusSource, LivenessSupervisor, StatusSource};

/// 组装好的运行时组件
pub struct App {
    pub config: Config,
    pub driver: Arc<dyn SessionDriver>,
    pub notifier: Arc<dyn Notifier>,
    pub status_source: Arc<dyn StatusSource>,
}

impl App {
    pub fn from_config(config: Config) -> Result<Self> {
        let tmux = TmuxManager::new(config.session_name.clone(), config.claude_command.clone())
            .with_capture_lines(config.capture_lines);
        if !tmux.is_available() {
            warn!("tmux not found on PATH, session operations will fail");
        }

        let notifier = build_notifier(&config)?;
        let status_source = Arc::new(HttpStatusSource::new(
            config.context_status_url.clone(),
            config.status_timeout(),
        )?);

        Ok(Self {
            driver: Arc::new(tmux),
            notifier,
            status_source,
            config,
        })
    }

    pub fn relay(&self) -> SessionRelay {
        SessionRelay::new(
            self.driver.clone(),
            OutputMonitor::new(self.config.output_monitor_config()),
        )
        .with_status_source(self.status_source.clone())
        .with_compact_command(self.config.compact_command.clone())
        .with_settle_delay(self.config.restart_policy_config().settle_delay)
    }

    pub fn context_monitor(&self) -> ContextMonitor {
        ContextMonitor::new(
            self.config.context_monitor_config(),
            self.status_source.clone(),
            self.driver.clone(),
            self.notifier.clone(),
            self.config.recipient(),
        )
    }

    pub fn supervisor(&self) -> LivenessSupervisor {
        LivenessSupervisor::new(
            self.config.health_check_config(),
            self.config.restart_policy_config(),
            self.driver.clone(),
            self.notifier.clone(),
            self.config.recipient(),
        )
    }
}

/// 选择通知渠道：配置了 bot token 和 chat id 时用 Telegram，否则打印到控制台
pub fn build_notifier(config: &Config) -> Result<Arc<dyn Notifier>> {
    match (&config.telegram_bot_token, &config.notify_chat_id) {
        (Some(token), Some(_)) => {
            info!("Using telegram notifier");
            Ok(Arc::new(TelegramNotifier::new(TelegramConfig::new(token.clone()))?))
        }
        (Some(_), None) => {
            warn!("telegram_bot_token set without notify_chat_id, falling back to console");
            Ok(Arc::new(LogNotifier::new()))
        }
        _ => Ok(Arc::new(LogNotifier::new())),
    }
}
