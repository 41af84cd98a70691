//! Telegram 渠道 - 通过 Bot API 直接发送消息

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::notification::channel::Notifier;

/// 默认 Bot API 地址
pub const TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// Telegram 渠道配置
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    /// Bot token
    pub bot_token: String,
    /// API 基础 URL（支持代理）
    pub api_url: String,
    /// 超时时间 (秒)
    pub timeout_secs: u64,
}

impl TelegramConfig {
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            api_url: TELEGRAM_API_URL.to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Serialize)]
struct SendMessagePayload<'a> {
    chat_id: &'a str,
    text: &'a str,
}

/// Bot API 响应
#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Telegram 通知器
#[derive(Debug)]
pub struct TelegramNotifier {
    client: Client,
    config: TelegramConfig,
}

impl TelegramNotifier {
    pub fn new(config: TelegramConfig) -> Result<Self> {
        if config.bot_token.is_empty() {
            return Err(anyhow!("bot_token is required"));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self { client, config })
    }

    fn send_message_url(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.config.api_url.trim_end_matches('/'),
            self.config.bot_token
        )
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn notify(&self, recipient: &str, text: &str) -> Result<()> {
        debug!(recipient, text_len = text.len(), "Sending telegram message");

        let response = self
            .client
            .post(self.send_message_url())
            .json(&SendMessagePayload {
                chat_id: recipient,
                text,
            })
            .send()
            .await
            .map_err(|e| anyhow!("HTTP request failed: {}", e))?;

        let body: TelegramResponse = response
            .json()
            .await
            .map_err(|e| anyhow!("Failed to parse response: {}", e))?;

        if body.ok {
            Ok(())
        } else {
            Err(anyhow!(
                "Telegram API error: {}",
                body.description.unwrap_or_else(|| "Unknown error".to_string())
            ))
        }
    }
}
