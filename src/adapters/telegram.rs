//! Telegram Alerts
//!
//! `AlertPort` that posts to a chat through the Bot API `sendMessage`
//! method, and `LogAlerts` for runs without a configured channel.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::ports::alerts::{AlertError, AlertPort};

const TELEGRAM_API: &str = "https://api.telegram.org";
/// Bot API limit on message length
const MAX_MESSAGE_CHARS: usize = 4096;

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    disable_web_page_preview: bool,
}

#[derive(Debug, Deserialize)]
struct BotResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TelegramAlerts {
    http: Client,
    api_base: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramAlerts {
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Result<Self, AlertError> {
        let bot_token = bot_token.into();
        let chat_id = chat_id.into();
        if bot_token.trim().is_empty() {
            return Err(AlertError::NotConfigured("telegram bot token is empty".into()));
        }
        if chat_id.trim().is_empty() {
            return Err(AlertError::NotConfigured("telegram chat id is empty".into()));
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AlertError::DeliveryFailed(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_base: TELEGRAM_API.to_string(),
            bot_token,
            chat_id,
        })
    }

    /// Point at a different Bot API host
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn send_message_url(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.bot_token)
    }
}

fn truncate(text: &str) -> &str {
    match text.char_indices().nth(MAX_MESSAGE_CHARS) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[async_trait]
impl AlertPort for TelegramAlerts {
    async fn send_alert(&self, text: &str) -> Result<(), AlertError> {
        let body = SendMessage {
            chat_id: &self.chat_id,
            text: truncate(text),
            disable_web_page_preview: true,
        };

        let response = self
            .http
            .post(self.send_message_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| AlertError::DeliveryFailed(e.to_string()))?;

        let status = response.status();
        let reply: BotResponse = response
            .json()
            .await
            .map_err(|e| AlertError::DeliveryFailed(format!("HTTP {}: {}", status, e)))?;

        if !reply.ok {
            return Err(AlertError::DeliveryFailed(
                reply.description.unwrap_or_else(|| format!("HTTP {}", status)),
            ));
        }
        Ok(())
    }
}

/// Alerts that only reach the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAlerts;

#[async_trait]
impl AlertPort for LogAlerts {
    async fn send_alert(&self, text: &str) -> Result<(), AlertError> {
        tracing::debug!("No alert channel configured, logged only: {}", text);
        Ok(())
    }
}
