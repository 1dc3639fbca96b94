use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::channels::traits::{MessageChannel, OutboundMessage, SendError, SendReceipt};
use crate::config::ChannelConfig;
use crate::error::{Result, StrideError};

/// Used when a 429 carries no usable hint.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Telegram Bot API adapter (`sendMessage` only).
#[derive(Clone)]
pub struct TelegramChannel {
    api_base: String,
    bot_token: String,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(api_base: &str, bot_token: &str, timeout: Duration) -> Result<Self> {
        if bot_token.trim().is_empty() {
            return Err(StrideError::Config("telegram bot token is empty".to_owned()));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StrideError::Channel(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            api_base: api_base.trim_end_matches('/').to_owned(),
            bot_token: bot_token.trim().to_owned(),
            client,
        })
    }

    /// Build from config, falling back to the token environment variable.
    pub fn from_config(config: &ChannelConfig) -> Result<Self> {
        let token = config.resolved_bot_token().ok_or_else(|| {
            StrideError::Config(format!(
                "no telegram bot token; set channel.bot_token or {}",
                crate::config::BOT_TOKEN_ENV
            ))
        })?;
        Self::new(
            &config.api_base,
            &token,
            Duration::from_secs(config.timeout_secs.max(1)),
        )
    }

    fn send_url(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.bot_token)
    }
}

/// Numeric chat id (optionally negative) or `@channelusername`.
#[must_use]
pub fn is_telegram_address(address: &str) -> bool {
    if let Some(name) = address.strip_prefix('@') {
        return (5..=32).contains(&name.len())
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    }
    let digits = address.strip_prefix('-').unwrap_or(address);
    !digits.is_empty() && digits.len() <= 20 && digits.chars().all(|c| c.is_ascii_digit())
}

/// Retry hint from a 429: `parameters.retry_after` in the body, else the
/// `Retry-After` header.
fn retry_after_hint(body: &str, header: Option<&str>) -> Duration {
    let from_body = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.pointer("/parameters/retry_after").and_then(serde_json::Value::as_u64));
    let from_header = header.and_then(|h| h.trim().parse::<u64>().ok());
    from_body
        .or(from_header)
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_RETRY_AFTER)
}

#[async_trait]
impl MessageChannel for TelegramChannel {
    fn id(&self) -> &'static str {
        "telegram"
    }

    fn is_valid_address(&self, address: &str) -> bool {
        is_telegram_address(address)
    }

    async fn send(&self, message: &OutboundMessage) -> std::result::Result<SendReceipt, SendError> {
        let body = serde_json::json!({
            "chat_id": message.address,
            "text": message.text,
            "disable_web_page_preview": true
        });
        let response = self
            .client
            .post(self.send_url())
            .json(&body)
            .send()
            .await
            // The URL embeds the bot token.
            .map_err(|e| SendError::Transient(e.without_url().to_string()))?;

        let status = response.status();
        let retry_header = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let text = response.text().await.unwrap_or_default();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(SendError::RateLimited {
                retry_after: retry_after_hint(&text, retry_header.as_deref()),
            });
        }
        if status.is_server_error() {
            return Err(SendError::Transient(format!("telegram returned {status}: {text}")));
        }
        if !status.is_success() {
            return Err(SendError::Rejected {
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap_or_default();
        if parsed.get("ok").and_then(serde_json::Value::as_bool) == Some(false) {
            return Err(SendError::Rejected {
                status: status.as_u16(),
                body: text,
            });
        }
        let message_id = parsed
            .pointer("/result/message_id")
            .and_then(serde_json::Value::as_i64)
            .map(|id| id.to_string());
        Ok(SendReceipt { message_id })
    }
}
