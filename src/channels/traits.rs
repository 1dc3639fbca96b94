use std::time::Duration;

use async_trait::async_trait;

/// Message handed to a channel for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Channel-specific recipient (e.g. a Telegram chat id).
    pub address: String,
    pub text: String,
}

/// Provider metadata for a successful send. Logged only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendReceipt {
    pub message_id: Option<String>,
}

/// Classified failure of a single send attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    /// Provider asked us to slow down.
    #[error("rate limited; retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    /// Network failure, timeout or 5xx. Worth retrying.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Any other non-success response. Retrying cannot help.
    #[error("rejected ({status}): {body}")]
    Rejected { status: u16, body: String },
}

impl SendError {
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Rejected { .. })
    }
}

/// Outbound channel contract. New transports only need to implement this.
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Stable channel identifier (e.g. `telegram`).
    fn id(&self) -> &'static str;

    /// Whether `address` is well-formed for this channel. Subjects with a
    /// malformed address are skipped before any reservation is taken.
    fn is_valid_address(&self, address: &str) -> bool;

    /// One delivery attempt. Retries belong to the caller.
    async fn send(&self, message: &OutboundMessage) -> Result<SendReceipt, SendError>;
}
