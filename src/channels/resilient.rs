//! Retry wrapper around a [`MessageChannel`].
//!
//! Policy per attempt outcome:
//! - rate limited: sleep the provider's hint plus a safety margin;
//! - transient: linear backoff, `attempt * backoff_unit`;
//! - rejected: give up immediately.
//!
//! Exhausting the attempt budget surfaces the last error. Callers log it
//! and move on.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::channels::rate_limit::OutboundThrottle;
use crate::channels::traits::{MessageChannel, OutboundMessage, SendError, SendReceipt};
use crate::config::ChannelConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub backoff_unit: Duration,
    pub rate_limit_margin: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            backoff_unit: Duration::from_secs(1),
            rate_limit_margin: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn from_config(config: &ChannelConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff_unit: Duration::from_millis(config.backoff_unit_ms),
            rate_limit_margin: Duration::from_millis(config.rate_limit_margin_ms),
        }
    }

    /// Delay before the attempt following `attempt` (1-based) failed with `err`.
    fn delay_after(&self, attempt: u32, err: &SendError) -> Duration {
        match err {
            SendError::RateLimited { retry_after } => *retry_after + self.rate_limit_margin,
            _ => self.backoff_unit.saturating_mul(attempt),
        }
    }
}

/// Successful delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub receipt: SendReceipt,
    pub attempts: u32,
}

/// Delivery that ran out of attempts or was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("delivery failed after {attempts} attempt(s): {last_error}")]
pub struct DeliveryFailure {
    pub attempts: u32,
    pub last_error: SendError,
}

/// Channel with retry policy and optional outbound throttle.
#[derive(Clone)]
pub struct ResilientChannel {
    channel: Arc<dyn MessageChannel>,
    policy: RetryPolicy,
    throttle: Option<Arc<OutboundThrottle>>,
}

impl ResilientChannel {
    pub fn new(channel: Arc<dyn MessageChannel>, policy: RetryPolicy) -> Self {
        Self {
            channel,
            policy,
            throttle: None,
        }
    }

    /// Consult `throttle` before every attempt.
    pub fn with_throttle(mut self, throttle: Arc<OutboundThrottle>) -> Self {
        self.throttle = Some(throttle);
        self
    }

    pub fn channel_id(&self) -> &'static str {
        self.channel.id()
    }

    pub fn is_valid_address(&self, address: &str) -> bool {
        self.channel.is_valid_address(address)
    }

    pub async fn send(&self, address: &str, text: &str) -> Result<Delivery, DeliveryFailure> {
        let message = OutboundMessage {
            address: address.to_owned(),
            text: text.to_owned(),
        };
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            if let Some(throttle) = &self.throttle {
                throttle.acquire().await;
            }

            let err = match self.channel.send(&message).await {
                Ok(receipt) => {
                    return Ok(Delivery {
                        receipt,
                        attempts: attempt,
                    });
                }
                Err(err) => err,
            };

            if !err.is_retryable() || attempt >= max_attempts {
                return Err(DeliveryFailure {
                    attempts: attempt,
                    last_error: err,
                });
            }

            let delay = self.policy.delay_after(attempt, &err);
            match &err {
                SendError::RateLimited { .. } => debug!(
                    channel = self.channel.id(),
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "rate limited by provider"
                ),
                _ => warn!(
                    channel = self.channel.id(),
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "send failed, retrying: {err}"
                ),
            }
            tokio::time::sleep(delay).await;
        }
    }
}
