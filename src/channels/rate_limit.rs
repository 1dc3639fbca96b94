//! Outbound rate limiting.
//!
//! A sliding one-minute window keeps a large sweep under the provider's
//! global limits. The dispatcher waits for a slot instead of dropping
//! messages.

use std::collections::VecDeque;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

const WINDOW: Duration = Duration::from_secs(60);

/// Rate limiting error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateLimitError {
    /// Window is full; a slot frees up after `retry_after`.
    #[error("rate limit exceeded; retry after {retry_after:?}")]
    Exceeded { retry_after: Duration },
}

/// Sliding-window limiter. A limit of zero disables limiting.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    max_messages_per_minute: u32,
    window: VecDeque<Instant>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(max_messages_per_minute: u32) -> Self {
        Self {
            max_messages_per_minute,
            window: VecDeque::new(),
        }
    }

    /// Take a slot now, or report how long until one frees up.
    pub fn try_acquire(&mut self) -> Result<(), RateLimitError> {
        if self.max_messages_per_minute == 0 {
            return Ok(());
        }
        let now = Instant::now();
        while let Some(&first) = self.window.front() {
            if now.duration_since(first) >= WINDOW {
                self.window.pop_front();
            } else {
                break;
            }
        }

        if self.window.len() >= self.max_messages_per_minute as usize {
            if let Some(&oldest) = self.window.front() {
                let retry_after = WINDOW.saturating_sub(now.duration_since(oldest));
                return Err(RateLimitError::Exceeded { retry_after });
            }
        }

        self.window.push_back(now);
        Ok(())
    }

    /// Slots left in the current window.
    #[must_use]
    pub fn remaining(&self) -> u32 {
        if self.max_messages_per_minute == 0 {
            return u32::MAX;
        }
        self.max_messages_per_minute
            .saturating_sub(self.window.len() as u32)
    }
}

/// Limiter shared by concurrent senders.
#[derive(Debug)]
pub struct OutboundThrottle {
    limiter: Mutex<RateLimiter>,
}

impl OutboundThrottle {
    #[must_use]
    pub fn new(max_messages_per_minute: u32) -> Self {
        Self {
            limiter: Mutex::new(RateLimiter::new(max_messages_per_minute)),
        }
    }

    /// Wait until a slot is available and take it.
    pub async fn acquire(&self) {
        loop {
            let wait = match self.limiter.lock().await.try_acquire() {
                Ok(()) => return,
                Err(RateLimitError::Exceeded { retry_after }) => retry_after,
            };
            debug!(wait_ms = wait.as_millis() as u64, "outbound throttle full, waiting");
            tokio::time::sleep(wait).await;
        }
    }
}
