//! Outbound messaging channels.
//!
//! Transports implement [`traits::MessageChannel`] and make exactly one
//! attempt per call. [`resilient::ResilientChannel`] layers the retry
//! policy and the outbound throttle on top.

pub mod rate_limit;
pub mod resilient;
pub mod telegram;
pub mod traits;

pub use rate_limit::{OutboundThrottle, RateLimitError, RateLimiter};
pub use resilient::{Delivery, DeliveryFailure, ResilientChannel, RetryPolicy};
pub use telegram::TelegramChannel;
pub use traits::{MessageChannel, OutboundMessage, SendError, SendReceipt};
