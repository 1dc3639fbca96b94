//! Stride: goal-progress engine and scheduled nudge dispatcher.
//!
//! Goals are broken down into subgoals, tasks and microtasks. Completing a
//! microtask re-derives every container's status and moves a single focus
//! pointer to the next incomplete leaf. A minute-tick dispatcher sends
//! daily and weekly nudges in each user's local time, at most once per
//! period, over an unreliable messaging channel, and executes deferred
//! account deletions.
//!
//! # Architecture
//!
//! - **store**: SQLite database, subjects, shared transaction helper
//! - **hierarchy**: model, materializer, progress normalizer, mutations
//! - **scheduler**: local-time windows, reservation ledger, deletion
//!   schedule, content seam, dispatcher loop
//! - **channels**: channel trait, Telegram adapter, throttle, retry wrapper

pub mod channels;
pub mod config;
pub mod error;
pub mod hierarchy;
pub mod scheduler;
pub mod store;

pub use config::StrideConfig;
pub use error::{Result, StrideError};
pub use hierarchy::{Breakdown, FocusPointer, GoalTree, MicroStatus, NewGoal};
pub use scheduler::{Dispatcher, TickReport};
pub use store::{Store, Subject};
