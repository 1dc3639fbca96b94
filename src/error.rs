//! Error types for the stride core.

/// Top-level error type for the progress engine and dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum StrideError {
    /// Hierarchy store / SQLite error.
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Input rejected before touching the store.
    #[error("invalid input: {0}")]
    Invalid(String),

    /// A referenced row does not exist (or belongs to another user).
    #[error("not found: {0}")]
    NotFound(String),

    /// Scheduler error (window evaluation, ledger, sweep).
    #[error("scheduler error: {0}")]
    Scheduler(String),

    /// Outbound channel error.
    #[error("channel error: {0}")]
    Channel(String),

    /// Store mutex was poisoned by a panicking holder.
    #[error("lock poisoned: {0}")]
    Lock(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, StrideError>;
