//! Error types for durable execution operations

use thiserror::Error;

/// Result type for durable execution operations
pub type Result<T> = std::result::Result<T, DurableError>;

/// Errors that can occur during checkpoint persistence
///
/// A missing record is never an error: `load`/`delete` report absence through
/// their return values. Mid-operation backend failures propagate unchanged;
/// the manager performs no implicit retry.
#[derive(Error, Debug)]
pub enum DurableError {
    /// Record could not be serialized or deserialized
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backend error during an operation
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Backend unreachable at construction time
    #[error("cannot connect to redis at {addr}: {source}")]
    Connection {
        addr: String,
        #[source]
        source: redis::RedisError,
    },

    /// Generic storage failure
    #[error("storage error: {0}")]
    Storage(String),

    /// I/O error (runtime construction for blocking adapters)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Blocking variant invoked from inside an async runtime
    #[error("blocking call invoked from within an async context; use the async variant instead")]
    BlockingInAsyncContext,
}
