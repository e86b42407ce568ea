//! Error types for the sigmesh enrichment pipeline.

use thiserror::Error;
use uuid::Uuid;

/// Result type alias using sigmesh's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for enrichment operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Activity not found
    #[error("Activity not found: {0}")]
    ActivityNotFound(Uuid),

    /// Activity carries no username, email, display name, or source id
    #[error("No identity information found in activity {0}")]
    NoIdentityInfo(Uuid),

    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Classification failed
    #[error("Classification error: {0}")]
    Classification(String),

    /// Clustering failed
    #[error("Clustering error: {0}")]
    Clustering(String),

    /// Search index operation failed. The boolean marks transient
    /// conditions (unavailable shards, timeouts) eligible for retry.
    #[error("Index error: {0}")]
    Index(String, bool),

    /// Retry/dead-letter queue error
    #[error("Queue error: {0}")]
    Queue(String),

    /// Workflow orchestration error
    #[error("Workflow error: {0}")]
    Workflow(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Operation exceeded its deadline
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether a failed attempt with this error should be re-enqueued.
    ///
    /// Transient infrastructure failures (connection resets, timeouts,
    /// throttling, unavailable index shards) are retryable; input errors
    /// and configuration problems are not; retrying them cannot succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Database(e) => matches!(
                e,
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
            ),
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::NotFound
            ),
            Error::Index(_, retryable) => *retryable,
            Error::Request(_) | Error::Timeout(_) | Error::Queue(_) => true,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        // 429 and 5xx responses surface here as status errors; both classes
        // are transient from the pipeline's point of view.
        Error::Request(e.to_string())
    }
}
