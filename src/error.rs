//! Error types for the message remover.

/// Top-level error type for a removal run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    #[error("Worker task failed: {0}")]
    Worker(String),
}

/// Errors detected before the worker starts.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid match pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Could not connect to broker at {dsn}: {reason}")]
    Connect { dsn: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Broker operation failures. All of them are fatal to the run.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Could not create channel: {0}")]
    Channel(String),

    #[error("Could not set prefetch to {count}: {reason}")]
    Prefetch { count: u16, reason: String },

    #[error("Could not start consumer on queue {queue}: {reason}")]
    Consume { queue: String, reason: String },

    #[error("Delivery stream failed: {0}")]
    Stream(String),

    #[error("Failed to acknowledge message: {0}")]
    Ack(String),

    #[error("Failed to reject message (requeue={requeue}): {reason}")]
    Reject { requeue: bool, reason: String },

    #[error("Failed to close connection: {0}")]
    Close(String),
}

/// Failure turning message headers into a match subject.
#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("Header {key} holds a non-finite float which JSON cannot represent")]
    NonFiniteFloat { key: String },

    #[error("Header {key} holds timestamp {seconds} which cannot be formatted as RFC 3339")]
    TimestampOutOfRange { key: String, seconds: u64 },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<tokio::task::JoinError> for Error {
    fn from(e: tokio::task::JoinError) -> Self {
        Error::Worker(e.to_string())
    }
}

/// Result type alias for the remover.
pub type Result<T> = std::result::Result<T, Error>;
