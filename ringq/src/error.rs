//! Error type definitions
//!
//! Provides all error types surfaced by ringq.

use std::time::Duration;

/// Result type alias for ringq
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for ringq
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Redis-related errors
    #[error("Redis error: {0}")]
    Redis(#[from] fred::error::RedisError),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Task validation errors
    #[error("Task validation error: {0}")]
    Validation(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// No handler registered for a task type
    #[error("No handler registered for task type: {0}")]
    HandlerNotFound(String),

    /// Handler processing errors
    #[error("Handler error: {0}")]
    Handler(String),

    /// Store errors raised outside of Redis (in-memory store, closed pools)
    #[error("Store error: {0}")]
    Store(String),
}

impl Error {
    /// Check if the error comes from the store and may clear up on its own
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Redis(_) | Error::Store(_))
    }

    /// Get the suggested delay before the caller retries at a higher level
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::Redis(_) => Some(Duration::from_secs(1)),
            Error::Store(_) => Some(Duration::from_millis(100)),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        use fred::error::RedisErrorKind;
        assert!(Error::Redis(fred::error::RedisError::new(RedisErrorKind::Unknown, "test")).is_retryable());
        assert!(Error::Store("test".to_string()).is_retryable());
        assert!(!Error::Validation("test".to_string()).is_retryable());
        assert!(!Error::Config("test".to_string()).is_retryable());
        assert!(!Error::HandlerNotFound("email".to_string()).is_retryable());
    }

    #[test]
    fn test_retry_after() {
        assert_eq!(Error::Store("x".into()).retry_after(), Some(Duration::from_millis(100)));
        assert_eq!(Error::Config("x".into()).retry_after(), None);
    }

    #[test]
    fn test_json_error_conversion() {
        let err: Error = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
