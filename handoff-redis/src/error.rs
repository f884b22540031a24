use thiserror::Error;

/// Errors surfaced by the raw `Client` implementation, before `ConnPool`
/// classifies them into retriable vs. terminal (mirrors the reference
/// codebase's `common_redis::CustomRedisError`).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RedisOpError {
    #[error("not found")]
    NotFound,
    #[error("parse error: {0}")]
    Parse(String),
    #[error("connection error: {0}")]
    Connection(String),
    #[error("timeout")]
    Timeout,
    #[error("redis error: {0}")]
    Other(String),
}

impl RedisOpError {
    /// Whether `ConnPool::execute_with_retry` should retry this error.
    /// Per spec.md §4.E: network refused, timeout, reset, closed pipe.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            RedisOpError::Connection(_) | RedisOpError::Timeout
        )
    }
}

impl From<redis::RedisError> for RedisOpError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_timeout() {
            RedisOpError::Timeout
        } else if err.is_connection_dropped() || err.is_connection_refusal() || err.is_io_error() {
            RedisOpError::Connection(err.to_string())
        } else {
            RedisOpError::Other(err.to_string())
        }
    }
}

impl From<tokio::time::error::Elapsed> for RedisOpError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        RedisOpError::Timeout
    }
}

impl From<RedisOpError> for handoff_core::HandoffError {
    fn from(err: RedisOpError) -> Self {
        match err {
            RedisOpError::NotFound => handoff_core::HandoffError::NotFound(err.to_string()),
            other => handoff_core::HandoffError::StoreUnavailable(other.to_string()),
        }
    }
}
