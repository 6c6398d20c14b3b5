//! Store error type and transient-error classification.

use std::fmt;

/// Errors surfaced by either storage tier.
#[derive(Debug)]
pub enum StoreError {
    /// Redis command or connection failure.
    Kv(redis::RedisError),
    /// Postgres query or pool failure.
    Doc(sqlx::Error),
    /// A stored value failed to decode into its expected shape.
    Decode(String),
}

impl StoreError {
    /// A lookup that matched nothing (only the durable tier reports this).
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::Doc(sqlx::Error::RowNotFound))
    }

    /// Whether the error is worth a reconnect-and-retry. Mirrors the
    /// classification the gateway retries on: Redis connection, timeout and
    /// response errors; Postgres I/O, TLS and pool exhaustion. Anything
    /// else (bad data, constraint violations, decode failures) rethrows
    /// immediately.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Kv(err) => {
                err.is_io_error()
                    || err.is_timeout()
                    || err.is_connection_refusal()
                    || err.is_connection_dropped()
                    || err.kind() == redis::ErrorKind::ResponseError
            }
            StoreError::Doc(err) => matches!(
                err,
                sqlx::Error::Io(_)
                    | sqlx::Error::Tls(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::Protocol(_)
            ),
            StoreError::Decode(_) => false,
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Kv(err) => write!(f, "kv store error: {err}"),
            StoreError::Doc(err) => write!(f, "document store error: {err}"),
            StoreError::Decode(message) => write!(f, "stored value malformed: {message}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Kv(err) => Some(err),
            StoreError::Doc(err) => Some(err),
            StoreError::Decode(_) => None,
        }
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Kv(err)
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Doc(err)
    }
}
