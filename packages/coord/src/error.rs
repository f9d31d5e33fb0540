use paddock_core::CoreError;
use thiserror::Error;

/// Coordination store errors.
#[derive(Debug, Error)]
pub enum CoordError {
    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
    #[error("Invalid pool status: {0}")]
    InvalidStatus(String),
    #[error(transparent)]
    Core(#[from] CoreError),
}
