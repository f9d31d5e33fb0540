use thiserror::Error;

/// Validation errors raised by the domain types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid job status: {0}")]
    InvalidJobStatus(String),
    #[error("Invalid pool status: {0}")]
    InvalidPoolStatus(String),
    #[error("Invalid limit entity type: {0}")]
    InvalidEntityType(String),
    #[error("Invalid job arguments: {0}")]
    InvalidArguments(String),
    #[error("Invalid job id: {0}")]
    InvalidJobId(String),
    #[error("Payload error: {0}")]
    Payload(#[from] serde_json::Error),
}
