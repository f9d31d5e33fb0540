use coord::CoordError;
use db::DbError;
use paddock_core::{CoreError, JobId};
use thiserror::Error;

/// Errors that end a daemon loop.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Coord(#[from] CoordError),
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("No handler registered for: {0}")]
    UnknownHandler(String),
    #[error("Job #{job_id} failed: {reason}")]
    JobFailed { job_id: JobId, reason: String },
}
