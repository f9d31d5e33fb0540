//! Repository implementations for database operations.

mod job_repo;
mod limit_repo;
mod queue_repo;

pub use job_repo::{JobFilter, JobRepository};
pub use limit_repo::LimitRepository;
pub use queue_repo::QueueRepository;
