//! Core domain types for the paddock job processor.
//!
//! This crate contains shared types used across all packages:
//! - Job, JobStatus and ExecutableUnit for units of work
//! - Limit and Queue for admission control and routing
//! - PoolStatus for the pool instance lifecycle

mod error;
mod job;
mod limit;
mod pool_status;
mod queue;

pub use error::CoreError;
pub use job::{
    ExecutableUnit, HOST_DEFAULT, Job, JobId, JobOwner, JobParams, JobStatus, NewJob,
};
pub use limit::{EntityType, Limit};
pub use pool_status::PoolStatus;
pub use queue::Queue;
