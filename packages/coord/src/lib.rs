//! Shared coordination store for the paddock job processor.
//!
//! The coordination store holds the state that several processes mutate
//! concurrently:
//! - per-pool FIFO dispatch queues of job ids ([`QueueManager`])
//! - the pool instance status registry ([`StatusRegistry`])
//!
//! Both are thin typed wrappers over a [`CoordinationStore`] backend.
//!
//! # Features
//!
//! - `redis` (default): Redis backend for deployments

mod error;
mod memory;
mod queue;
mod registry;
mod store;

#[cfg(feature = "redis")]
mod redis;

pub use error::CoordError;
pub use memory::MemoryCoordination;
pub use queue::QueueManager;
pub use registry::{PoolInstance, StatusRegistry};
pub use store::CoordinationStore;

#[cfg(feature = "redis")]
pub use redis::RedisCoordination;

/// Prefix of every key this crate writes.
pub const KEY_PREFIX: &str = "paddock";
