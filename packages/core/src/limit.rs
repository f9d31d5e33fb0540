//! Concurrency limits on pools and queues.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Kind of entity a limit applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Pool,
    Queue,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Pool => "pool",
            EntityType::Queue => "queue",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pool" => Ok(EntityType::Pool),
            "queue" => Ok(EntityType::Queue),
            other => Err(CoreError::InvalidEntityType(other.to_string())),
        }
    }
}

/// Maximum number of active jobs for one pool or queue.
///
/// Entities without a limit row are unlimited. A limit of zero or less
/// blocks admission entirely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limit {
    pub entity_type: EntityType,
    pub entity: String,
    #[serde(default = "Limit::default_value")]
    pub limit: i64,
}

impl Limit {
    pub fn new(entity_type: EntityType, entity: impl Into<String>, limit: i64) -> Self {
        Self {
            entity_type,
            entity: entity.into(),
            limit,
        }
    }

    pub fn pool(entity: impl Into<String>, limit: i64) -> Self {
        Self::new(EntityType::Pool, entity, limit)
    }

    pub fn queue(entity: impl Into<String>, limit: i64) -> Self {
        Self::new(EntityType::Queue, entity, limit)
    }

    fn default_value() -> i64 {
        1
    }

    /// Check whether one more job fits on top of `active` jobs.
    pub fn admits(&self, active: usize) -> bool {
        usize::try_from(self.limit).is_ok_and(|limit| active < limit)
    }
}
