//! Queue routing records.

use serde::{Deserialize, Serialize};

/// A named queue routed to the pool that executes its jobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Queue {
    /// Queue name, unique across the deployment.
    pub name: String,
    /// Pool whose dispatch queue receives jobs from this queue.
    pub pool: String,
}

impl Queue {
    /// Create a routing record for `name` on `pool`.
    pub fn new(name: impl Into<String>, pool: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pool: pool.into(),
        }
    }

    /// A queue that shares its pool's name.
    pub fn for_pool(pool: impl Into<String>) -> Self {
        let pool = pool.into();
        Self {
            name: pool.clone(),
            pool,
        }
    }
}

impl std::fmt::Display for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.name, self.pool)
    }
}
