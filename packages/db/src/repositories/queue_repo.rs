//! Queue routing repository.

use paddock_core::Queue;

use crate::{Database, DbError};

/// Repository for `queue -> pool` routing records.
#[derive(Clone)]
pub struct QueueRepository {
    db: Database,
}

impl QueueRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create or re-route a queue.
    pub async fn set(&self, queue: Queue) -> Result<Queue, DbError> {
        let name = queue.name.clone();

        let record: Option<Queue> = self.db.upsert(("queue", name)).content(queue).await?;

        record.ok_or_else(|| DbError::Query("Failed to store queue".into()))
    }

    /// Get a queue by name.
    pub async fn get(&self, name: &str) -> Result<Queue, DbError> {
        let record: Option<Queue> = self.db.select(("queue", name.to_string())).await?;

        record.ok_or_else(|| DbError::NotFound(format!("Queue not found: {}", name)))
    }

    /// List all queues ordered by name.
    pub async fn list(&self) -> Result<Vec<Queue>, DbError> {
        let mut response = self
            .db
            .query("SELECT * FROM queue ORDER BY name ASC")
            .await?;

        let queues: Vec<Queue> = response.take(0)?;
        Ok(queues)
    }

    /// Delete a queue. Returns whether it existed.
    pub async fn delete(&self, name: &str) -> Result<bool, DbError> {
        let removed: Option<Queue> = self.db.delete(("queue", name.to_string())).await?;
        Ok(removed.is_some())
    }
}
