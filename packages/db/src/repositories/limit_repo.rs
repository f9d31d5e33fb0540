//! Concurrency limit repository.

use paddock_core::{EntityType, Limit};

use crate::{Database, DbError};

/// Repository for concurrency limits.
#[derive(Clone)]
pub struct LimitRepository {
    db: Database,
}

fn record_key(entity_type: EntityType, entity: &str) -> String {
    format!("{}:{}", entity_type, entity)
}

impl LimitRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// List every configured limit.
    pub async fn list(&self) -> Result<Vec<Limit>, DbError> {
        let mut response = self
            .db
            .query("SELECT * FROM concurrency_limit ORDER BY entity_type ASC, entity ASC")
            .await?;

        let limits: Vec<Limit> = response.take(0)?;
        Ok(limits)
    }

    /// Create or replace the limit for an entity.
    pub async fn set(&self, limit: Limit) -> Result<Limit, DbError> {
        let key = record_key(limit.entity_type, &limit.entity);

        let record: Option<Limit> = self
            .db
            .upsert(("concurrency_limit", key))
            .content(limit)
            .await?;

        let limit =
            record.ok_or_else(|| DbError::Query("Failed to store concurrency limit".into()))?;
        tracing::info!(
            entity_type = %limit.entity_type,
            entity = %limit.entity,
            limit = limit.limit,
            "Concurrency limit set"
        );
        Ok(limit)
    }

    /// Remove the limit for an entity. Returns whether one existed.
    pub async fn delete(&self, entity_type: EntityType, entity: &str) -> Result<bool, DbError> {
        let removed: Option<Limit> = self
            .db
            .delete(("concurrency_limit", record_key(entity_type, entity)))
            .await?;

        Ok(removed.is_some())
    }
}
