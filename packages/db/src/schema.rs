//! Database schema definitions using SurrealQL.

use crate::{Database, DbError};

/// Initialize the database schema.
///
/// This creates all necessary tables and indexes. Safe to run repeatedly.
pub async fn init_schema(db: &Database) -> Result<(), DbError> {
    tracing::info!("Initializing database schema...");

    db.query(JOB_SCHEMA).await?.check()?;
    db.query(LIMIT_SCHEMA).await?.check()?;
    db.query(QUEUE_SCHEMA).await?.check()?;
    db.query(COUNTER_SCHEMA).await?.check()?;

    tracing::info!("Database schema initialized");

    Ok(())
}

/// Remove every table this crate defines, including their data.
pub async fn drop_schema(db: &Database) -> Result<(), DbError> {
    tracing::warn!("Dropping database schema");

    db.query(
        r#"
        REMOVE TABLE IF EXISTS job;
        REMOVE TABLE IF EXISTS concurrency_limit;
        REMOVE TABLE IF EXISTS queue;
        REMOVE TABLE IF EXISTS counter;
        "#,
    )
    .await?
    .check()?;

    Ok(())
}

/// Job table schema. Timestamps are epoch milliseconds.
const JOB_SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS job SCHEMALESS;

DEFINE INDEX IF NOT EXISTS job_job_id ON job FIELDS job_id UNIQUE;
DEFINE INDEX IF NOT EXISTS job_status ON job FIELDS status;
DEFINE INDEX IF NOT EXISTS job_host_status ON job FIELDS host, status;
DEFINE INDEX IF NOT EXISTS job_execute_at ON job FIELDS execute_at;
DEFINE INDEX IF NOT EXISTS job_updated_at ON job FIELDS updated_at;
"#;

/// Concurrency limits, one row per (entity_type, entity).
const LIMIT_SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS concurrency_limit SCHEMALESS;

DEFINE INDEX IF NOT EXISTS limit_entity ON concurrency_limit FIELDS entity_type, entity UNIQUE;
"#;

/// Queue routing records.
const QUEUE_SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS queue SCHEMALESS;

DEFINE INDEX IF NOT EXISTS queue_name ON queue FIELDS name UNIQUE;
"#;

/// Sequences for store-assigned integer ids.
const COUNTER_SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS counter SCHEMALESS;
"#;
