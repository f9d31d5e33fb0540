//! SurrealDB integration for the paddock job processor.
//!
//! This crate provides the durable store: a connection handle that each
//! daemon opens once and passes to its repositories, the schema, and
//! repositories for jobs, concurrency limits and queue routing records.
//!
//! # Features
//!
//! - `memory` (default): Use in-memory storage for testing
//! - `rocksdb`: Use RocksDB for persistent file-based storage

mod connection;
mod schema;
pub mod repositories;

pub use connection::{Database, DbConfig, DbError, connect};
pub use schema::{drop_schema, init_schema};

/// Connect with the given configuration and make sure the schema exists.
pub async fn init(config: &DbConfig) -> Result<Database, DbError> {
    let db = connect(config).await?;
    init_schema(&db).await?;
    Ok(db)
}
