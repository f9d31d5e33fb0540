use db::{Database, DbConfig, DbError};

/// Open a fresh in-memory store with the schema applied.
///
/// Every `mem://` connection owns its own datastore, so tests never share
/// state.
pub async fn setup_db() -> Result<Database, DbError> {
    db::init(&DbConfig::memory()).await
}
