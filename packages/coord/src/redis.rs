//! Redis coordination store.

use std::time::Duration;

use redis::aio::MultiplexedConnection;

use crate::{CoordError, CoordinationStore};

/// Smallest BRPOP timeout sent to the server; zero would block forever.
const MIN_BLOCK_SECS: f64 = 0.01;

/// Coordination store backed by a Redis server.
#[derive(Clone)]
pub struct RedisCoordination {
    conn: MultiplexedConnection,
}

impl RedisCoordination {
    /// Connect to the server at `url` (`redis://host:port/db`).
    pub async fn connect(url: &str) -> Result<Self, CoordError> {
        tracing::info!("Connecting to coordination store: {}", url);
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self { conn })
    }
}

impl CoordinationStore for RedisCoordination {
    async fn push_head(&self, key: &str, value: &str) -> Result<(), CoordError> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("LPUSH")
            .arg(key)
            .arg(value)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn push_tail(&self, key: &str, value: &str) -> Result<(), CoordError> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("RPUSH")
            .arg(key)
            .arg(value)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn pop_tail(&self, key: &str, timeout: Duration) -> Result<Option<String>, CoordError> {
        let mut conn = self.conn.clone();
        let popped: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(key)
            .arg(timeout.as_secs_f64().max(MIN_BLOCK_SECS))
            .query_async(&mut conn)
            .await?;
        Ok(popped.map(|(_, value)| value))
    }

    async fn range(&self, key: &str) -> Result<Vec<String>, CoordError> {
        let mut conn = self.conn.clone();
        let values: Vec<String> = redis::cmd("LRANGE")
            .arg(key)
            .arg(0)
            .arg(-1)
            .query_async(&mut conn)
            .await?;
        Ok(values)
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, CoordError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("HGET")
            .arg(key)
            .arg(field)
            .query_async(&mut conn)
            .await?;
        Ok(value)
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), CoordError> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("HSET")
            .arg(key)
            .arg(field)
            .arg(value)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CoordError> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, CoordError> {
        let mut conn = self.conn.clone();
        let mut keys: Vec<String> = redis::cmd("KEYS")
            .arg(pattern)
            .query_async(&mut conn)
            .await?;
        keys.sort();
        Ok(keys)
    }
}
