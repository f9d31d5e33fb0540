//! Pool instance status registry.

use paddock_core::PoolStatus;

use crate::{CoordError, CoordinationStore, KEY_PREFIX};

const STATUS_FIELD: &str = "status";

/// A registered pool instance and its advertised status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolInstance {
    pub pool: String,
    pub instance_id: String,
    pub status: PoolStatus,
}

/// Typed access to the `(pool, instance) -> status` map.
///
/// Only the closed set of [`PoolStatus`] values is ever written.
#[derive(Clone)]
pub struct StatusRegistry<S> {
    store: S,
}

impl<S: CoordinationStore> StatusRegistry<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    fn pool_prefix() -> String {
        format!("{KEY_PREFIX}:pool:")
    }

    /// Store key for one pool instance.
    pub fn key(pool: &str, instance_id: &str) -> String {
        format!("{}{pool}:{instance_id}", Self::pool_prefix())
    }

    /// Split a registry key into `(pool, instance_id)`.
    fn parse_key(key: &str) -> Option<(&str, &str)> {
        key.strip_prefix(&Self::pool_prefix())?.rsplit_once(':')
    }

    pub async fn set_status(
        &self,
        pool: &str,
        instance_id: &str,
        status: PoolStatus,
    ) -> Result<(), CoordError> {
        self.store
            .hset(&Self::key(pool, instance_id), STATUS_FIELD, status.as_str())
            .await?;
        tracing::debug!(pool, instance_id, status = %status, "Pool status set");
        Ok(())
    }

    /// Set a status given as text, rejecting values outside the closed set.
    pub async fn set_raw_status(
        &self,
        pool: &str,
        instance_id: &str,
        status: &str,
    ) -> Result<(), CoordError> {
        let status: PoolStatus = status
            .parse()
            .map_err(|_| CoordError::InvalidStatus(status.to_string()))?;
        self.set_status(pool, instance_id, status).await
    }

    /// Current status, or `None` if the instance is not registered.
    pub async fn get_status(
        &self,
        pool: &str,
        instance_id: &str,
    ) -> Result<Option<PoolStatus>, CoordError> {
        match self
            .store
            .hget(&Self::key(pool, instance_id), STATUS_FIELD)
            .await?
        {
            Some(raw) => raw
                .parse()
                .map(Some)
                .map_err(|_| CoordError::InvalidStatus(raw)),
            None => Ok(None),
        }
    }

    pub async fn delete_status(&self, pool: &str, instance_id: &str) -> Result<(), CoordError> {
        self.store.delete(&Self::key(pool, instance_id)).await
    }

    /// Every registered instance, optionally only those of `pool`.
    pub async fn list_all(&self, pool: Option<&str>) -> Result<Vec<PoolInstance>, CoordError> {
        let pattern = match pool {
            Some(pool) => format!("{}{pool}:*", Self::pool_prefix()),
            None => format!("{}*", Self::pool_prefix()),
        };

        let mut instances = Vec::new();
        for key in self.store.keys(&pattern).await? {
            let Some((found_pool, instance_id)) = Self::parse_key(&key) else {
                continue;
            };
            if pool.is_some_and(|pool| pool != found_pool) {
                continue;
            }
            if let Some(status) = self.get_status(found_pool, instance_id).await? {
                instances.push(PoolInstance {
                    pool: found_pool.to_string(),
                    instance_id: instance_id.to_string(),
                    status,
                });
            }
        }
        Ok(instances)
    }
}
