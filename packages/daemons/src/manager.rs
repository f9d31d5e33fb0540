//! Operator control plane over pool instance statuses.

use coord::{CoordinationStore, PoolInstance, StatusRegistry};
use paddock_core::PoolStatus;

use crate::DaemonError;

/// Status mutations for operator tooling.
///
/// Every operation takes a pool-name filter and a source-status filter; an
/// empty pool list matches every pool and `None` statuses selects the
/// operation's default.
#[derive(Clone)]
pub struct Manager<S> {
    registry: StatusRegistry<S>,
}

impl<S: CoordinationStore> Manager<S> {
    pub fn new(store: S) -> Self {
        Self {
            registry: StatusRegistry::new(store),
        }
    }

    async fn select(
        &self,
        pools: &[String],
        statuses: &[PoolStatus],
    ) -> Result<Vec<PoolInstance>, DaemonError> {
        let instances = self.registry.list_all(None).await?;
        Ok(instances
            .into_iter()
            .filter(|i| pools.is_empty() || pools.contains(&i.pool))
            .filter(|i| statuses.contains(&i.status))
            .collect())
    }

    /// Current `(pool, instance, status)` entries. Defaults to all statuses.
    pub async fn get_status(
        &self,
        pools: &[String],
        statuses: Option<&[PoolStatus]>,
    ) -> Result<Vec<PoolInstance>, DaemonError> {
        self.select(pools, statuses.unwrap_or(&PoolStatus::ALL)).await
    }

    /// Ask pools to drain. Defaults to `active` instances.
    pub async fn terminate(
        &self,
        pools: &[String],
        from: Option<&[PoolStatus]>,
    ) -> Result<Vec<PoolInstance>, DaemonError> {
        self.transition(pools, from.unwrap_or(&[PoolStatus::Active]), PoolStatus::Dead)
            .await
    }

    /// Force pools to kill their children. Defaults to `dead` instances.
    pub async fn kill(
        &self,
        pools: &[String],
        from: Option<&[PoolStatus]>,
    ) -> Result<Vec<PoolInstance>, DaemonError> {
        self.transition(pools, from.unwrap_or(&[PoolStatus::Dead]), PoolStatus::Kill)
            .await
    }

    /// Delete registry entries. Defaults to `terminated` instances.
    pub async fn clean(
        &self,
        pools: &[String],
        from: Option<&[PoolStatus]>,
    ) -> Result<Vec<PoolInstance>, DaemonError> {
        let selected = self
            .select(pools, from.unwrap_or(&[PoolStatus::Terminated]))
            .await?;
        for instance in &selected {
            self.registry
                .delete_status(&instance.pool, &instance.instance_id)
                .await?;
            tracing::info!("Pool {}/{} cleaned", instance.pool, instance.instance_id);
        }
        Ok(selected)
    }

    /// Move matching instances to `target`, skipping illegal transitions.
    async fn transition(
        &self,
        pools: &[String],
        from: &[PoolStatus],
        target: PoolStatus,
    ) -> Result<Vec<PoolInstance>, DaemonError> {
        let mut changed = Vec::new();
        for instance in self.select(pools, from).await? {
            if !instance.status.can_transition_to(target) {
                tracing::warn!(
                    "Pool {}/{} is {}, cannot become {}",
                    instance.pool,
                    instance.instance_id,
                    instance.status,
                    target
                );
                continue;
            }
            self.registry
                .set_status(&instance.pool, &instance.instance_id, target)
                .await?;
            tracing::info!(
                "Pool {}/{}: {} -> {}",
                instance.pool,
                instance.instance_id,
                instance.status,
                target
            );
            changed.push(PoolInstance {
                status: target,
                ..instance
            });
        }
        Ok(changed)
    }
}
