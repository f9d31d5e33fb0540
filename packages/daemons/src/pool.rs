//! Worker-pool supervisor.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use coord::{CoordinationStore, QueueManager, StatusRegistry};
use futures_util::FutureExt;
use paddock_core::{JobId, PoolStatus};
use tokio::process::Child;
use ulid::Ulid;

use crate::{DaemonError, Spawner};

/// Pool supervisor settings.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Pool whose dispatch queue this instance consumes.
    pub name: String,
    /// Blocking-pop timeout, also the cadence of status checks.
    pub check_time: Duration,
    /// Sleep while saturated or draining.
    pub sleep_time: Duration,
    /// Maximum concurrent workhorses; `None` is unlimited.
    pub max_workhorses: Option<usize>,
}

impl PoolConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            check_time: Duration::from_secs(30),
            sleep_time: Duration::from_secs(1),
            max_workhorses: None,
        }
    }
}

/// How a pool instance stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolExit {
    /// Every child finished on its own.
    Drained,
    /// Children were force-killed.
    Killed,
}

struct TrackedChild {
    job_id: JobId,
    child: Child,
}

/// Supervisor of one pool instance.
pub struct Pool<S, P> {
    config: PoolConfig,
    instance_id: String,
    queues: QueueManager<S>,
    registry: StatusRegistry<S>,
    spawner: P,
    children: HashMap<u32, TrackedChild>,
}

impl<S: CoordinationStore, P: Spawner> Pool<S, P> {
    pub fn new(config: PoolConfig, store: S, spawner: P) -> Self {
        Self {
            config,
            instance_id: Ulid::new().to_string(),
            queues: QueueManager::new(store.clone()),
            registry: StatusRegistry::new(store),
            spawner,
            children: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Number of live children after reaping.
    pub fn children_count(&mut self) -> usize {
        self.reap();
        self.children.len()
    }

    /// Run until drained or killed.
    ///
    /// `shutdown` completing (SIGTERM) starts the same graceful drain as an
    /// observed `dead` status. It is polled without blocking after each pop
    /// or sleep, so a popped id is never lost to cancellation.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<PoolExit, DaemonError>
    where
        F: Future<Output = ()>,
    {
        tracing::info!("Pool \"{}\" started: {}", self.config.name, self.instance_id);
        tracing::info!(
            "Max workhorses: {}",
            self.config
                .max_workhorses
                .map_or_else(|| "unlimited".to_string(), |max| max.to_string())
        );
        self.registry
            .set_status(&self.config.name, &self.instance_id, PoolStatus::Active)
            .await?;

        tokio::pin!(shutdown);

        loop {
            let popped = if self.can_start_new_workhorse() {
                self.queues
                    .pop(&self.config.name, self.config.check_time)
                    .await?
            } else {
                tokio::time::sleep(self.config.sleep_time).await;
                None
            };

            if shutdown.as_mut().now_or_never().is_some() {
                tracing::info!("Pool \"{}\" got SIGTERM", self.config.name);
                self.push_back(popped).await?;
                return self.terminate(PoolExit::Drained).await;
            }

            match self
                .registry
                .get_status(&self.config.name, &self.instance_id)
                .await?
            {
                Some(PoolStatus::Kill) => {
                    self.push_back(popped).await?;
                    self.kill_children().await;
                    return self.terminate(PoolExit::Killed).await;
                }
                Some(PoolStatus::Dead) => {
                    self.push_back(popped).await?;
                    return self.terminate(PoolExit::Drained).await;
                }
                _ => {}
            }

            if let Some(job_id) = popped {
                self.start_workhorse(job_id)?;
            }
        }
    }

    fn can_start_new_workhorse(&mut self) -> bool {
        let count = self.children_count();
        self.config.max_workhorses.is_none_or(|max| count < max)
    }

    /// Return an undispatched id to the tail of the queue.
    async fn push_back(&self, popped: Option<JobId>) -> Result<(), DaemonError> {
        if let Some(job_id) = popped {
            tracing::info!("Job #{} returned to pool \"{}\"", job_id, self.config.name);
            self.queues.push(&self.config.name, job_id, true).await?;
        }
        Ok(())
    }

    fn start_workhorse(&mut self, job_id: JobId) -> Result<(), DaemonError> {
        let child = self
            .spawner
            .spawn(&self.config.name, &self.instance_id, job_id)?;
        match child.id() {
            Some(pid) => {
                tracing::info!("Workhorse for job #{} started: pid {}", job_id, pid);
                self.children.insert(pid, TrackedChild { job_id, child });
            }
            None => tracing::warn!("Workhorse for job #{} exited immediately", job_id),
        }
        Ok(())
    }

    /// Drop finished children without blocking.
    fn reap(&mut self) {
        self.children.retain(|pid, workhorse| match workhorse.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) if status.success() => {
                tracing::debug!("Workhorse {} for job #{} finished", pid, workhorse.job_id);
                false
            }
            Ok(Some(status)) => {
                tracing::warn!(
                    "Workhorse {} for job #{} exited with {}",
                    pid,
                    workhorse.job_id,
                    status
                );
                false
            }
            Err(e) => {
                tracing::warn!("Failed to poll workhorse {}: {}", pid, e);
                false
            }
        });
    }

    /// Kill every tracked child and wait for it to exit.
    async fn kill_children(&mut self) {
        for (pid, mut workhorse) in self.children.drain() {
            tracing::warn!("Killing workhorse {} for job #{}", pid, workhorse.job_id);
            if let Err(e) = workhorse.child.kill().await {
                tracing::warn!("Failed to kill workhorse {}: {}", pid, e);
            }
        }
    }

    /// Wait for children to finish, upgrading to a kill if the status
    /// changes to `kill` meanwhile, then publish `terminated`.
    async fn terminate(&mut self, mut exit: PoolExit) -> Result<PoolExit, DaemonError> {
        while self.children_count() > 0 {
            tracing::debug!(
                "Pool \"{}\" waiting for {} workhorses",
                self.config.name,
                self.children.len()
            );
            tokio::time::sleep(self.config.sleep_time).await;
            let status = self
                .registry
                .get_status(&self.config.name, &self.instance_id)
                .await?;
            if status == Some(PoolStatus::Kill) {
                self.kill_children().await;
                exit = PoolExit::Killed;
                break;
            }
        }

        self.registry
            .set_status(&self.config.name, &self.instance_id, PoolStatus::Terminated)
            .await?;
        tracing::info!("Pool \"{}\" terminated: {}", self.config.name, self.instance_id);
        Ok(exit)
    }
}
