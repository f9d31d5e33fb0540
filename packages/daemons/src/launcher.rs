//! Multi-pool launcher.

use std::future::Future;
use std::path::PathBuf;

use coord::CoordinationStore;

use crate::{DaemonError, Manager, spawn_pool_process};

/// Starts one pool supervisor process per pool name and asks them to drain
/// when stopped.
pub struct Launcher<S> {
    pools: Vec<String>,
    program: PathBuf,
    config_path: Option<PathBuf>,
    manager: Manager<S>,
}

impl<S: CoordinationStore> Launcher<S> {
    pub fn new(pools: Vec<String>, program: impl Into<PathBuf>, store: S) -> Self {
        Self {
            pools,
            program: program.into(),
            config_path: None,
            manager: Manager::new(store),
        }
    }

    /// Pass this configuration file to every pool process.
    pub fn with_config(mut self, config_path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(config_path.into());
        self
    }

    /// Spawn the pools, wait for `shutdown`, then terminate the pools.
    ///
    /// Pool processes run in their own process groups, so a terminal
    /// interrupt reaches only the launcher.
    pub async fn run<F>(&self, shutdown: F) -> Result<(), DaemonError>
    where
        F: Future<Output = ()>,
    {
        for pool in &self.pools {
            let child = spawn_pool_process(&self.program, self.config_path.as_deref(), pool)?;
            tracing::info!("Pool \"{}\" launched: pid {:?}", pool, child.id());
        }

        shutdown.await;

        tracing::info!("Launcher stopping, terminating pools: {}", self.pools.join(", "));
        let terminated = self.manager.terminate(&self.pools, None).await?;
        tracing::info!("{} pool instances asked to drain", terminated.len());
        Ok(())
    }
}
