//! Admission dispatcher.
//!
//! Promotes ready jobs (NEW or RESTART, due, on this host) to ENQUEUED and
//! pushes their ids to the pool dispatch queues, as long as the global
//! ceiling and every applicable pool and queue limit allow it.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use coord::{CoordinationStore, QueueManager};
use db::Database;
use db::repositories::{JobRepository, LimitRepository, QueueRepository};
use paddock_core::{EntityType, HOST_DEFAULT, Job, JobStatus, Limit, Queue};
use tokio::time::Instant;

use crate::DaemonError;

/// Dispatcher settings.
#[derive(Debug, Clone)]
pub struct WhipConfig {
    /// Only jobs with this host are admitted.
    pub host: String,
    /// Cycle cadence.
    pub check_time: Duration,
    /// How often limits and queue routes are reloaded.
    pub limits_update_time: Duration,
    /// Global ceiling on active jobs.
    pub max_jobs: usize,
}

impl Default for WhipConfig {
    fn default() -> Self {
        Self {
            host: HOST_DEFAULT.to_string(),
            check_time: Duration::from_secs(1),
            limits_update_time: Duration::from_secs(60),
            max_jobs: 100,
        }
    }
}

/// Snapshot of configured limits and queue routes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Limits {
    pub by_pool: HashMap<String, Limit>,
    pub by_queue: HashMap<String, Limit>,
    /// `queue -> pool` from the queue routing records.
    pub routes: HashMap<String, String>,
}

impl Limits {
    pub fn new(limits: Vec<Limit>, queues: Vec<Queue>) -> Self {
        let mut snapshot = Self {
            routes: queues.into_iter().map(|q| (q.name, q.pool)).collect(),
            ..Default::default()
        };
        for limit in limits {
            let target = match limit.entity_type {
                EntityType::Pool => &mut snapshot.by_pool,
                EntityType::Queue => &mut snapshot.by_queue,
            };
            target.insert(limit.entity.clone(), limit);
        }
        snapshot
    }
}

/// Active job counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CurrentLoad {
    pub total: usize,
    pub by_pool: HashMap<String, usize>,
    pub by_queue: HashMap<String, usize>,
}

impl CurrentLoad {
    /// Count the given active jobs.
    pub fn from_jobs<'a>(jobs: impl IntoIterator<Item = &'a Job>) -> Self {
        let mut load = Self::default();
        for job in jobs {
            load.add(&job.pool, &job.queue);
        }
        load
    }

    /// Account for one more active job.
    pub fn add(&mut self, pool: &str, queue: &str) {
        self.total += 1;
        *self.by_pool.entry(pool.to_string()).or_default() += 1;
        *self.by_queue.entry(queue.to_string()).or_default() += 1;
    }

    pub fn pool(&self, pool: &str) -> usize {
        self.by_pool.get(pool).copied().unwrap_or(0)
    }

    pub fn queue(&self, queue: &str) -> usize {
        self.by_queue.get(queue).copied().unwrap_or(0)
    }
}

/// Whether admitting `job` keeps every applicable limit. Entities without a
/// limit are unlimited.
pub fn can_enqueue(job: &Job, load: &CurrentLoad, limits: &Limits, max_jobs: usize) -> bool {
    if load.total >= max_jobs {
        return false;
    }
    if let Some(limit) = limits.by_queue.get(&job.queue)
        && !limit.admits(load.queue(&job.queue))
    {
        return false;
    }
    if let Some(limit) = limits.by_pool.get(&job.pool)
        && !limit.admits(load.pool(&job.pool))
    {
        return false;
    }
    true
}

/// Sleep left in a cycle of `check_time` after `elapsed`; never negative.
pub fn remaining_sleep(check_time: Duration, elapsed: Duration) -> Duration {
    check_time.saturating_sub(elapsed)
}

/// The admission dispatcher.
pub struct Whip<S> {
    config: WhipConfig,
    jobs: JobRepository,
    limit_repo: LimitRepository,
    queue_repo: QueueRepository,
    queues: QueueManager<S>,
    limits: Limits,
    limits_loaded_at: Option<Instant>,
}

impl<S: CoordinationStore> Whip<S> {
    pub fn new(config: WhipConfig, db: Database, store: S) -> Self {
        Self {
            config,
            jobs: JobRepository::new(db.clone()),
            limit_repo: LimitRepository::new(db.clone()),
            queue_repo: QueueRepository::new(db),
            queues: QueueManager::new(store),
            limits: Limits::default(),
            limits_loaded_at: None,
        }
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Reload limits and routes from the store.
    pub async fn update_limits(&mut self) -> Result<(), DaemonError> {
        let limits = self.limit_repo.list().await?;
        let queues = self.queue_repo.list().await?;
        self.limits = Limits::new(limits, queues);
        self.limits_loaded_at = Some(Instant::now());
        tracing::info!(
            "Limits updated: {} pool, {} queue",
            self.limits.by_pool.len(),
            self.limits.by_queue.len()
        );
        Ok(())
    }

    fn limits_due(&self) -> bool {
        self.limits_loaded_at
            .is_none_or(|at| at.elapsed() >= self.config.limits_update_time)
    }

    /// One admission cycle at `now`. Returns the number of admitted jobs.
    pub async fn cycle(&mut self, now: DateTime<Utc>) -> Result<usize, DaemonError> {
        if self.limits_due() {
            self.update_limits().await?;
        }

        let mut load = CurrentLoad::from_jobs(&self.jobs.active().await?);
        if load.total >= self.config.max_jobs {
            tracing::debug!("Max jobs reached: {}", load.total);
            return Ok(0);
        }

        let ready = self
            .jobs
            .ready_for_host(&self.config.host, now, None)
            .await?;

        let mut admitted = 0;
        for job in ready {
            if !can_enqueue(&job, &load, &self.limits, self.config.max_jobs) {
                continue;
            }
            if let Some(routed) = self.limits.routes.get(&job.queue)
                && routed != &job.pool
            {
                tracing::warn!(
                    "Job #{} queue \"{}\" is routed to pool \"{}\", dispatching to \"{}\"",
                    job.id,
                    job.queue,
                    routed,
                    job.pool
                );
            }
            self.enqueue(&job).await?;
            load.add(&job.pool, &job.queue);
            admitted += 1;
        }
        Ok(admitted)
    }

    async fn enqueue(&self, job: &Job) -> Result<(), DaemonError> {
        // A pool may pop the id as soon as it is pushed, and workhorses only
        // run ENQUEUED jobs.
        self.jobs.set_status(job.id, JobStatus::Enqueued).await?;
        self.queues.push(&job.pool, job.id, false).await?;
        tracing::info!("Job #{} enqueued (Pool: {})", job.id, job.pool);
        Ok(())
    }

    /// Run cycles forever at the configured cadence.
    pub async fn run(&mut self) -> Result<(), DaemonError> {
        tracing::info!("Whip started on host \"{}\"", self.config.host);
        tracing::info!("Jobs check time: {:?}", self.config.check_time);
        tracing::info!("Update limits time: {:?}", self.config.limits_update_time);

        loop {
            let started = Instant::now();
            let admitted = self.cycle(Utc::now()).await?;
            if admitted > 0 {
                tracing::debug!("Admitted {} jobs", admitted);
            }
            tokio::time::sleep(remaining_sleep(self.config.check_time, started.elapsed())).await;
        }
    }
}
