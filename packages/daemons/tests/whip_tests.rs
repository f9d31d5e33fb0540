#![allow(clippy::disallowed_methods)]

mod common;

use std::collections::HashMap;
use std::error::Error;
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use coord::{CoordError, CoordinationStore, MemoryCoordination, QueueManager};
use daemons::{ExecEnv, Whip, WhipConfig, Workhorse, WorkhorseOutcome};
use db::repositories::{JobRepository, LimitRepository};
use paddock_core::{ExecutableUnit, JobId, JobStatus, Limit, NewJob};

/// Memory store that records the job status at the moment each id is pushed.
#[derive(Clone)]
struct StatusAtPush {
    inner: MemoryCoordination,
    jobs: JobRepository,
    seen: Arc<Mutex<Vec<(JobId, Option<JobStatus>)>>>,
}

impl StatusAtPush {
    fn new(inner: MemoryCoordination, jobs: JobRepository) -> Self {
        Self {
            inner,
            jobs,
            seen: Arc::default(),
        }
    }

    fn seen(&self) -> Vec<(JobId, Option<JobStatus>)> {
        self.seen.lock().unwrap().clone()
    }

    async fn record(&self, value: &str) {
        if let Ok(id) = JobId::parse(value) {
            let status = self.jobs.find(id).await.ok().flatten().map(|job| job.status);
            self.seen.lock().unwrap().push((id, status));
        }
    }
}

impl CoordinationStore for StatusAtPush {
    async fn push_head(&self, key: &str, value: &str) -> Result<(), CoordError> {
        self.record(value).await;
        self.inner.push_head(key, value).await
    }

    async fn push_tail(&self, key: &str, value: &str) -> Result<(), CoordError> {
        self.record(value).await;
        self.inner.push_tail(key, value).await
    }

    async fn pop_tail(
        &self,
        key: &str,
        timeout: std::time::Duration,
    ) -> Result<Option<String>, CoordError> {
        self.inner.pop_tail(key, timeout).await
    }

    async fn range(&self, key: &str) -> Result<Vec<String>, CoordError> {
        self.inner.range(key).await
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, CoordError> {
        self.inner.hget(key, field).await
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), CoordError> {
        self.inner.hset(key, field, value).await
    }

    async fn delete(&self, key: &str) -> Result<(), CoordError> {
        self.inner.delete(key).await
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, CoordError> {
        self.inner.keys(pattern).await
    }
}

#[tokio::test]
async fn test_queue_limit_admits_exactly_one() -> Result<(), Box<dyn Error>> {
    let (db, store) = common::setup().await?;
    let jobs = JobRepository::new(db.clone());
    LimitRepository::new(db.clone()).set(Limit::queue("q", 1)).await?;

    let j = common::submit(&jobs, "p", "q", "echo").await?;
    let k = common::submit(&jobs, "p", "q", "echo").await?;

    let mut whip = Whip::new(WhipConfig::default(), db, store.clone());
    let admitted = whip.cycle(Utc::now()).await?;
    assert_eq!(admitted, 1);

    let j = jobs.get(j.id).await?;
    let k = jobs.get(k.id).await?;
    let statuses = [j.status, k.status];
    assert_eq!(statuses.iter().filter(|s| **s == JobStatus::Enqueued).count(), 1);
    assert!(statuses.iter().any(|s| s.is_ready()));

    let queued = QueueManager::new(store).peek_all("p").await?;
    assert_eq!(queued, vec![j.id]);

    // The slot stays taken on the next cycle.
    assert_eq!(whip.cycle(Utc::now()).await?, 0);

    Ok(())
}

#[tokio::test]
async fn test_cycle_respects_every_limit() -> Result<(), Box<dyn Error>> {
    let (db, store) = common::setup().await?;
    let jobs = JobRepository::new(db.clone());
    let limits = LimitRepository::new(db.clone());
    limits.set(Limit::queue("q1", 2)).await?;
    limits.set(Limit::queue("q2", 5)).await?;
    limits.set(Limit::pool("p", 4)).await?;

    for _ in 0..4 {
        common::submit(&jobs, "p", "q1", "echo").await?;
        common::submit(&jobs, "p", "q2", "echo").await?;
        common::submit(&jobs, "free", "q3", "echo").await?;
    }

    // One job of q1 is already running.
    let running = common::submit(&jobs, "p", "q1", "echo").await?;
    jobs.set_status(running.id, JobStatus::InProgress).await?;

    let config = WhipConfig {
        max_jobs: 8,
        ..WhipConfig::default()
    };
    let mut whip = Whip::new(config, db, store);
    whip.cycle(Utc::now()).await?;

    let active = jobs.active().await?;
    let mut by_pool: HashMap<String, usize> = HashMap::new();
    let mut by_queue: HashMap<String, usize> = HashMap::new();
    for job in &active {
        *by_pool.entry(job.pool.clone()).or_default() += 1;
        *by_queue.entry(job.queue.clone()).or_default() += 1;
    }

    assert!(active.len() <= 8);
    assert!(by_queue.get("q1").copied().unwrap_or(0) <= 2);
    assert!(by_queue.get("q2").copied().unwrap_or(0) <= 5);
    assert!(by_pool.get("p").copied().unwrap_or(0) <= 4);
    assert_eq!(by_pool.get("p").copied(), Some(4));
    assert_eq!(active.len(), 8);

    Ok(())
}

#[tokio::test]
async fn test_unlimited_jobs_are_never_blocked() -> Result<(), Box<dyn Error>> {
    let (db, store) = common::setup().await?;
    let jobs = JobRepository::new(db.clone());
    LimitRepository::new(db.clone()).set(Limit::queue("other", 1)).await?;

    for _ in 0..5 {
        common::submit(&jobs, "p", "q", "echo").await?;
    }

    let mut whip = Whip::new(WhipConfig::default(), db, store.clone());
    assert_eq!(whip.cycle(Utc::now()).await?, 5);
    assert_eq!(QueueManager::new(store).peek_all("p").await?.len(), 5);

    Ok(())
}

#[tokio::test]
async fn test_only_due_jobs_of_own_host() -> Result<(), Box<dyn Error>> {
    let (db, store) = common::setup().await?;
    let jobs = JobRepository::new(db.clone());

    let due = common::submit(&jobs, "p", "p", "echo").await?;
    let deferred = jobs
        .submit(NewJob::new("p", ExecutableUnit::new("echo")).with_wait_minutes(30))
        .await?;
    let elsewhere = jobs
        .submit(NewJob::new("p", ExecutableUnit::new("echo")).with_host("h2"))
        .await?;

    let mut whip = Whip::new(WhipConfig::default(), db, store);
    assert_eq!(whip.cycle(Utc::now()).await?, 1);

    assert_eq!(jobs.get(due.id).await?.status, JobStatus::Enqueued);
    assert_eq!(jobs.get(deferred.id).await?.status, JobStatus::New);
    assert_eq!(jobs.get(elsewhere.id).await?.status, JobStatus::New);

    assert_eq!(whip.cycle(Utc::now() + Duration::minutes(31)).await?, 1);
    assert_eq!(jobs.get(deferred.id).await?.status, JobStatus::Enqueued);

    Ok(())
}

#[tokio::test]
async fn test_oldest_execute_at_first() -> Result<(), Box<dyn Error>> {
    let (db, store) = common::setup().await?;
    let jobs = JobRepository::new(db.clone());
    LimitRepository::new(db.clone()).set(Limit::pool("p", 1)).await?;

    let newer = common::submit(&jobs, "p", "p", "echo").await?;
    let older = common::submit(&jobs, "p", "p", "echo").await?;
    jobs.finish(older.id, JobStatus::Restart, Some(Utc::now() - Duration::minutes(5)))
        .await?;

    let mut whip = Whip::new(WhipConfig::default(), db, store);
    whip.cycle(Utc::now()).await?;

    assert_eq!(jobs.get(older.id).await?.status, JobStatus::Enqueued);
    assert_eq!(jobs.get(newer.id).await?.status, JobStatus::New);

    Ok(())
}

#[tokio::test]
async fn test_job_is_enqueued_before_pool_can_pop_it() -> Result<(), Box<dyn Error>> {
    let (db, memory) = common::setup().await?;
    let jobs = JobRepository::new(db.clone());
    let store = StatusAtPush::new(memory, jobs.clone());

    let job = common::submit(&jobs, "p", "p", "echo").await?;

    let mut whip = Whip::new(WhipConfig::default(), db, store.clone());
    assert_eq!(whip.cycle(Utc::now()).await?, 1);
    assert_eq!(store.seen(), vec![(job.id, Some(JobStatus::Enqueued))]);

    // A workhorse started for the popped id right away runs the job.
    let popped = QueueManager::new(store)
        .pop("p", std::time::Duration::ZERO)
        .await?;
    assert_eq!(popped, Some(job.id));

    let workhorse = Workhorse::new(jobs.clone(), common::registry(), ExecEnv::default(), "pool-1");
    assert_eq!(workhorse.run(job.id).await?, WorkhorseOutcome::Ended);
    assert_eq!(jobs.get(job.id).await?.status, JobStatus::Ended);

    Ok(())
}
