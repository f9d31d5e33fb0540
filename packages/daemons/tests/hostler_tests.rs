#![allow(clippy::disallowed_methods)]

mod common;

use std::error::Error;
use std::os::unix::process::CommandExt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{Duration, Utc};
use daemons::{Hostler, HostlerConfig, ProcFsProbe, ProcessProbe, WORKHORSE_PROCESS_NAME};
use db::repositories::JobRepository;
use paddock_core::{Job, JobOwner, JobStatus};

async fn in_progress(jobs: &JobRepository, pid: u32) -> Result<Job, Box<dyn Error>> {
    let job = common::submit(jobs, "p", "p", "echo").await?;
    jobs.set_status(job.id, JobStatus::Enqueued).await?;
    let owner = JobOwner {
        pool_instance_id: "pool-1".into(),
        worker_instance_id: "worker-1".into(),
        worker_process_id: pid,
    };
    Ok(jobs.claim(job.id, &owner).await?)
}

fn exited_pid() -> u32 {
    let mut child = std::process::Command::new("true").spawn().unwrap();
    let pid = child.id();
    child.wait().unwrap();
    pid
}

/// Probe with a fixed answer that counts how often it is asked.
#[derive(Clone, Default)]
struct CountingProbe {
    alive: bool,
    calls: Arc<AtomicUsize>,
}

impl ProcessProbe for CountingProbe {
    fn is_workhorse(&self, _pid: u32) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.alive
    }
}

#[tokio::test]
async fn test_dead_worker_is_restarted() -> Result<(), Box<dyn Error>> {
    let (db, _) = common::setup().await?;
    let jobs = JobRepository::new(db);
    let job = in_progress(&jobs, exited_pid()).await?;

    let mut hostler = Hostler::new(HostlerConfig::default(), jobs.clone(), ProcFsProbe::new());

    // Not stale yet.
    assert!(hostler.cycle(Utc::now()).await?.is_empty());
    assert_eq!(jobs.get(job.id).await?.status, JobStatus::InProgress);

    let restarted = hostler.cycle(Utc::now() + Duration::minutes(6)).await?;
    assert_eq!(restarted, vec![job.id]);
    assert_eq!(jobs.get(job.id).await?.status, JobStatus::Restart);

    Ok(())
}

#[tokio::test]
async fn test_live_workhorse_is_left_alone() -> Result<(), Box<dyn Error>> {
    let (db, _) = common::setup().await?;
    let jobs = JobRepository::new(db);

    let mut workhorse = std::process::Command::new("sleep")
        .arg0(WORKHORSE_PROCESS_NAME)
        .arg("30")
        .spawn()?;
    let mut impostor = std::process::Command::new("sleep").arg("30").spawn()?;

    let alive = in_progress(&jobs, workhorse.id()).await?;
    let recycled = in_progress(&jobs, impostor.id()).await?;

    let mut hostler = Hostler::new(HostlerConfig::default(), jobs.clone(), ProcFsProbe::new());
    let restarted = hostler.cycle(Utc::now() + Duration::minutes(6)).await?;

    workhorse.kill()?;
    impostor.kill()?;
    let _ = workhorse.wait();
    let _ = impostor.wait();

    assert_eq!(restarted, vec![recycled.id]);
    assert_eq!(jobs.get(alive.id).await?.status, JobStatus::InProgress);
    assert_eq!(jobs.get(recycled.id).await?.status, JobStatus::Restart);

    Ok(())
}

#[tokio::test]
async fn test_checks_once_per_staleness_window() -> Result<(), Box<dyn Error>> {
    let (db, _) = common::setup().await?;
    let jobs = JobRepository::new(db);
    in_progress(&jobs, 4242).await?;

    let probe = CountingProbe {
        alive: true,
        ..Default::default()
    };
    let mut hostler = Hostler::new(HostlerConfig::default(), jobs.clone(), probe.clone());

    let first = Utc::now() + Duration::minutes(6);
    hostler.cycle(first).await?;
    hostler.cycle(first + Duration::seconds(5)).await?;
    hostler.cycle(first + Duration::minutes(4)).await?;
    assert_eq!(probe.calls.load(Ordering::SeqCst), 1);

    hostler.cycle(first + Duration::minutes(6)).await?;
    assert_eq!(probe.calls.load(Ordering::SeqCst), 2);

    Ok(())
}

#[tokio::test]
async fn test_other_hosts_are_ignored() -> Result<(), Box<dyn Error>> {
    let (db, _) = common::setup().await?;
    let jobs = JobRepository::new(db);
    let job = in_progress(&jobs, exited_pid()).await?;

    let config = HostlerConfig {
        host: "h2".into(),
        ..HostlerConfig::default()
    };
    let mut hostler = Hostler::new(config, jobs.clone(), ProcFsProbe::new());
    assert!(hostler.cycle(Utc::now() + Duration::minutes(6)).await?.is_empty());
    assert_eq!(jobs.get(job.id).await?.status, JobStatus::InProgress);

    Ok(())
}
