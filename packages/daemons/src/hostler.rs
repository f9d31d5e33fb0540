//! Watchdog for jobs orphaned by a dead workhorse.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use db::repositories::JobRepository;
use paddock_core::{HOST_DEFAULT, Job, JobId, JobStatus};

use crate::{DaemonError, ProcessProbe};

/// Watchdog settings.
#[derive(Debug, Clone)]
pub struct HostlerConfig {
    pub host: String,
    pub check_time: Duration,
    /// Jobs not saved for this long are liveness-checked, at most once per
    /// window each.
    pub stale_after: Duration,
}

impl Default for HostlerConfig {
    fn default() -> Self {
        Self {
            host: HOST_DEFAULT.to_string(),
            check_time: Duration::from_secs(5),
            stale_after: Duration::from_secs(5 * 60),
        }
    }
}

/// Reclaims IN_PROGRESS jobs whose workhorse is gone.
pub struct Hostler<P> {
    config: HostlerConfig,
    jobs: JobRepository,
    probe: P,
    already_checked: HashMap<JobId, DateTime<Utc>>,
}

impl<P: ProcessProbe> Hostler<P> {
    pub fn new(config: HostlerConfig, jobs: JobRepository, probe: P) -> Self {
        Self {
            config,
            jobs,
            probe,
            already_checked: HashMap::new(),
        }
    }

    fn is_alive(&self, job: &Job) -> bool {
        job.worker_process_id
            .is_some_and(|pid| self.probe.is_workhorse(pid))
    }

    /// One scan at `now`. Returns the ids flipped to RESTART.
    pub async fn cycle(&mut self, now: DateTime<Utc>) -> Result<Vec<JobId>, DaemonError> {
        let stale_before = chrono::Duration::from_std(self.config.stale_after)
            .ok()
            .and_then(|window| now.checked_sub_signed(window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let mut restarted = Vec::new();
        for job in self
            .jobs
            .stale_in_progress(&self.config.host, stale_before)
            .await?
        {
            let checked_recently = self
                .already_checked
                .get(&job.id)
                .is_some_and(|at| *at >= stale_before);
            if checked_recently {
                continue;
            }

            if !self.is_alive(&job) {
                self.jobs.set_status(job.id, JobStatus::Restart).await?;
                tracing::info!(
                    "Job #{} restarted: workhorse {:?} is gone",
                    job.id,
                    job.worker_process_id
                );
                restarted.push(job.id);
            }
            self.already_checked.insert(job.id, now);
        }

        self.already_checked.retain(|_, at| *at >= stale_before);
        Ok(restarted)
    }

    /// Scan forever at the configured cadence.
    pub async fn run(&mut self) -> Result<(), DaemonError> {
        tracing::info!("Hostler started on host \"{}\"", self.config.host);
        loop {
            self.cycle(Utc::now()).await?;
            tokio::time::sleep(self.config.check_time).await;
        }
    }
}
