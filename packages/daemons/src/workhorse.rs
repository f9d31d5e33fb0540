//! Execution of a single job.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use db::repositories::JobRepository;
use paddock_core::{Job, JobId, JobOwner, JobStatus};
use ulid::Ulid;

use crate::{DaemonError, ExecEnv, HandlerRegistry, JobContext, JobError};

/// What became of the job a workhorse was given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkhorseOutcome {
    /// The job reached ENDED.
    Ended,
    /// The job asked to run again, no earlier than `execute_at` if set.
    Restarted { execute_at: Option<DateTime<Utc>> },
    /// The id was stale or duplicated: the job was missing or not ENQUEUED.
    Skipped,
}

/// Runs exactly one job in the current process.
pub struct Workhorse {
    jobs: JobRepository,
    handlers: Arc<HandlerRegistry>,
    defaults: ExecEnv,
    pool_instance_id: String,
    instance_id: String,
}

impl Workhorse {
    pub fn new(
        jobs: JobRepository,
        handlers: Arc<HandlerRegistry>,
        defaults: ExecEnv,
        pool_instance_id: impl Into<String>,
    ) -> Self {
        Self {
            jobs,
            handlers,
            defaults,
            pool_instance_id: pool_instance_id.into(),
            instance_id: Ulid::new().to_string(),
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Claim and run `job_id`, then write its terminal status.
    ///
    /// A handler returning [`JobError::Failed`] still gets ENDED written
    /// before the failure is returned. A panicking handler gets no write at
    /// all; the job stays IN_PROGRESS until the watchdog reclaims it.
    pub async fn run(&self, job_id: JobId) -> Result<WorkhorseOutcome, DaemonError> {
        let Some(job) = self.jobs.find(job_id).await? else {
            tracing::warn!("Job #{} not found, skipping", job_id);
            return Ok(WorkhorseOutcome::Skipped);
        };
        if !job.status.can_transition_to(JobStatus::InProgress) {
            tracing::warn!("Job #{} is {}, not enqueued, skipping", job_id, job.status);
            return Ok(WorkhorseOutcome::Skipped);
        }

        let owner = JobOwner {
            pool_instance_id: self.pool_instance_id.clone(),
            worker_instance_id: self.instance_id.clone(),
            worker_process_id: std::process::id(),
        };
        let job = self.jobs.claim(job_id, &owner).await?;
        tracing::info!(
            job_id = %job_id,
            pool = %job.pool,
            worker = %self.instance_id,
            "Workhorse started job #{}",
            job_id
        );

        let unit = job.executable_unit()?;
        let handler = self
            .handlers
            .get(&unit.handler)
            .ok_or_else(|| DaemonError::UnknownHandler(unit.handler.clone()))?;
        let env = ExecEnv::resolve(&unit, &self.defaults);
        let ctx = JobContext::new(job, unit.params(), env, self.jobs.clone());

        let result = handler.run(ctx.clone()).await;
        let outcome = self.settle(job_id, result).await;

        let output = ctx.output();
        if !output.is_empty() {
            tracing::info!("Got output for job #{}: \n{}", job_id, output);
        }
        outcome
    }

    /// Write the terminal status for a finished handler run.
    async fn settle(
        &self,
        job_id: JobId,
        result: Result<(), JobError>,
    ) -> Result<WorkhorseOutcome, DaemonError> {
        match result {
            Ok(()) => {
                self.jobs.finish(job_id, JobStatus::Ended, None).await?;
                tracing::info!("Job #{} ended", job_id);
                Ok(WorkhorseOutcome::Ended)
            }
            Err(JobError::Restart { wait_minutes }) => {
                let execute_at = Job::deferred_until(Utc::now(), wait_minutes);
                self.jobs
                    .finish(job_id, JobStatus::Restart, execute_at)
                    .await?;
                tracing::info!("Job #{} restarted (wait: {:?} min)", job_id, wait_minutes);
                Ok(WorkhorseOutcome::Restarted { execute_at })
            }
            Err(JobError::Failed(reason)) => {
                self.jobs.finish(job_id, JobStatus::Ended, None).await?;
                tracing::error!("Job #{} failed: {}", job_id, reason);
                Err(DaemonError::JobFailed { job_id, reason })
            }
        }
    }
}
