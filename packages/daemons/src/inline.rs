//! Running a stored job in the current process.

use std::sync::Arc;

use chrono::Utc;
use db::repositories::JobRepository;
use paddock_core::{JobId, JobStatus};

use crate::{DaemonError, ExecEnv, HandlerRegistry, Workhorse, WorkhorseOutcome};

pub const DUMMY_POOL: &str = "dummy_pool";
pub const DUMMY_QUEUE: &str = "dummy_queue";
pub const DUMMY_HOST: &str = "dummy_host";

/// Execute `job_id` here instead of through a pool.
///
/// The job is moved to routing no daemon serves, so nothing else picks it
/// up, and restarts are served by sleeping until the requested time.
/// Returns whether the job reached ENDED; a missing job yields `false`.
pub async fn execute_inline(
    jobs: &JobRepository,
    handlers: Arc<HandlerRegistry>,
    defaults: ExecEnv,
    job_id: JobId,
) -> Result<bool, DaemonError> {
    if jobs.find(job_id).await?.is_none() {
        tracing::warn!("Job #{} not found", job_id);
        return Ok(false);
    }
    jobs.reroute(job_id, DUMMY_POOL, DUMMY_QUEUE, DUMMY_HOST, JobStatus::Enqueued)
        .await?;

    let workhorse = Workhorse::new(jobs.clone(), handlers, defaults, "inline");
    loop {
        match workhorse.run(job_id).await? {
            WorkhorseOutcome::Ended => return Ok(true),
            WorkhorseOutcome::Skipped => return Ok(false),
            WorkhorseOutcome::Restarted { execute_at } => {
                if let Some(wait) = execute_at.and_then(|at| (at - Utc::now()).to_std().ok()) {
                    tracing::info!("Job #{} restarts in {:?}", job_id, wait);
                    tokio::time::sleep(wait).await;
                }
                jobs.set_status(job_id, JobStatus::Enqueued).await?;
            }
        }
    }
}
