#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use coord::MemoryCoordination;
use daemons::{
    FnHandler, HandlerFuture, HandlerRegistry, JobContext, JobError, Spawner,
};
use db::repositories::JobRepository;
use db::{Database, DbConfig, DbError};
use paddock_core::{ExecutableUnit, Job, JobId, NewJob};
use tokio::process::{Child, Command};

/// Fresh in-memory job store and coordination store.
pub async fn setup() -> Result<(Database, MemoryCoordination), DbError> {
    let db = db::init(&DbConfig::memory()).await?;
    Ok((db, MemoryCoordination::new()))
}

pub async fn submit(
    jobs: &JobRepository,
    pool: &str,
    queue: &str,
    handler: &str,
) -> Result<Job, DbError> {
    jobs.submit(NewJob::new(pool, ExecutableUnit::new(handler)).with_queue(queue))
        .await
}

/// Handlers used across the tests:
/// - `echo` logs its arguments
/// - `restart` asks for a restart after `kwargs.wait` minutes, if given
/// - `fail` returns a failure
pub fn registry() -> Arc<HandlerRegistry> {
    let mut handlers = HandlerRegistry::new();

    handlers.register(FnHandler::new("echo", |ctx: JobContext| -> HandlerFuture {
        Box::pin(async move {
            ctx.log(format!("echo {:?}", ctx.params().args));
            Ok(())
        })
    }));

    handlers.register(FnHandler::new("restart", |ctx: JobContext| -> HandlerFuture {
        let wait = ctx.kwarg("wait").and_then(|v| v.as_u64());
        Box::pin(async move {
            Err(JobError::Restart { wait_minutes: wait })
        })
    }));

    handlers.register(FnHandler::new("fail", |_ctx: JobContext| -> HandlerFuture {
        Box::pin(async move { Err(JobError::failed("Intentional failure")) })
    }));

    Arc::new(handlers)
}

/// Spawns `sleep <seconds>` in place of a workhorse and records pids.
#[derive(Clone, Default)]
pub struct SleepSpawner {
    pub seconds: u64,
    pub spawned: Arc<Mutex<Vec<(JobId, u32)>>>,
}

impl SleepSpawner {
    pub fn new(seconds: u64) -> Self {
        Self {
            seconds,
            spawned: Arc::default(),
        }
    }

    pub fn spawned(&self) -> Vec<(JobId, u32)> {
        self.spawned.lock().unwrap().clone()
    }
}

impl Spawner for SleepSpawner {
    fn spawn(&self, _pool: &str, _pool_instance_id: &str, job_id: JobId) -> std::io::Result<Child> {
        let child = Command::new("sleep").arg(self.seconds.to_string()).spawn()?;
        if let Some(pid) = child.id() {
            self.spawned.lock().unwrap().push((job_id, pid));
        }
        Ok(child)
    }
}

pub fn process_exists(pid: u32) -> bool {
    std::path::Path::new(&format!("/proc/{pid}")).exists()
}
