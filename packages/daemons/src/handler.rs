//! Job handler trait and registry.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};

use db::repositories::JobRepository;
use paddock_core::{Job, JobId, JobParams};
use serde_json::Value;
use thiserror::Error;
use tokio::process::Command;

use crate::ExecEnv;

/// How a handler run ended, other than normally.
#[derive(Debug, Error)]
pub enum JobError {
    /// Control flow, not a failure: run the job again later.
    #[error("Restart requested")]
    Restart { wait_minutes: Option<u64> },
    #[error("{0}")]
    Failed(String),
}

impl JobError {
    /// Request an immediate restart.
    pub fn restart() -> Self {
        Self::Restart { wait_minutes: None }
    }

    /// Request a restart no earlier than `minutes` from now.
    pub fn restart_after(minutes: u64) -> Self {
        Self::Restart {
            wait_minutes: Some(minutes),
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }
}

/// Result type for job handlers.
pub type HandlerResult = Result<(), JobError>;

/// Future type for async job handlers.
pub type HandlerFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send>>;

/// Trait for job handlers.
///
/// Handlers are registered under a stable name at process start; jobs store
/// that name, never a code location.
pub trait JobHandler: Send + Sync + 'static {
    /// The name jobs refer to this handler by.
    fn name(&self) -> &str;

    /// Run one job.
    fn run(&self, ctx: JobContext) -> HandlerFuture;
}

/// Registry for job handlers.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler under its name.
    pub fn register<H: JobHandler>(&mut self, handler: H) {
        let name = handler.name().to_string();
        self.handlers.insert(name, Arc::new(handler));
    }

    /// Get a handler by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(name).cloned()
    }

    /// Check if a handler exists for a name.
    pub fn has_handler(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// List all registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

/// A simple function-based job handler.
pub struct FnHandler<F>
where
    F: Fn(JobContext) -> HandlerFuture + Send + Sync + 'static,
{
    name: String,
    handler: F,
}

impl<F> FnHandler<F>
where
    F: Fn(JobContext) -> HandlerFuture + Send + Sync + 'static,
{
    /// Create a new function-based handler.
    pub fn new(name: impl Into<String>, handler: F) -> Self {
        Self {
            name: name.into(),
            handler,
        }
    }
}

impl<F> JobHandler for FnHandler<F>
where
    F: Fn(JobContext) -> HandlerFuture + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, ctx: JobContext) -> HandlerFuture {
        (self.handler)(ctx)
    }
}

/// Everything a handler sees of the job it runs.
///
/// Cloning is cheap; clones share the output buffer.
#[derive(Clone)]
pub struct JobContext {
    job: Arc<Job>,
    params: Arc<JobParams>,
    env: Arc<ExecEnv>,
    output: Arc<Mutex<String>>,
    jobs: JobRepository,
}

impl JobContext {
    pub fn new(job: Job, params: JobParams, env: ExecEnv, jobs: JobRepository) -> Self {
        Self {
            job: Arc::new(job),
            params: Arc::new(params),
            env: Arc::new(env),
            output: Arc::new(Mutex::new(String::new())),
            jobs,
        }
    }

    pub fn job(&self) -> &Job {
        &self.job
    }

    pub fn job_id(&self) -> JobId {
        self.job.id
    }

    pub fn params(&self) -> &JobParams {
        &self.params
    }

    /// Positional argument `index`.
    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.params.args.get(index)
    }

    /// Keyword argument `name`.
    pub fn kwarg(&self, name: &str) -> Option<&Value> {
        self.params.kwargs.get(name)
    }

    pub fn env(&self) -> &ExecEnv {
        &self.env
    }

    /// Append a line to the captured output of the job.
    pub fn log(&self, line: impl AsRef<str>) {
        let mut output = self.output.lock().unwrap_or_else(PoisonError::into_inner);
        output.push_str(line.as_ref());
        output.push('\n');
    }

    /// Everything captured so far.
    pub fn output(&self) -> String {
        self.output
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Heartbeat: mark the job as recently alive.
    pub async fn tick(&self) -> HandlerResult {
        self.jobs
            .touch(self.job.id)
            .await
            .map(|_| ())
            .map_err(|e| JobError::failed(format!("Heartbeat failed: {e}")))
    }

    /// A command with the job's execution environment applied.
    pub fn command(&self, program: impl AsRef<std::ffi::OsStr>) -> Command {
        let mut command = Command::new(program);
        self.env.apply(&mut command);
        command
    }

    /// Run a command to completion, capturing its stdout and stderr.
    pub async fn run_command<I, A>(&self, program: &str, args: I) -> Result<ExitStatus, JobError>
    where
        I: IntoIterator<Item = A>,
        A: AsRef<std::ffi::OsStr>,
    {
        let output = self
            .command(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| JobError::failed(format!("Failed to run {program}: {e}")))?;

        for stream in [&output.stdout, &output.stderr] {
            if !stream.is_empty() {
                let text = String::from_utf8_lossy(stream);
                self.log(text.trim_end_matches('\n'));
            }
        }
        Ok(output.status)
    }
}
