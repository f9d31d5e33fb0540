//! Job domain types for units of work.

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::CoreError;

/// Host sentinel used when a job does not name a host.
pub const HOST_DEFAULT: &str = "default";

/// Store-assigned integer identifier of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub i64);

impl JobId {
    /// Parse a job ID from its queue representation.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        s.trim()
            .parse::<i64>()
            .map(Self)
            .map_err(|_| CoreError::InvalidJobId(s.to_string()))
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Current status of a job in its lifecycle.
///
/// ```text
/// NEW/RESTART --> ENQUEUED --> IN_PROGRESS --> ENDED
///                                  |
///                                  +--> RESTART
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for admission.
    #[default]
    New,
    /// Waiting for re-admission after a restart request or a watchdog reclaim.
    Restart,
    /// Admitted and pushed to its pool's dispatch queue.
    Enqueued,
    /// Owned by a running workhorse.
    InProgress,
    /// Finished.
    Ended,
}

impl JobStatus {
    /// Statuses the dispatcher admits from.
    pub const READY: [JobStatus; 2] = [JobStatus::New, JobStatus::Restart];

    /// Statuses that count against concurrency limits.
    pub const ACTIVE: [JobStatus; 2] = [JobStatus::Enqueued, JobStatus::InProgress];

    pub const ALL: [JobStatus; 5] = [
        JobStatus::New,
        JobStatus::Restart,
        JobStatus::Enqueued,
        JobStatus::InProgress,
        JobStatus::Ended,
    ];

    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Ended)
    }

    /// Check if the dispatcher may admit the job.
    pub fn is_ready(&self) -> bool {
        Self::READY.contains(self)
    }

    /// Check if the job occupies a concurrency slot.
    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }

    /// Check whether moving to `next` is an edge of the job state machine.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::New | JobStatus::Restart, JobStatus::Enqueued)
                | (JobStatus::Enqueued, JobStatus::InProgress)
                | (JobStatus::InProgress, JobStatus::Ended | JobStatus::Restart)
        )
    }

    /// Get the stored string for this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::New => "new",
            JobStatus::Restart => "restart",
            JobStatus::Enqueued => "enqueued",
            JobStatus::InProgress => "in_progress",
            JobStatus::Ended => "ended",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| CoreError::InvalidJobStatus(s.to_string()))
    }
}

/// Positional and keyword arguments of a job.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobParams {
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
}

/// Descriptor of the code a job runs.
///
/// `handler` is the key the unit was registered under in the workhorse's
/// handler registry. The optional fields override the pool's execution
/// environment for this job only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutableUnit {
    pub handler: String,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub kwargs: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sys_path: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venv_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venv_exclusive: Option<bool>,
}

impl ExecutableUnit {
    /// Create a unit that calls `handler` with no arguments.
    pub fn new(handler: impl Into<String>) -> Self {
        Self {
            handler: handler.into(),
            args: Vec::new(),
            kwargs: Map::new(),
            sys_path: None,
            venv_path: None,
            venv_exclusive: None,
        }
    }

    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    pub fn with_kwargs(mut self, kwargs: Map<String, Value>) -> Self {
        self.kwargs = kwargs;
        self
    }

    /// Prepend these directories to the lookup path of the job.
    pub fn with_sys_path(mut self, sys_path: Vec<String>) -> Self {
        self.sys_path = Some(sys_path);
        self
    }

    /// Activate an isolated environment for the job.
    ///
    /// The exclusivity flag is only meaningful together with a path, so it
    /// is recorded here and nowhere else.
    pub fn with_venv(mut self, venv_path: impl Into<String>, exclusive: Option<bool>) -> Self {
        self.venv_path = Some(venv_path.into());
        self.venv_exclusive = exclusive;
        self
    }

    /// Serialize to the document stored in the job row.
    pub fn to_document(&self) -> Result<String, CoreError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a stored document, rejecting malformed argument shapes.
    pub fn from_document(document: &str) -> Result<Self, CoreError> {
        let value: Value = serde_json::from_str(document)?;
        let Value::Object(fields) = &value else {
            return Err(CoreError::InvalidArguments(format!(
                "executable unit must be an object, got {value}"
            )));
        };
        if let Some(args) = fields.get("args")
            && !args.is_array()
        {
            return Err(CoreError::InvalidArguments(format!(
                "args {args} must be a list"
            )));
        }
        if let Some(kwargs) = fields.get("kwargs")
            && !kwargs.is_object()
        {
            return Err(CoreError::InvalidArguments(format!(
                "kwargs {kwargs} must be a mapping"
            )));
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Split off the call arguments.
    pub fn params(&self) -> JobParams {
        JobParams {
            args: self.args.clone(),
            kwargs: self.kwargs.clone(),
        }
    }
}

/// Ownership fields recorded while a workhorse runs a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOwner {
    pub pool_instance_id: String,
    pub worker_instance_id: String,
    pub worker_process_id: u32,
}

/// A job represents a unit of work to be executed by a pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Store-assigned identifier.
    pub id: JobId,
    /// Pool whose dispatch queue receives the job.
    pub pool: String,
    /// Queue within the pool, used for per-queue limits.
    pub queue: String,
    /// Partition key; only daemons configured for this host touch the job.
    pub host: String,
    /// Serialized [`ExecutableUnit`].
    pub func_call: String,
    /// Current status.
    pub status: JobStatus,
    pub pool_instance_id: Option<String>,
    pub worker_instance_id: Option<String>,
    pub worker_process_id: Option<u32>,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
    /// Earliest time the dispatcher may admit the job.
    pub execute_at: DateTime<Utc>,
    /// Bumped on every save.
    pub updated_at: Option<DateTime<Utc>>,
    /// When the job reached ENDED.
    pub ended_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Decode the executable unit stored with this job.
    pub fn executable_unit(&self) -> Result<ExecutableUnit, CoreError> {
        ExecutableUnit::from_document(&self.func_call)
    }

    /// Decode only the call arguments of this job.
    pub fn params(&self) -> Result<JobParams, CoreError> {
        Ok(self.executable_unit()?.params())
    }

    /// Ownership of a job in progress, if fully recorded.
    pub fn owner(&self) -> Option<JobOwner> {
        Some(JobOwner {
            pool_instance_id: self.pool_instance_id.clone()?,
            worker_instance_id: self.worker_instance_id.clone()?,
            worker_process_id: self.worker_process_id?,
        })
    }

    /// Time a deferred job becomes eligible, or `None` for no deferral.
    ///
    /// Waits past the representable range saturate at [`DateTime::MAX_UTC`].
    pub fn deferred_until(now: DateTime<Utc>, wait_minutes: Option<u64>) -> Option<DateTime<Utc>> {
        match wait_minutes {
            Some(minutes) if minutes > 0 => {
                let at = i64::try_from(minutes)
                    .ok()
                    .and_then(Duration::try_minutes)
                    .and_then(|wait| now.checked_add_signed(wait));
                Some(at.unwrap_or(DateTime::<Utc>::MAX_UTC))
            }
            _ => None,
        }
    }
}

/// Submission of a new job by a producer.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub pool: String,
    pub queue: Option<String>,
    pub host: Option<String>,
    pub unit: ExecutableUnit,
    pub status: Option<String>,
    pub wait_minutes: u64,
}

impl NewJob {
    /// Create a submission for `pool` running `unit`.
    pub fn new(pool: impl Into<String>, unit: ExecutableUnit) -> Self {
        Self {
            pool: pool.into(),
            queue: None,
            host: None,
            unit,
            status: None,
            wait_minutes: 0,
        }
    }

    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Request an initial status; unknown values fall back to NEW.
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Defer the first admission by this many minutes.
    pub fn with_wait_minutes(mut self, wait_minutes: u64) -> Self {
        self.wait_minutes = wait_minutes;
        self
    }

    /// Status the job is created with.
    pub fn initial_status(&self) -> JobStatus {
        self.status
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default()
    }

    /// Build the job record for a store-assigned id.
    pub fn into_job(self, id: JobId, now: DateTime<Utc>) -> Result<Job, CoreError> {
        let status = self.initial_status();
        let func_call = self.unit.to_document()?;
        let queue = self.queue.unwrap_or_else(|| self.pool.clone());
        let execute_at = Job::deferred_until(now, Some(self.wait_minutes)).unwrap_or(now);

        Ok(Job {
            id,
            pool: self.pool,
            queue,
            host: self.host.unwrap_or_else(|| HOST_DEFAULT.to_string()),
            func_call,
            status,
            pool_instance_id: None,
            worker_instance_id: None,
            worker_process_id: None,
            created_at: now,
            execute_at,
            updated_at: Some(now),
            ended_at: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_strings_round_trip() {
        for status in JobStatus::ALL {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!(matches!(
            "running".parse::<JobStatus>(),
            Err(CoreError::InvalidJobStatus(_))
        ));
    }

    #[test]
    fn state_machine_edges() {
        assert!(JobStatus::New.can_transition_to(JobStatus::Enqueued));
        assert!(JobStatus::Restart.can_transition_to(JobStatus::Enqueued));
        assert!(JobStatus::Enqueued.can_transition_to(JobStatus::InProgress));
        assert!(JobStatus::InProgress.can_transition_to(JobStatus::Ended));
        assert!(JobStatus::InProgress.can_transition_to(JobStatus::Restart));

        assert!(!JobStatus::New.can_transition_to(JobStatus::InProgress));
        assert!(!JobStatus::Ended.can_transition_to(JobStatus::Restart));
        assert!(!JobStatus::Enqueued.can_transition_to(JobStatus::Ended));
    }

    #[test]
    fn new_job_defaults() {
        let now = Utc::now();
        let job = NewJob::new("reports", ExecutableUnit::new("echo"))
            .into_job(JobId(1), now)
            .unwrap();

        assert_eq!(job.queue, "reports");
        assert_eq!(job.host, HOST_DEFAULT);
        assert_eq!(job.status, JobStatus::New);
        assert_eq!(job.execute_at, now);
        assert!(job.owner().is_none());
    }

    #[test]
    fn invalid_requested_status_falls_back_to_new() {
        let submission = NewJob::new("p", ExecutableUnit::new("echo")).with_status("bogus");
        assert_eq!(submission.initial_status(), JobStatus::New);

        let submission = NewJob::new("p", ExecutableUnit::new("echo")).with_status("enqueued");
        assert_eq!(submission.initial_status(), JobStatus::Enqueued);
    }

    #[test]
    fn wait_minutes_defers_execution() {
        let now = Utc::now();
        let job = NewJob::new("p", ExecutableUnit::new("echo"))
            .with_wait_minutes(10)
            .into_job(JobId(2), now)
            .unwrap();
        assert_eq!(job.execute_at, now + Duration::minutes(10));
        assert_eq!(Job::deferred_until(now, Some(0)), None);
        assert_eq!(Job::deferred_until(now, None), None);
    }

    #[test]
    fn huge_waits_saturate() {
        let now = Utc::now();
        assert_eq!(
            Job::deferred_until(now, Some(1_000_000_000_000)),
            Some(DateTime::<Utc>::MAX_UTC)
        );
        assert_eq!(Job::deferred_until(now, Some(u64::MAX)), Some(DateTime::<Utc>::MAX_UTC));

        let job = NewJob::new("p", ExecutableUnit::new("echo"))
            .with_wait_minutes(u64::MAX)
            .into_job(JobId(3), now)
            .unwrap();
        assert_eq!(job.execute_at, DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn arguments_survive_the_document() {
        let mut kwargs = Map::new();
        kwargs.insert("name".into(), json!("ünïcode"));
        kwargs.insert("nested".into(), json!({"a": [1, 2.5, null]}));
        let unit = ExecutableUnit::new("echo")
            .with_args(vec![json!(1), json!("two"), json!([3])])
            .with_kwargs(kwargs);

        let decoded = ExecutableUnit::from_document(&unit.to_document().unwrap()).unwrap();
        assert_eq!(decoded, unit);
    }

    #[test]
    fn malformed_argument_shapes_are_rejected() {
        let err = ExecutableUnit::from_document(r#"{"handler":"x","args":{"a":1}}"#).unwrap_err();
        assert!(matches!(err, CoreError::InvalidArguments(_)));

        let err = ExecutableUnit::from_document(r#"{"handler":"x","kwargs":[1]}"#).unwrap_err();
        assert!(matches!(err, CoreError::InvalidArguments(_)));

        let unit = ExecutableUnit::from_document(r#"{"handler":"x"}"#).unwrap();
        assert!(unit.args.is_empty());
        assert!(unit.kwargs.is_empty());
    }

    #[test]
    fn venv_exclusive_only_recorded_with_path() {
        let unit = ExecutableUnit::new("x").with_venv("/opt/env", Some(true));
        let doc: Value = serde_json::from_str(&unit.to_document().unwrap()).unwrap();
        assert_eq!(doc["venv_path"], json!("/opt/env"));
        assert_eq!(doc["venv_exclusive"], json!(true));

        let doc: Value =
            serde_json::from_str(&ExecutableUnit::new("x").to_document().unwrap()).unwrap();
        assert!(doc.get("venv_exclusive").is_none());
    }
}
