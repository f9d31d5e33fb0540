//! Job repository for CRUD operations.

use chrono::{DateTime, Utc};
use paddock_core::{Job, JobId, JobOwner, JobStatus, NewJob};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{Database, DbError};

/// Repository for job persistence operations.
#[derive(Clone)]
pub struct JobRepository {
    db: Database,
}

/// Stored shape of a job. Timestamps are epoch milliseconds so that range
/// conditions compare numbers.
#[derive(Debug, Serialize, Deserialize)]
struct JobRecord {
    job_id: i64,
    pool: String,
    queue: String,
    host: String,
    func_call: String,
    status: JobStatus,
    #[serde(default)]
    pool_instance_id: Option<String>,
    #[serde(default)]
    worker_instance_id: Option<String>,
    #[serde(default)]
    worker_process_id: Option<u32>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    execute_at: DateTime<Utc>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    ended_at: Option<DateTime<Utc>>,
}

impl From<Job> for JobRecord {
    fn from(job: Job) -> Self {
        Self {
            job_id: job.id.0,
            pool: job.pool,
            queue: job.queue,
            host: job.host,
            func_call: job.func_call,
            status: job.status,
            pool_instance_id: job.pool_instance_id,
            worker_instance_id: job.worker_instance_id,
            worker_process_id: job.worker_process_id,
            created_at: job.created_at,
            execute_at: job.execute_at,
            updated_at: job.updated_at,
            ended_at: job.ended_at,
        }
    }
}

impl From<JobRecord> for Job {
    fn from(record: JobRecord) -> Self {
        Self {
            id: JobId(record.job_id),
            pool: record.pool,
            queue: record.queue,
            host: record.host,
            func_call: record.func_call,
            status: record.status,
            pool_instance_id: record.pool_instance_id,
            worker_instance_id: record.worker_instance_id,
            worker_process_id: record.worker_process_id,
            created_at: record.created_at,
            execute_at: record.execute_at,
            updated_at: record.updated_at,
            ended_at: record.ended_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Counter {
    seq: i64,
}

/// Filter options for listing jobs.
#[derive(Debug, Default, Clone)]
pub struct JobFilter {
    pub pool: Option<String>,
    pub queue: Option<String>,
    pub host: Option<String>,
    pub status: Option<JobStatus>,
    pub limit: Option<usize>,
}

fn millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

impl JobRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a job from a producer submission and return it with its id.
    pub async fn submit(&self, new_job: NewJob) -> Result<Job, DbError> {
        let id = self.next_id().await?;
        let job = new_job.into_job(id, Utc::now())?;
        self.insert(job).await
    }

    /// Insert a fully built job record.
    pub async fn insert(&self, job: Job) -> Result<Job, DbError> {
        let id = job.id;
        let record: Option<JobRecord> = self
            .db
            .create(("job", id.0))
            .content(JobRecord::from(job))
            .await?;

        let job: Job = record
            .map(Job::from)
            .ok_or_else(|| DbError::Query("Failed to create job".into()))?;

        tracing::debug!(job_id = %job.id, pool = %job.pool, queue = %job.queue, "Job created");
        Ok(job)
    }

    async fn next_id(&self) -> Result<JobId, DbError> {
        let mut response = self
            .db
            .query("UPSERT counter:job SET seq = (seq ?? 0) + 1 RETURN AFTER")
            .await?;

        let counter: Option<Counter> = response.take(0)?;
        counter
            .map(|c| JobId(c.seq))
            .ok_or_else(|| DbError::Query("Failed to allocate job id".into()))
    }

    /// Get a job by ID.
    pub async fn get(&self, id: JobId) -> Result<Job, DbError> {
        self.find(id)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("Job not found: {}", id)))
    }

    /// Get a job by ID, or `None` if it does not exist.
    pub async fn find(&self, id: JobId) -> Result<Option<Job>, DbError> {
        let record: Option<JobRecord> = self.db.select(("job", id.0)).await?;
        Ok(record.map(Job::from))
    }

    /// List jobs with optional filtering, oldest first.
    pub async fn list(&self, filter: JobFilter) -> Result<Vec<Job>, DbError> {
        let mut conditions = Vec::new();
        let mut bindings: Vec<(&str, Value)> = Vec::new();

        if let Some(pool) = filter.pool {
            conditions.push("pool = $pool");
            bindings.push(("pool", json!(pool)));
        }

        if let Some(queue) = filter.queue {
            conditions.push("queue = $queue");
            bindings.push(("queue", json!(queue)));
        }

        if let Some(host) = filter.host {
            conditions.push("host = $host");
            bindings.push(("host", json!(host)));
        }

        if let Some(status) = filter.status {
            conditions.push("status = $status");
            bindings.push(("status", json!(status)));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let limit_clause = filter
            .limit
            .map(|l| format!("LIMIT {}", l))
            .unwrap_or_default();

        let query = format!(
            "SELECT * FROM job {} ORDER BY job_id ASC {}",
            where_clause, limit_clause
        );

        let mut request = self.db.query(&query);
        for (name, value) in bindings {
            request = request.bind((name, value));
        }

        let mut response = request.await?;
        let records: Vec<JobRecord> = response.take(0)?;

        Ok(records.into_iter().map(Job::from).collect())
    }

    /// Jobs on `host` that the dispatcher may admit at `now`, oldest
    /// `execute_at` first. `None` returns every ready job.
    pub async fn ready_for_host(
        &self,
        host: &str,
        now: DateTime<Utc>,
        limit: Option<usize>,
    ) -> Result<Vec<Job>, DbError> {
        let mut sql = String::from(
            r#"
            SELECT * FROM job
            WHERE host = $host
                AND status IN $statuses
                AND execute_at <= $now
            ORDER BY execute_at ASC, job_id ASC
            "#,
        );
        if limit.is_some() {
            sql.push_str(" LIMIT $limit");
        }

        let mut request = self
            .db
            .query(sql)
            .bind(("host", host.to_string()))
            .bind(("statuses", json!(JobStatus::READY)))
            .bind(("now", millis(now)));
        if let Some(limit) = limit {
            request = request.bind(("limit", i64::try_from(limit).unwrap_or(i64::MAX)));
        }

        let mut response = request.await?;
        let records: Vec<JobRecord> = response.take(0)?;
        Ok(records.into_iter().map(Job::from).collect())
    }

    /// All jobs holding a concurrency slot, across every host.
    pub async fn active(&self) -> Result<Vec<Job>, DbError> {
        let mut response = self
            .db
            .query("SELECT * FROM job WHERE status IN $statuses")
            .bind(("statuses", json!(JobStatus::ACTIVE)))
            .await?;

        let records: Vec<JobRecord> = response.take(0)?;
        Ok(records.into_iter().map(Job::from).collect())
    }

    /// IN_PROGRESS jobs on `host` not saved since `before`.
    pub async fn stale_in_progress(
        &self,
        host: &str,
        before: DateTime<Utc>,
    ) -> Result<Vec<Job>, DbError> {
        let mut response = self
            .db
            .query(
                r#"
                SELECT * FROM job
                WHERE host = $host
                    AND status = $status
                    AND (updated_at = NONE OR updated_at = NULL OR updated_at < $before)
                ORDER BY job_id ASC
                "#,
            )
            .bind(("host", host.to_string()))
            .bind(("status", json!(JobStatus::InProgress)))
            .bind(("before", millis(before)))
            .await?;

        let records: Vec<JobRecord> = response.take(0)?;
        Ok(records.into_iter().map(Job::from).collect())
    }

    /// Write a new status. Reaching ENDED also stamps `ended_at`.
    pub async fn set_status(&self, id: JobId, status: JobStatus) -> Result<Job, DbError> {
        let mut fields = json!({ "status": status });
        if status == JobStatus::Ended {
            fields["ended_at"] = json!(millis(Utc::now()));
        }
        self.merge(id, fields).await
    }

    /// Record ownership and move the job to IN_PROGRESS.
    pub async fn claim(&self, id: JobId, owner: &JobOwner) -> Result<Job, DbError> {
        self.merge(
            id,
            json!({
                "status": JobStatus::InProgress,
                "pool_instance_id": owner.pool_instance_id,
                "worker_instance_id": owner.worker_instance_id,
                "worker_process_id": owner.worker_process_id,
            }),
        )
        .await
    }

    /// Write the outcome of an execution, optionally deferring the next run.
    pub async fn finish(
        &self,
        id: JobId,
        status: JobStatus,
        execute_at: Option<DateTime<Utc>>,
    ) -> Result<Job, DbError> {
        let mut fields = json!({ "status": status });
        if status == JobStatus::Ended {
            fields["ended_at"] = json!(millis(Utc::now()));
        }
        if let Some(execute_at) = execute_at {
            fields["execute_at"] = json!(millis(execute_at));
        }
        self.merge(id, fields).await
    }

    /// Bump `updated_at` only.
    pub async fn touch(&self, id: JobId) -> Result<Job, DbError> {
        self.merge(id, json!({})).await
    }

    /// Move a job to other routing and status.
    pub async fn reroute(
        &self,
        id: JobId,
        pool: &str,
        queue: &str,
        host: &str,
        status: JobStatus,
    ) -> Result<Job, DbError> {
        self.merge(
            id,
            json!({
                "pool": pool,
                "queue": queue,
                "host": host,
                "status": status,
            }),
        )
        .await
    }

    /// Delete jobs whose last save is older than `cutoff`. Returns the number
    /// of deleted jobs.
    pub async fn delete_updated_before(&self, cutoff: DateTime<Utc>) -> Result<usize, DbError> {
        let mut response = self
            .db
            .query("DELETE job WHERE updated_at < $cutoff RETURN BEFORE")
            .bind(("cutoff", millis(cutoff)))
            .await?;

        let deleted: Vec<JobRecord> = response.take(0)?;
        Ok(deleted.len())
    }

    /// Partial update that always bumps `updated_at`.
    async fn merge(&self, id: JobId, mut fields: Value) -> Result<Job, DbError> {
        fields["updated_at"] = json!(millis(Utc::now()));

        let record: Option<JobRecord> = self.db.update(("job", id.0)).merge(fields).await?;

        record
            .map(Job::from)
            .ok_or_else(|| DbError::NotFound(format!("Job not found: {}", id)))
    }
}
