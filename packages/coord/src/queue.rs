//! Per-pool dispatch queues of job ids.

use std::time::Duration;

use paddock_core::JobId;

use crate::{CoordError, CoordinationStore, KEY_PREFIX};

/// Typed access to the dispatch queue of each pool.
///
/// Queues carry job ids only; the job store stays authoritative for
/// everything else.
#[derive(Clone)]
pub struct QueueManager<S> {
    store: S,
}

impl<S: CoordinationStore> QueueManager<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Store key of the dispatch queue for `pool`.
    pub fn key(pool: &str) -> String {
        format!("{KEY_PREFIX}:to_execute:{pool}")
    }

    /// Insert a job id. New work goes to the head; `to_tail` returns work
    /// that was popped but never dispatched, so it is delivered next.
    pub async fn push(&self, pool: &str, job_id: JobId, to_tail: bool) -> Result<(), CoordError> {
        let key = Self::key(pool);
        let value = job_id.to_string();
        if to_tail {
            self.store.push_tail(&key, &value).await
        } else {
            self.store.push_head(&key, &value).await
        }
    }

    /// Blocking pop with a bounded wait. `None` means the wait timed out.
    pub async fn pop(&self, pool: &str, timeout: Duration) -> Result<Option<JobId>, CoordError> {
        match self.store.pop_tail(&Self::key(pool), timeout).await? {
            Some(value) => Ok(Some(JobId::parse(&value)?)),
            None => Ok(None),
        }
    }

    /// Queued ids in delivery order, without removing them.
    pub async fn peek_all(&self, pool: &str) -> Result<Vec<JobId>, CoordError> {
        let values = self.store.range(&Self::key(pool)).await?;
        let mut ids = values
            .iter()
            .map(|value| JobId::parse(value))
            .collect::<Result<Vec<_>, _>>()?;
        ids.reverse();
        Ok(ids)
    }
}
