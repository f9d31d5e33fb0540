//! Backend contract for the coordination store.

use std::future::Future;
use std::time::Duration;

use crate::CoordError;

/// Key/value store with lists and per-key field maps.
///
/// Lists have a head and a tail; [`pop_tail`](Self::pop_tail) removes from
/// the tail, so values pushed at the head are delivered in FIFO order.
/// Every operation touches a single key.
pub trait CoordinationStore: Clone + Send + Sync + 'static {
    fn push_head(&self, key: &str, value: &str) -> impl Future<Output = Result<(), CoordError>> + Send;

    fn push_tail(&self, key: &str, value: &str) -> impl Future<Output = Result<(), CoordError>> + Send;

    /// Remove and return the tail value, waiting up to `timeout` for one to
    /// arrive. A timeout yields `Ok(None)`.
    fn pop_tail(
        &self,
        key: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<Option<String>, CoordError>> + Send;

    /// All values from head to tail.
    fn range(&self, key: &str) -> impl Future<Output = Result<Vec<String>, CoordError>> + Send;

    fn hget(
        &self,
        key: &str,
        field: &str,
    ) -> impl Future<Output = Result<Option<String>, CoordError>> + Send;

    fn hset(
        &self,
        key: &str,
        field: &str,
        value: &str,
    ) -> impl Future<Output = Result<(), CoordError>> + Send;

    fn delete(&self, key: &str) -> impl Future<Output = Result<(), CoordError>> + Send;

    /// Keys matching a glob pattern where `*` matches any run of characters.
    fn keys(&self, pattern: &str) -> impl Future<Output = Result<Vec<String>, CoordError>> + Send;
}
