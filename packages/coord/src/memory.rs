//! In-process coordination store.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

use crate::{CoordError, CoordinationStore};

/// Coordination store kept in process memory.
///
/// Clones share the same state. Used by tests and single-process runs.
#[derive(Clone, Default)]
pub struct MemoryCoordination {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    state: Mutex<State>,
    pushed: Notify,
}

#[derive(Default)]
struct State {
    lists: HashMap<String, VecDeque<String>>,
    hashes: HashMap<String, HashMap<String, String>>,
}

impl MemoryCoordination {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn try_pop(&self, key: &str) -> Option<String> {
        let mut state = self.state();
        let list = state.lists.get_mut(key)?;
        let value = list.pop_back();
        if list.is_empty() {
            state.lists.remove(key);
        }
        value
    }
}

/// Match `key` against a pattern where `*` matches any run of characters.
pub(crate) fn glob_match(pattern: &str, key: &str) -> bool {
    let mut parts = pattern.split('*');
    let Some(first) = parts.next() else {
        return key.is_empty();
    };
    let Some(mut rest) = key.strip_prefix(first) else {
        return false;
    };

    let parts: Vec<&str> = parts.collect();
    let Some((last, middle)) = parts.split_last() else {
        return rest.is_empty();
    };

    for part in middle {
        match rest.find(part) {
            Some(index) => rest = &rest[index + part.len()..],
            None => return false,
        }
    }
    rest.len() >= last.len() && rest.ends_with(last)
}

impl CoordinationStore for MemoryCoordination {
    async fn push_head(&self, key: &str, value: &str) -> Result<(), CoordError> {
        self.state()
            .lists
            .entry(key.to_string())
            .or_default()
            .push_front(value.to_string());
        self.inner.pushed.notify_waiters();
        Ok(())
    }

    async fn push_tail(&self, key: &str, value: &str) -> Result<(), CoordError> {
        self.state()
            .lists
            .entry(key.to_string())
            .or_default()
            .push_back(value.to_string());
        self.inner.pushed.notify_waiters();
        Ok(())
    }

    async fn pop_tail(&self, key: &str, timeout: Duration) -> Result<Option<String>, CoordError> {
        let deadline = Instant::now() + timeout;
        loop {
            // Register interest before checking so a concurrent push is not missed.
            let pushed = self.inner.pushed.notified();
            tokio::pin!(pushed);
            pushed.as_mut().enable();

            if let Some(value) = self.try_pop(key) {
                return Ok(Some(value));
            }
            if tokio::time::timeout_at(deadline, pushed).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn range(&self, key: &str) -> Result<Vec<String>, CoordError> {
        Ok(self
            .state()
            .lists
            .get(key)
            .map(|list| list.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, CoordError> {
        Ok(self
            .state()
            .hashes
            .get(key)
            .and_then(|fields| fields.get(field).cloned()))
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), CoordError> {
        self.state()
            .hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CoordError> {
        let mut state = self.state();
        state.lists.remove(key);
        state.hashes.remove(key);
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, CoordError> {
        let state = self.state();
        let mut keys: Vec<String> = state
            .lists
            .keys()
            .chain(state.hashes.keys())
            .filter(|key| glob_match(pattern, key))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_patterns() {
        assert!(glob_match("paddock:pool:*", "paddock:pool:p:01H"));
        assert!(glob_match("paddock:pool:p:*", "paddock:pool:p:01H"));
        assert!(!glob_match("paddock:pool:p:*", "paddock:pool:px"));
        assert!(glob_match("*", "anything"));
        assert!(glob_match("a*b*c", "a-b-c"));
        assert!(!glob_match("a*b*c", "a-c"));
        assert!(glob_match("exact", "exact"));
        assert!(!glob_match("exact", "exactly"));
        assert!(!glob_match("ab*ba", "aba"));
    }

    #[tokio::test]
    async fn head_pushes_pop_in_fifo_order() {
        let store = MemoryCoordination::new();
        store.push_head("k", "1").await.unwrap();
        store.push_head("k", "2").await.unwrap();
        store.push_tail("k", "0").await.unwrap();

        assert_eq!(store.range("k").await.unwrap(), vec!["2", "1", "0"]);
        assert_eq!(store.pop_tail("k", Duration::ZERO).await.unwrap().as_deref(), Some("0"));
        assert_eq!(store.pop_tail("k", Duration::ZERO).await.unwrap().as_deref(), Some("1"));
        assert_eq!(store.pop_tail("k", Duration::ZERO).await.unwrap().as_deref(), Some("2"));
        assert!(store.keys("*").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn pop_times_out_empty() {
        let store = MemoryCoordination::new();
        let started = Instant::now();
        let popped = store.pop_tail("k", Duration::from_millis(100)).await.unwrap();
        assert!(popped.is_none());
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn blocked_pop_wakes_on_push() {
        let store = MemoryCoordination::new();
        let producer = store.clone();

        let (popped, pushed) = tokio::join!(
            store.pop_tail("k", Duration::from_secs(5)),
            async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                producer.push_head("k", "42").await
            }
        );

        pushed.unwrap();
        assert_eq!(popped.unwrap().as_deref(), Some("42"));
    }
}
