//! In-memory retry store.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use fintrack_core::{Result, RetryStore};

#[derive(Default)]
struct MemoryState {
    values: HashMap<String, String>,
    lists: HashMap<String, VecDeque<String>>,
}

/// Process-local [`RetryStore`]. Clones share the same state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    pushed: Arc<Notify>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a list, head first.
    pub async fn list(&self, queue: &str) -> Vec<String> {
        let state = self.state.lock().await;
        state
            .lists
            .get(queue)
            .map(|items| items.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of items in a list.
    pub async fn len(&self, queue: &str) -> usize {
        let state = self.state.lock().await;
        state.lists.get(queue).map_or(0, VecDeque::len)
    }

    async fn try_pop(&self, queue: &str) -> Option<String> {
        let mut state = self.state.lock().await;
        state.lists.get_mut(queue).and_then(VecDeque::pop_front)
    }
}

#[async_trait]
impl RetryStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let state = self.state.lock().await;
        Ok(state.values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.values.remove(key);
        Ok(())
    }

    async fn rpush(&self, queue: &str, value: &str) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            state
                .lists
                .entry(queue.to_string())
                .or_default()
                .push_back(value.to_string());
        }
        self.pushed.notify_waiters();
        Ok(())
    }

    async fn lpush(&self, queue: &str, value: &str) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            state
                .lists
                .entry(queue.to_string())
                .or_default()
                .push_front(value.to_string());
        }
        self.pushed.notify_waiters();
        Ok(())
    }

    async fn blpop(&self, queue: &str, timeout: Duration) -> Result<Option<String>> {
        let deadline = Instant::now() + timeout;
        loop {
            // Register interest before checking, so a push in between is not missed.
            let notified = self.pushed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(value) = self.try_pop(queue).await {
                return Ok(Some(value));
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(self.try_pop(queue).await);
            }
        }
    }
}
