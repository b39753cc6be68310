//! In-memory `QueueStore` backend.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Notify;

use claimflow_storage::{QueueEntry, QueueStore, StorageError};

/// Visibility delay applied after a failed attempt: `error_count^4 + 3s`.
///
/// Superlinear on purpose: the not-found retry budget relies on late
/// attempts being far apart.
pub fn retry_backoff(error_count: i32) -> Duration {
    let n = u64::try_from(error_count).unwrap_or(0);
    Duration::from_secs(n.pow(4) + 3)
}

struct StoredEntry {
    id: i64,
    payload: Vec<u8>,
    priority: i16,
    error_count: i32,
    visible_at: DateTime<Utc>,
}

impl StoredEntry {
    fn to_entry(&self) -> QueueEntry {
        QueueEntry {
            id: self.id,
            payload: self.payload.clone(),
            error_count: self.error_count,
            visible_at: self.visible_at,
        }
    }
}

#[derive(Default)]
struct QueueState {
    next_id: i64,
    ready: Vec<StoredEntry>,
    in_flight: HashMap<i64, StoredEntry>,
}

/// In-memory `QueueStore`. A claimed entry moves to an in-flight map and is
/// invisible to other consumers until acked or retried. Enqueues wake one
/// waiting consumer immediately.
#[derive(Default)]
pub struct MemoryQueueStore {
    inner: Mutex<QueueState>,
    notify: Notify,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn enqueue(&self, payload: &[u8], priority: i16) -> Result<i64, StorageError> {
        let id = {
            let mut state = self.lock();
            state.next_id += 1;
            let id = state.next_id;
            state.ready.push(StoredEntry {
                id,
                payload: payload.to_vec(),
                priority,
                error_count: 0,
                visible_at: Utc::now(),
            });
            id
        };
        self.notify.notify_one();
        Ok(id)
    }

    async fn dequeue(&self) -> Result<Option<QueueEntry>, StorageError> {
        let now = Utc::now();
        let mut state = self.lock();

        let candidate = state
            .ready
            .iter()
            .enumerate()
            .filter(|(_, e)| e.visible_at <= now)
            .max_by_key(|(_, e)| (e.priority, std::cmp::Reverse(e.id)))
            .map(|(idx, _)| idx);

        match candidate {
            Some(idx) => {
                let stored = state.ready.swap_remove(idx);
                let entry = stored.to_entry();
                state.in_flight.insert(stored.id, stored);
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }

    async fn ack(&self, entry: &QueueEntry) -> Result<(), StorageError> {
        let mut state = self.lock();
        state.in_flight.remove(&entry.id);
        Ok(())
    }

    async fn retry(&self, entry: &QueueEntry, _error: &str) -> Result<(), StorageError> {
        let mut state = self.lock();
        let mut stored = state
            .in_flight
            .remove(&entry.id)
            .ok_or_else(|| StorageError::internal(format!("entry {} not in flight", entry.id)))?;
        stored.error_count += 1;
        stored.visible_at = Utc::now()
            + chrono::Duration::from_std(retry_backoff(stored.error_count))
                .unwrap_or_else(|_| chrono::Duration::seconds(3));
        state.ready.push(stored);
        Ok(())
    }

    async fn depth(&self) -> Result<i64, StorageError> {
        let state = self.lock();
        Ok((state.ready.len() + state.in_flight.len()) as i64)
    }

    async fn wait_available(&self, fallback: Duration) {
        tokio::select! {
            _ = self.notify.notified() => {}
            _ = tokio::time::sleep(fallback) => {}
        }
    }
}
