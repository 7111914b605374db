//! In-process stream implementation
//!
//! Backs single-process deployments and the test suite. Same ID discipline
//! and cursor semantics as the Redis implementation, without durability.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, Notify};

use super::{normalize_start_id, MessageQueue, StreamId};
use crate::error::Result;

#[derive(Default)]
struct Inner {
    entries: Vec<(StreamId, String)>,
    last_id: StreamId,
}

/// Non-durable stream keeping entries in memory
pub struct MemoryStreamQueue {
    inner: Arc<Mutex<Inner>>,
    notify: Arc<Notify>,
}

impl MemoryStreamQueue {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            notify: Arc::new(Notify::new()),
        }
    }

    async fn first_after(&self, cursor: StreamId) -> Option<(String, String)> {
        let inner = self.inner.lock().await;
        inner
            .entries
            .iter()
            .find(|(id, _)| *id > cursor)
            .map(|(id, payload)| (id.to_string(), payload.clone()))
    }
}

impl Default for MemoryStreamQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageQueue for MemoryStreamQueue {
    async fn put(&self, payload: &str) -> Result<String> {
        let mut inner = self.inner.lock().await;
        let ms = Utc::now().timestamp_millis().max(0) as u64;
        let id = if ms > inner.last_id.ms {
            StreamId { ms, seq: 0 }
        } else {
            inner.last_id.next()
        };
        inner.last_id = id;
        inner.entries.push((id, payload.to_string()));
        drop(inner);
        self.notify.notify_waiters();
        Ok(id.to_string())
    }

    async fn get(&self, start_id: &str, block_ms: Option<u64>) -> (Option<String>, Option<String>) {
        let normalized = normalize_start_id(Some(start_id));
        let cursor = if normalized == "$" {
            self.inner.lock().await.last_id
        } else {
            normalized.parse().unwrap_or(StreamId::ZERO)
        };

        if let Some((id, payload)) = self.first_after(cursor).await {
            return (Some(id), Some(payload));
        }

        let Some(block_ms) = block_ms.filter(|ms| *ms > 0) else {
            return (None, None);
        };

        let deadline = tokio::time::Instant::now() + Duration::from_millis(block_ms);
        loop {
            // Register interest before the re-check so a concurrent put
            // cannot slip between the check and the await.
            let mut notified = std::pin::pin!(self.notify.notified());
            notified.as_mut().enable();
            if let Some((id, payload)) = self.first_after(cursor).await {
                return (Some(id), Some(payload));
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return (None, None);
            }
        }
    }

    async fn pop(&self) -> (Option<String>, Option<String>) {
        let mut inner = self.inner.lock().await;
        if inner.entries.is_empty() {
            return (None, None);
        }
        let (id, payload) = inner.entries.remove(0);
        (Some(id.to_string()), Some(payload))
    }

    async fn range(&self, start: &str, end: &str, count: usize) -> Vec<(String, String)> {
        let start: StreamId = match start {
            "-" => StreamId::ZERO,
            other => other.parse().unwrap_or(StreamId::ZERO),
        };
        let end: StreamId = match end {
            "+" => StreamId {
                ms: u64::MAX,
                seq: u64::MAX,
            },
            other => other.parse().unwrap_or(StreamId::ZERO),
        };
        let inner = self.inner.lock().await;
        inner
            .entries
            .iter()
            .filter(|(id, _)| *id >= start && *id <= end)
            .take(count)
            .map(|(id, payload)| (id.to_string(), payload.clone()))
            .collect()
    }

    async fn latest_id(&self) -> String {
        let inner = self.inner.lock().await;
        match inner.entries.last() {
            Some((id, _)) => id.to_string(),
            None => "0".to_string(),
        }
    }

    async fn size(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    async fn clear(&self) {
        self.inner.lock().await.entries.clear();
    }

    async fn delete(&self, id: &str) -> bool {
        let Ok(target) = id.parse::<StreamId>() else {
            return false;
        };
        let mut inner = self.inner.lock().await;
        let before = inner.entries.len();
        inner.entries.retain(|(entry_id, _)| *entry_id != target);
        inner.entries.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_assigns_increasing_ids() {
        let queue = MemoryStreamQueue::new();
        let a = queue.put("one").await.unwrap();
        let b = queue.put("two").await.unwrap();
        let a: StreamId = a.parse().unwrap();
        let b: StreamId = b.parse().unwrap();
        assert!(b > a);
    }

    #[tokio::test]
    async fn test_get_advancing_cursor_sees_each_entry_once() {
        let queue = MemoryStreamQueue::new();
        for i in 0..3 {
            queue.put(&format!("m{i}")).await.unwrap();
        }

        let mut cursor = "0".to_string();
        let mut seen = Vec::new();
        loop {
            let (id, payload) = queue.get(&cursor, None).await;
            let Some(id) = id else { break };
            seen.push(payload.unwrap());
            cursor = id;
        }
        assert_eq!(seen, vec!["m0", "m1", "m2"]);
    }

    #[tokio::test]
    async fn test_dollar_cursor_skips_existing_entries() {
        let queue = MemoryStreamQueue::new();
        queue.put("old").await.unwrap();

        let (id, _) = queue.get("$", None).await;
        assert!(id.is_none());

        let latest = queue.latest_id().await;
        queue.put("new").await.unwrap();
        let (_, payload) = queue.get(&latest, None).await;
        assert_eq!(payload.unwrap(), "new");
    }

    #[tokio::test]
    async fn test_blocking_get_wakes_on_put() {
        let queue = Arc::new(MemoryStreamQueue::new());
        let reader = queue.clone();
        let handle =
            tokio::spawn(async move { reader.get("$", Some(1000)).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.put("wakeup").await.unwrap();
        let (id, payload) = handle.await.unwrap();
        assert!(id.is_some());
        assert_eq!(payload.unwrap(), "wakeup");
    }

    #[tokio::test]
    async fn test_pop_removes_earliest() {
        let queue = MemoryStreamQueue::new();
        queue.put("first").await.unwrap();
        queue.put("second").await.unwrap();

        let (_, payload) = queue.pop().await;
        assert_eq!(payload.unwrap(), "first");
        assert_eq!(queue.size().await, 1);

        queue.clear().await;
        assert!(queue.is_empty().await);
        let (id, payload) = queue.pop().await;
        assert!(id.is_none() && payload.is_none());
    }

    #[tokio::test]
    async fn test_invalid_cursor_reads_from_beginning() {
        let queue = MemoryStreamQueue::new();
        queue.put("entry").await.unwrap();
        let (_, payload) = queue.get("garbage!!", None).await;
        assert_eq!(payload.unwrap(), "entry");
    }
}
