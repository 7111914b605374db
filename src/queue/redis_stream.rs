//! Redis Streams implementation of the message queue

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::streams::{StreamMaxlen, StreamRangeReply, StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;

use super::{normalize_start_id, MessageQueue};
use crate::error::{Error, Result};

const LOCK_EXPIRE_SECONDS: u64 = 10;
const LOCK_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);
const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Atomic compare-and-delete used for lock release
const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Durable message stream backed by one Redis Stream key.
///
/// `put`/`get` run unlocked: every stream has a single producer (the task
/// runner for outputs, the coordinator for inputs) and cursor reads are
/// idempotent. Only `pop` mutates contended state and takes the lock.
pub struct RedisStreamQueue {
    stream_name: String,
    conn: ConnectionManager,
}

impl RedisStreamQueue {
    pub fn new(stream_name: impl Into<String>, conn: ConnectionManager) -> Self {
        Self {
            stream_name: stream_name.into(),
            conn,
        }
    }

    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    async fn acquire_lock(&self, lock_key: &str) -> Option<String> {
        let lock_value = uuid::Uuid::new_v4().to_string();
        let deadline = tokio::time::Instant::now() + LOCK_ACQUIRE_TIMEOUT;
        let mut conn = self.conn.clone();

        while tokio::time::Instant::now() < deadline {
            let acquired: std::result::Result<Option<String>, _> = redis::cmd("SET")
                .arg(lock_key)
                .arg(&lock_value)
                .arg("NX")
                .arg("EX")
                .arg(LOCK_EXPIRE_SECONDS)
                .query_async(&mut conn)
                .await;
            match acquired {
                Ok(Some(_)) => return Some(lock_value),
                Ok(None) => tokio::time::sleep(LOCK_RETRY_INTERVAL).await,
                Err(err) => {
                    tracing::warn!(stream = %self.stream_name, error = %err, "Lock acquire failed");
                    return None;
                }
            }
        }
        None
    }

    async fn release_lock(&self, lock_key: &str, lock_value: &str) -> bool {
        let mut conn = self.conn.clone();
        let script = redis::Script::new(RELEASE_SCRIPT);
        match script
            .key(lock_key)
            .arg(lock_value)
            .invoke_async::<i64>(&mut conn)
            .await
        {
            Ok(deleted) => deleted == 1,
            Err(err) => {
                tracing::warn!(stream = %self.stream_name, error = %err, "Lock release failed");
                false
            }
        }
    }

    fn first_entry(reply: StreamRangeReply) -> (Option<String>, Option<String>) {
        let Some(entry) = reply.ids.into_iter().next() else {
            return (None, None);
        };
        let payload = entry
            .map
            .get("data")
            .and_then(|value| redis::from_redis_value::<String>(value).ok());
        (Some(entry.id), payload)
    }
}

#[async_trait]
impl MessageQueue for RedisStreamQueue {
    async fn put(&self, payload: &str) -> Result<String> {
        tracing::debug!(stream = %self.stream_name, "Putting message into stream");
        let mut conn = self.conn.clone();
        let id: String = conn
            .xadd(&self.stream_name, "*", &[("data", payload)])
            .await
            .map_err(|err| Error::Stream(format!("xadd {}: {err}", self.stream_name)))?;
        Ok(id)
    }

    async fn get(&self, start_id: &str, block_ms: Option<u64>) -> (Option<String>, Option<String>) {
        let mut start = normalize_start_id(Some(start_id));
        let mut conn = self.conn.clone();

        if start == "$" {
            // Resolve "from now" to a concrete cursor so the poll loop below
            // can run on the shared multiplexed connection (a server-side
            // XREAD BLOCK would stall every other command on it).
            start = self.latest_id().await;
        }

        let deadline =
            tokio::time::Instant::now() + Duration::from_millis(block_ms.unwrap_or(0));
        loop {
            let options = StreamReadOptions::default().count(1);
            let reply: std::result::Result<StreamReadReply, _> = conn
                .xread_options(&[&self.stream_name], &[&start], &options)
                .await;

            match reply {
                Ok(reply) => {
                    if let Some(entry) = reply
                        .keys
                        .into_iter()
                        .next()
                        .and_then(|key| key.ids.into_iter().next())
                    {
                        let payload = entry
                            .map
                            .get("data")
                            .and_then(|value| redis::from_redis_value::<String>(value).ok());
                        return (Some(entry.id), payload);
                    }
                }
                Err(err) => {
                    tracing::warn!(stream = %self.stream_name, error = %err, "Stream read failed");
                    return (None, None);
                }
            }

            if tokio::time::Instant::now() >= deadline {
                return (None, None);
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    async fn pop(&self) -> (Option<String>, Option<String>) {
        tracing::debug!(stream = %self.stream_name, "Popping message from stream");
        let lock_key = format!("lock:{}:pop", self.stream_name);
        let Some(lock_value) = self.acquire_lock(&lock_key).await else {
            return (None, None);
        };

        let mut conn = self.conn.clone();
        let result = async {
            let reply: StreamRangeReply = conn
                .xrange_count(&self.stream_name, "-", "+", 1)
                .await
                .ok()?;
            let (id, payload) = Self::first_entry(reply);
            let id = id?;
            let _: std::result::Result<i64, _> =
                conn.xdel(&self.stream_name, &[&id]).await;
            Some((id, payload))
        }
        .await;

        self.release_lock(&lock_key, &lock_value).await;

        match result {
            Some((id, payload)) => (Some(id), payload),
            None => (None, None),
        }
    }

    async fn range(&self, start: &str, end: &str, count: usize) -> Vec<(String, String)> {
        let mut conn = self.conn.clone();
        let reply: std::result::Result<StreamRangeReply, _> = conn
            .xrange_count(&self.stream_name, start, end, count)
            .await;
        let Ok(reply) = reply else {
            return Vec::new();
        };
        reply
            .ids
            .into_iter()
            .filter_map(|entry| {
                let payload = entry
                    .map
                    .get("data")
                    .and_then(|value| redis::from_redis_value::<String>(value).ok())?;
                Some((entry.id, payload))
            })
            .collect()
    }

    async fn latest_id(&self) -> String {
        let mut conn = self.conn.clone();
        let reply: std::result::Result<StreamRangeReply, _> =
            conn.xrevrange_count(&self.stream_name, "+", "-", 1).await;
        reply
            .ok()
            .and_then(|reply| reply.ids.into_iter().next())
            .map(|entry| entry.id)
            .unwrap_or_else(|| "0".to_string())
    }

    async fn size(&self) -> usize {
        let mut conn = self.conn.clone();
        conn.xlen::<_, usize>(&self.stream_name).await.unwrap_or(0)
    }

    async fn clear(&self) {
        let mut conn = self.conn.clone();
        let _: std::result::Result<i64, _> = conn
            .xtrim(&self.stream_name, StreamMaxlen::Equals(0))
            .await;
    }

    async fn delete(&self, id: &str) -> bool {
        let mut conn = self.conn.clone();
        matches!(
            conn.xdel::<_, _, i64>(&self.stream_name, &[id]).await,
            Ok(n) if n > 0
        )
    }
}
