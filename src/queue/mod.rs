//! Durable per-task event streams
//!
//! Each task owns two named streams, `task:input:<id>` and `task:output:<id>`.
//! Entries are opaque string payloads addressed by monotone `<ms>-<seq>` IDs;
//! readers advance a cursor and observe every entry exactly once. `pop` is the
//! only operation that can race across consumers and is serialized by a named
//! distributed lock.

pub mod memory;
pub mod redis_stream;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;

use crate::error::Result;

pub use memory::MemoryStreamQueue;
pub use redis_stream::RedisStreamQueue;

lazy_static! {
    static ref STREAM_ID_PATTERN: Regex =
        Regex::new(r"^\d+(?:-\d+)?$|^\$$").expect("stream id pattern");
}

/// Monotone lexicographic stream identifier: milliseconds plus a sequence
/// number disambiguating entries within the same millisecond.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct StreamId {
    pub ms: u64,
    pub seq: u64,
}

impl StreamId {
    pub const ZERO: StreamId = StreamId { ms: 0, seq: 0 };

    /// Smallest ID strictly greater than `self`
    pub fn next(self) -> Self {
        Self {
            ms: self.ms,
            seq: self.seq + 1,
        }
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

impl FromStr for StreamId {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (ms, seq) = match s.split_once('-') {
            Some((ms, seq)) => (ms, seq),
            None => (s, "0"),
        };
        Ok(Self {
            ms: ms.parse().map_err(|_| ())?,
            seq: seq.parse().map_err(|_| ())?,
        })
    }
}

/// Normalize a reader cursor to a valid stream ID.
///
/// Accepts `<ms>`, `<ms>-<seq>` and `$`; anything else (including empty
/// input) falls back to `0-0` so a bad client cursor never fails the reader.
pub fn normalize_start_id(start_id: Option<&str>) -> String {
    let Some(raw) = start_id else {
        return "0-0".to_string();
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return "0-0".to_string();
    }
    if STREAM_ID_PATTERN.is_match(trimmed) {
        return trimmed.to_string();
    }
    tracing::warn!(start_id = %raw, "Invalid stream start id, falling back to 0-0");
    "0-0".to_string()
}

/// One durable, append-only, ID-addressed message stream.
///
/// `get` and `pop` swallow transport failures into empty returns; only `put`
/// (where durability matters) propagates errors.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Append a payload and return its assigned stream ID
    async fn put(&self, payload: &str) -> Result<String>;

    /// First entry with ID strictly greater than `start_id`.
    ///
    /// `start_id = "0"` reads from the beginning, `"$"` from now on. With
    /// `block_ms = Some(n)` the call waits up to `n` ms for a new entry.
    async fn get(&self, start_id: &str, block_ms: Option<u64>) -> (Option<String>, Option<String>);

    /// Atomically read and delete the earliest entry, serialized by the
    /// stream's pop lock. `(None, None)` on lock timeout or empty stream.
    async fn pop(&self) -> (Option<String>, Option<String>);

    /// Entries between `start` and `end` inclusive, capped at `count`
    async fn range(&self, start: &str, end: &str, count: usize) -> Vec<(String, String)>;

    /// ID of the newest entry, or `"0"` when empty
    async fn latest_id(&self) -> String;

    async fn size(&self) -> usize;

    async fn is_empty(&self) -> bool {
        self.size().await == 0
    }

    async fn clear(&self);

    async fn delete(&self, id: &str) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_id_parse_and_format() {
        let id: StreamId = "1700000000000-3".parse().unwrap();
        assert_eq!(id.ms, 1700000000000);
        assert_eq!(id.seq, 3);
        assert_eq!(id.to_string(), "1700000000000-3");

        let bare: StreamId = "42".parse().unwrap();
        assert_eq!(bare, StreamId { ms: 42, seq: 0 });

        assert!("".parse::<StreamId>().is_err());
        assert!("abc-1".parse::<StreamId>().is_err());
    }

    #[test]
    fn test_stream_id_ordering() {
        let a: StreamId = "100-1".parse().unwrap();
        let b: StreamId = "100-2".parse().unwrap();
        let c: StreamId = "101-0".parse().unwrap();
        assert!(a < b);
        assert!(b < c);
        assert!(a.next() == b);
    }

    #[test]
    fn test_normalize_start_id() {
        assert_eq!(normalize_start_id(None), "0-0");
        assert_eq!(normalize_start_id(Some("")), "0-0");
        assert_eq!(normalize_start_id(Some("   ")), "0-0");
        assert_eq!(normalize_start_id(Some("0")), "0");
        assert_eq!(normalize_start_id(Some("123-4")), "123-4");
        assert_eq!(normalize_start_id(Some("$")), "$");
        assert_eq!(normalize_start_id(Some("not-an-id")), "0-0");
        assert_eq!(normalize_start_id(Some("12-")), "0-0");
    }
}
