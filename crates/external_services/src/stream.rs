//! Append-only stream log abstraction.
//!
//! Both the update log and the snapshot log are streams of entries keyed by
//! monotonically increasing IDs, each carrying one payload field. The replica
//! only depends on [`StreamLog`]; [`crate::RedisStreamLog`] is the production
//! implementation.

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Stream entry ID in Redis format: `<milliseconds>-<sequence>`.
///
/// IDs are totally ordered; `"0"` parses as `0-0`, the position before the
/// first entry of any stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct EntryId {
    pub millis: u64,
    pub seq: u64,
}

impl EntryId {
    /// Position before any entry.
    pub const ZERO: EntryId = EntryId { millis: 0, seq: 0 };

    pub fn new(millis: u64, seq: u64) -> Self {
        Self { millis, seq }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.millis, self.seq)
    }
}

impl FromStr for EntryId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidEntryId(s.to_string());

        match s.split_once('-') {
            Some((millis, seq)) => Ok(Self {
                millis: millis.parse().map_err(|_| invalid())?,
                seq: seq.parse().map_err(|_| invalid())?,
            }),
            None => Ok(Self {
                millis: s.parse().map_err(|_| invalid())?,
                seq: 0,
            }),
        }
    }
}

impl Serialize for EntryId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EntryId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// One entry read from a stream.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub id: EntryId,
    /// Value of the stream's payload field, `None` if the entry lacks it.
    pub payload: Option<String>,
}

impl LogEntry {
    pub fn new(id: EntryId, payload: Option<String>) -> Self {
        Self { id, payload }
    }
}

/// Append-only log of entries with a single payload field.
#[async_trait]
pub trait StreamLog: Send + Sync {
    /// Stream name (for diagnostics).
    fn name(&self) -> &str;

    /// Append a payload, returning the ID assigned to the new entry.
    async fn append(&self, payload: &str) -> Result<EntryId>;

    /// Read up to `count` entries with IDs strictly greater than `after`.
    ///
    /// Implementations may block for a bounded time waiting for new entries;
    /// an empty result means nothing arrived in that window.
    async fn read_after(&self, after: EntryId, count: usize) -> Result<Vec<LogEntry>>;

    /// The most recent entry, if the stream has any.
    async fn latest(&self) -> Result<Option<LogEntry>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_entry_ids() {
        assert_eq!("0".parse::<EntryId>().unwrap(), EntryId::ZERO);
        assert_eq!(
            "1704067200000-3".parse::<EntryId>().unwrap(),
            EntryId::new(1704067200000, 3)
        );
        assert!("abc".parse::<EntryId>().is_err());
        assert!("1-x".parse::<EntryId>().is_err());
        assert!("".parse::<EntryId>().is_err());
    }

    #[test]
    fn test_entry_id_ordering() {
        let a = EntryId::new(5, 9);
        let b = EntryId::new(6, 0);
        let c = EntryId::new(6, 1);
        assert!(EntryId::ZERO < a);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_entry_id_serde_as_string() {
        let id = EntryId::new(1700000000000, 2);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"1700000000000-2\"");

        let parsed: EntryId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
        assert_eq!(id.to_string(), "1700000000000-2");
    }
}
