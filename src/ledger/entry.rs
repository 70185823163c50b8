//! Undo entries and the clock they are aged against.

use crate::types::{AffectedRow, AnalysisRow, RowId, Timestamp, VerseKey};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Source of the current time for TTL decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall-clock time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// Everything needed to reverse one deletion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndoEntry {
    /// Ledger-wide sequence number.
    pub id: u64,
    pub verse: VerseKey,
    /// The deleted row exactly as it was stored.
    pub deleted_row: AnalysisRow,
    /// Surviving rows the deletion rewrote, before and after.
    pub affected_rows: Vec<AffectedRow>,
    pub timestamp: Timestamp,
    pub ttl: Duration,
    /// Set once a restore has re-inserted the deleted row, so a retry
    /// after a partial failure does not insert it twice.
    #[serde(default)]
    pub reinserted_as: Option<RowId>,
}

impl UndoEntry {
    pub fn age_at(&self, now: Timestamp) -> Duration {
        self.timestamp.age_at(now)
    }

    /// Expired once strictly older than its TTL.
    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        self.age_at(now) > self.ttl
    }

    pub fn expires_at(&self) -> Timestamp {
        self.timestamp.plus(self.ttl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(ts: i64, ttl: Duration) -> UndoEntry {
        UndoEntry {
            id: 1,
            verse: VerseKey::default(),
            deleted_row: AnalysisRow::default(),
            affected_rows: Vec::new(),
            timestamp: Timestamp(ts),
            ttl,
            reinserted_as: None,
        }
    }

    #[test]
    fn test_expiry_boundary() {
        let e = entry(0, Duration::from_secs(10));
        assert!(!e.is_expired_at(Timestamp(10_000_000)));
        assert!(e.is_expired_at(Timestamp(10_000_001)));
        assert_eq!(e.expires_at(), Timestamp(10_000_000));
    }

    #[test]
    fn test_entry_survives_msgpack() {
        let mut e = entry(5, Duration::from_secs(60));
        e.deleted_row = AnalysisRow::new(VerseKey::new("b", "1", "2", "3", "4"), "1", "1.2", "vanam")
            .with_id(RowId(9))
            .with_kaaraka("karma,1.1");
        e.deleted_row.extra.insert("bgcolor".into(), "#fff".into());
        let bytes = rmp_serde::to_vec(&e).unwrap();
        let back: UndoEntry = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(back, e);
    }
}
