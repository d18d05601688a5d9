//! Monotonic id allocation per id class.

use std::fmt;
use std::ops::RangeInclusive;
use std::path::Path;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tracing::debug;

use crate::error::{ProvenanceError, Result};

/// Independent id sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IdClass {
    /// `documentId`.
    Document,
    /// `ruleId`.
    AgeOffRule,
    /// `purgeId`, shared with age-off event ids.
    PurgeEvent,
}

impl IdClass {
    pub const ALL: [IdClass; 3] = [IdClass::Document, IdClass::AgeOffRule, IdClass::PurgeEvent];

    pub fn as_str(self) -> &'static str {
        match self {
            IdClass::Document => "document",
            IdClass::AgeOffRule => "age_off_rule",
            IdClass::PurgeEvent => "purge_event",
        }
    }

    fn index(self) -> usize {
        match self {
            IdClass::Document => 0,
            IdClass::AgeOffRule => 1,
            IdClass::PurgeEvent => 2,
        }
    }
}

impl fmt::Display for IdClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counter service handing out ids.
///
/// The current value of a class is the last id handed out, `0` before the
/// first allocation. Implementations must never return the same id twice,
/// even to concurrent callers.
pub trait IdAllocator: Send + Sync {
    /// Allocates `n` contiguous ids and returns them as an inclusive range.
    fn next_n_ids(&self, class: IdClass, n: usize) -> Result<RangeInclusive<i64>>;

    fn current_value(&self, class: IdClass) -> Result<i64>;

    fn set_current_value(&self, class: IdClass, value: i64) -> Result<()>;

    fn next_id(&self, class: IdClass) -> Result<i64> {
        Ok(*self.next_n_ids(class, 1)?.start())
    }
}

fn block_len(n: usize) -> Result<i64> {
    match i64::try_from(n) {
        Ok(len) if len > 0 => Ok(len),
        _ => Err(ProvenanceError::InvalidArgument(format!(
            "cannot allocate a block of {n} ids"
        ))),
    }
}

/// Process-local counters.
#[derive(Debug, Default)]
pub struct MemoryIdAllocator {
    counters: Mutex<[i64; 3]>,
}

impl MemoryIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdAllocator for MemoryIdAllocator {
    fn next_n_ids(&self, class: IdClass, n: usize) -> Result<RangeInclusive<i64>> {
        let len = block_len(n)?;
        let mut counters = self.counters.lock();
        let start = counters[class.index()] + 1;
        counters[class.index()] += len;
        Ok(start..=counters[class.index()])
    }

    fn current_value(&self, class: IdClass) -> Result<i64> {
        Ok(self.counters.lock()[class.index()])
    }

    fn set_current_value(&self, class: IdClass, value: i64) -> Result<()> {
        self.counters.lock()[class.index()] = value;
        Ok(())
    }
}

/// Counters persisted in their own SQLite file.
///
/// Each call runs in an immediate transaction, so several processes sharing
/// the file still never receive the same id.
pub struct SqliteIdAllocator {
    conn: Mutex<Connection>,
}

impl SqliteIdAllocator {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(unavailable)?;
        conn.busy_timeout(Duration::from_secs(5)).map_err(unavailable)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS id_counters (
                class TEXT PRIMARY KEY,
                value INTEGER NOT NULL
            )",
        )
        .map_err(unavailable)?;
        debug!(path = %path.as_ref().display(), "opened id allocator");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn update<T>(&self, class: IdClass, apply: impl FnOnce(i64) -> (i64, T)) -> Result<T> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(unavailable)?;
        let current = read_counter(&tx, class)?;
        let (next, out) = apply(current);
        tx.execute(
            "INSERT INTO id_counters (class, value) VALUES (?1, ?2)
             ON CONFLICT (class) DO UPDATE SET value = excluded.value",
            params![class.as_str(), next],
        )
        .map_err(unavailable)?;
        tx.commit().map_err(unavailable)?;
        Ok(out)
    }
}

impl IdAllocator for SqliteIdAllocator {
    fn next_n_ids(&self, class: IdClass, n: usize) -> Result<RangeInclusive<i64>> {
        let len = block_len(n)?;
        self.update(class, |current| (current + len, current + 1..=current + len))
    }

    fn current_value(&self, class: IdClass) -> Result<i64> {
        read_counter(&self.conn.lock(), class)
    }

    fn set_current_value(&self, class: IdClass, value: i64) -> Result<()> {
        self.update(class, |_| (value, ()))
    }
}

fn read_counter(conn: &Connection, class: IdClass) -> Result<i64> {
    let value: Option<i64> = conn
        .query_row(
            "SELECT value FROM id_counters WHERE class = ?1",
            [class.as_str()],
            |row| row.get(0),
        )
        .optional()
        .map_err(unavailable)?;
    Ok(value.unwrap_or(0))
}

fn unavailable(err: rusqlite::Error) -> ProvenanceError {
    ProvenanceError::AllocatorUnavailable(err.to_string())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn memory_blocks_are_contiguous_and_per_class() -> Result<()> {
        let ids = MemoryIdAllocator::new();
        assert_eq!(ids.next_id(IdClass::Document)?, 1);
        assert_eq!(ids.next_n_ids(IdClass::Document, 3)?, 2..=4);
        assert_eq!(ids.next_id(IdClass::AgeOffRule)?, 1);
        assert_eq!(ids.current_value(IdClass::Document)?, 4);
        assert!(ids.next_n_ids(IdClass::Document, 0).is_err());
        Ok(())
    }

    #[test]
    fn memory_allocator_is_unique_under_contention() {
        let ids = Arc::new(MemoryIdAllocator::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ids = Arc::clone(&ids);
                thread::spawn(move || {
                    (0..100)
                        .map(|_| ids.next_id(IdClass::PurgeEvent).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "id {id} handed out twice");
            }
        }
        assert_eq!(seen.len(), 800);
    }

    #[test]
    fn sqlite_counters_survive_reopen() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("ids.db");
        {
            let ids = SqliteIdAllocator::open(&path)?;
            assert_eq!(ids.next_n_ids(IdClass::Document, 10)?, 1..=10);
            ids.set_current_value(IdClass::PurgeEvent, 41)?;
        }
        let ids = SqliteIdAllocator::open(&path)?;
        assert_eq!(ids.next_id(IdClass::Document)?, 11);
        assert_eq!(ids.next_id(IdClass::PurgeEvent)?, 42);
        assert_eq!(ids.current_value(IdClass::AgeOffRule)?, 0);
        Ok(())
    }

    #[test]
    fn unreachable_backing_file_is_allocator_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("ids.db");
        let err = SqliteIdAllocator::open(path).err().unwrap();
        assert!(matches!(err, ProvenanceError::AllocatorUnavailable(_)));
    }
}
