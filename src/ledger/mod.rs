//! Undo ledger for deletions.
//!
//! Every deletion appends an [`UndoEntry`] keyed by verse. An entry can be
//! replayed until its TTL runs out; after that a restore fails with
//! [`EngineError::UndoExpired`] and the periodic sweep evicts it.
//!
//! The ledger is the only state the engine keeps between calls. It is
//! persisted through a [`LedgerBackend`] so entries survive restarts.

mod backend;
mod entry;
mod sweeper;

pub use backend::{FileBackend, LedgerBackend, MemoryBackend};
pub use entry::{Clock, SystemClock, UndoEntry};
pub use sweeper::SweeperHandle;

use crate::error::{EngineError, Result};
use crate::rows::RowStore;
use crate::types::{AffectedRow, AnalysisRow, RowId, VerseKey};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default undo window.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Outcome of a successful restore.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RestoreReport {
    pub entry_id: u64,
    /// Id the deleted row was re-inserted under.
    pub reinserted: RowId,
    /// Rows whose pre-deletion fields were written back.
    pub restored: Vec<RowId>,
}

/// Per-verse stacks of undo entries with TTL eviction.
pub struct UndoLedger {
    /// Entries per verse, oldest first.
    entries: RwLock<BTreeMap<VerseKey, Vec<UndoEntry>>>,
    next_id: AtomicU64,
    backend: Arc<dyn LedgerBackend>,
    /// Serialises snapshot + save so saves land in order.
    persist_lock: Mutex<()>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    max_entries_per_verse: usize,
}

impl UndoLedger {
    /// Open a ledger over `backend`, dropping entries that already expired.
    pub fn open(
        backend: Arc<dyn LedgerBackend>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
        max_entries_per_verse: usize,
    ) -> Result<Self> {
        let now = clock.now();
        let loaded = backend.load()?;
        let total = loaded.len();

        let mut next_id = 0;
        let mut entries: BTreeMap<VerseKey, Vec<UndoEntry>> = BTreeMap::new();
        for entry in loaded {
            next_id = next_id.max(entry.id);
            if entry.is_expired_at(now) {
                continue;
            }
            entries.entry(entry.verse.clone()).or_default().push(entry);
        }
        for stack in entries.values_mut() {
            stack.sort_by_key(|e| e.id);
        }

        let ledger = Self {
            entries: RwLock::new(entries),
            next_id: AtomicU64::new(next_id + 1),
            backend,
            persist_lock: Mutex::new(()),
            clock,
            ttl,
            max_entries_per_verse: max_entries_per_verse.max(1),
        };

        let live = ledger.len();
        if live != total {
            info!(dropped = total - live, "dropped expired undo entries on open");
            ledger.persist()?;
        }
        Ok(ledger)
    }

    /// In-memory ledger on the system clock.
    pub fn in_memory(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            backend: Arc::new(MemoryBackend::new()),
            persist_lock: Mutex::new(()),
            clock: Arc::new(SystemClock),
            ttl,
            max_entries_per_verse: 50,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Number of entries held, live or not yet swept.
    pub fn len(&self) -> usize {
        self.entries.read().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append an entry for a deletion and persist it.
    pub fn record(
        &self,
        verse: &VerseKey,
        deleted_row: AnalysisRow,
        affected_rows: Vec<AffectedRow>,
    ) -> Result<UndoEntry> {
        let entry = UndoEntry {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            verse: verse.clone(),
            deleted_row,
            affected_rows,
            timestamp: self.clock.now(),
            ttl: self.ttl,
            reinserted_as: None,
        };

        {
            let mut entries = self.entries.write();
            let stack = entries.entry(verse.clone()).or_default();
            stack.push(entry.clone());
            if stack.len() > self.max_entries_per_verse {
                let excess = stack.len() - self.max_entries_per_verse;
                stack.drain(..excess);
                debug!(%verse, evicted = excess, "undo stack over capacity");
            }
        }

        self.persist()?;
        Ok(entry)
    }

    /// Live entries for `verse`, newest first.
    pub fn entries(&self, verse: &VerseKey) -> Vec<UndoEntry> {
        let now = self.clock.now();
        self.entries
            .read()
            .get(verse)
            .map(|stack| {
                stack
                    .iter()
                    .rev()
                    .filter(|e| !e.is_expired_at(now))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Newest entry for `verse`, expired or not.
    pub fn latest(&self, verse: &VerseKey) -> Option<UndoEntry> {
        self.entries.read().get(verse).and_then(|s| s.last().cloned())
    }

    /// Drop the entry with `id`.
    pub fn remove(&self, id: u64) -> Result<Option<UndoEntry>> {
        let removed = {
            let mut entries = self.entries.write();
            let mut removed = None;
            for stack in entries.values_mut() {
                if let Some(pos) = stack.iter().position(|e| e.id == id) {
                    removed = Some(stack.remove(pos));
                    break;
                }
            }
            entries.retain(|_, stack| !stack.is_empty());
            removed
        };
        if removed.is_some() {
            self.persist()?;
        }
        Ok(removed)
    }

    /// Evict every expired entry. Returns how many were evicted.
    pub fn sweep(&self) -> Result<usize> {
        let now = self.clock.now();
        let evicted = {
            let mut entries = self.entries.write();
            let before: usize = entries.values().map(Vec::len).sum();
            for stack in entries.values_mut() {
                stack.retain(|e| !e.is_expired_at(now));
            }
            entries.retain(|_, stack| !stack.is_empty());
            before - entries.values().map(Vec::len).sum::<usize>()
        };

        if evicted > 0 {
            info!(evicted, "swept expired undo entries");
            self.persist()?;
        }
        Ok(evicted)
    }

    /// Run [`sweep`](Self::sweep) every `interval` on a background thread.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> SweeperHandle {
        SweeperHandle::spawn(self, interval)
    }

    /// Replay the newest entry for `verse` against `store`.
    pub fn undo<S: RowStore + ?Sized>(&self, verse: &VerseKey, store: &S) -> Result<RestoreReport> {
        let entry = self
            .latest(verse)
            .ok_or_else(|| EngineError::NothingToUndo(verse.clone()))?;
        self.restore(&entry, store)
    }

    /// Re-insert the deleted row, then write back every affected row's
    /// original fields.
    ///
    /// Only the newest entry of its verse can be restored; older entries
    /// were recorded against rows a later deletion has since renumbered.
    ///
    /// Writes are not transactional. On failure the error lists the rows
    /// already written and the entry stays in the ledger for a retry.
    pub fn restore<S: RowStore + ?Sized>(&self, entry: &UndoEntry, store: &S) -> Result<RestoreReport> {
        match self.latest(&entry.verse) {
            Some(latest) if latest.id == entry.id => {}
            Some(latest) => {
                return Err(EngineError::Validation(format!(
                    "undo entry {} is older than entry {} for {}",
                    entry.id, latest.id, entry.verse
                )));
            }
            None => return Err(EngineError::NothingToUndo(entry.verse.clone())),
        }

        let now = self.clock.now();
        if entry.is_expired_at(now) {
            return Err(EngineError::UndoExpired {
                verse: entry.verse.clone(),
                age: entry.age_at(now),
            });
        }

        // Progress may have been recorded by an earlier, failed attempt.
        let reinserted_as = self
            .entries
            .read()
            .get(&entry.verse)
            .and_then(|s| s.iter().find(|e| e.id == entry.id))
            .and_then(|e| e.reinserted_as)
            .or(entry.reinserted_as);

        let reinserted = match reinserted_as {
            Some(id) => id,
            None => {
                let id = store
                    .insert_row(&entry.deleted_row)
                    .map_err(EngineError::store)?;
                self.mark_reinserted(entry.id, id)?;
                id
            }
        };

        let mut confirmed = vec![reinserted];
        let mut restored = Vec::new();
        for affected in &entry.affected_rows {
            let Some(id) = affected.original.id else {
                warn!(anvaya_no = %affected.original.anvaya_no, "affected row has no id, skipping");
                continue;
            };
            if let Err(source) = store.update_row(id, &affected.original) {
                warn!(
                    entry = entry.id,
                    row = %id,
                    written = confirmed.len(),
                    error = %source,
                    "restore stopped part way"
                );
                return Err(EngineError::Persistence { confirmed, source });
            }
            confirmed.push(id);
            restored.push(id);
        }

        self.remove(entry.id)?;
        info!(verse = %entry.verse, entry = entry.id, restored = restored.len(), "restored deletion");

        Ok(RestoreReport {
            entry_id: entry.id,
            reinserted,
            restored,
        })
    }

    fn mark_reinserted(&self, id: u64, row: RowId) -> Result<()> {
        {
            let mut entries = self.entries.write();
            if let Some(e) = entries
                .values_mut()
                .flat_map(|s| s.iter_mut())
                .find(|e| e.id == id)
            {
                e.reinserted_as = Some(row);
            }
        }
        self.persist()
    }

    fn persist(&self) -> Result<()> {
        let _guard = self.persist_lock.lock();
        let snapshot: Vec<UndoEntry> = {
            let entries = self.entries.read();
            let mut all: Vec<UndoEntry> = entries.values().flatten().cloned().collect();
            all.sort_by_key(|e| e.id);
            all
        };
        self.backend.save(&snapshot)
    }
}
