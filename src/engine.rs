//! Engine tying the planners, the row store and the undo ledger together.
//!
//! Each operation loads one verse, plans the change in memory, then writes
//! the rewritten rows back one call at a time. The row store has no
//! transactions, so a failure part way through is reported with the rows
//! that were already written and nothing is rolled back.

use crate::error::{EngineError, Result, RowStoreError};
use crate::ledger::{
    FileBackend, LedgerBackend, MemoryBackend, RestoreReport, SweeperHandle, SystemClock,
    UndoEntry, UndoLedger, DEFAULT_TTL,
};
use crate::reindex::{
    check_rows, plan_deletion, plan_insertion, plan_join, plan_split, Collision,
    DanglingReference, InvariantViolation,
};
use crate::rows::RowStore;
use crate::types::{AffectedRow, AnalysisRow, AnvayaNo, IndexMapping, RowId, ShiftType, VerseKey};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Engine configuration.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// How long a deletion can be undone.
    pub undo_ttl: Duration,

    /// How often expired undo entries are swept. Zero disables the sweeper.
    pub sweep_interval: Duration,

    /// Directory for the persistent undo ledger (None = in memory).
    pub ledger_path: Option<PathBuf>,

    /// Undo entries kept per verse; the oldest go first.
    pub max_entries_per_verse: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            undo_ttl: DEFAULT_TTL,
            sweep_interval: Duration::from_secs(10 * 60),
            ledger_path: None,
            max_entries_per_verse: 50,
        }
    }
}

/// Result of inserting one row.
#[derive(Clone, Debug)]
pub struct InsertOutcome {
    pub id: RowId,
    pub position: AnvayaNo,
    pub mapping: IndexMapping,
    /// Existing rows rewritten to make room.
    pub updated: Vec<RowId>,
}

/// Result of deleting one row.
#[derive(Clone, Debug)]
pub struct DeleteOutcome {
    pub entry: UndoEntry,
    pub mapping: IndexMapping,
    pub updated: Vec<RowId>,
    pub dangling: Vec<DanglingReference>,
}

/// Result of a split or join.
#[derive(Clone, Debug)]
pub struct PartitionOutcome {
    pub moved: Vec<RowId>,
    /// Duplicate positions left in the target sentence, not repaired.
    pub collisions: Vec<Collision>,
}

/// In-place edit of a row's payload. `None` leaves a field as it is.
#[derive(Clone, Debug, Default)]
pub struct RowEdit {
    pub word: Option<String>,
    pub poem: Option<String>,
    pub morph_analysis: Option<String>,
    pub morph_in_context: Option<String>,
    pub kaaraka_sambandha: Option<String>,
    pub possible_relations: Option<String>,
    pub hindi_meaning: Option<String>,
    pub english_meaning: Option<String>,
    pub samasa: Option<String>,
    pub prayoga: Option<String>,
    pub sarvanama: Option<String>,
    pub name_classification: Option<String>,
}

impl RowEdit {
    fn apply(self, row: &mut AnalysisRow) {
        let fields = [
            (self.word, &mut row.word),
            (self.poem, &mut row.poem),
            (self.morph_analysis, &mut row.morph_analysis),
            (self.morph_in_context, &mut row.morph_in_context),
            (self.kaaraka_sambandha, &mut row.kaaraka_sambandha),
            (self.possible_relations, &mut row.possible_relations),
            (self.hindi_meaning, &mut row.hindi_meaning),
            (self.english_meaning, &mut row.english_meaning),
            (self.samasa, &mut row.samasa),
            (self.prayoga, &mut row.prayoga),
            (self.sarvanama, &mut row.sarvanama),
            (self.name_classification, &mut row.name_classification),
        ];
        for (value, slot) in fields {
            if let Some(v) = value {
                *slot = v;
            }
        }
    }
}

/// The reindexing engine over a row store.
pub struct Engine<S: RowStore> {
    config: EngineConfig,
    rows: S,
    ledger: Arc<UndoLedger>,
    _sweeper: Option<SweeperHandle>,
}

impl<S: RowStore> Engine<S> {
    /// Build an engine, opening the undo ledger described by `config`.
    pub fn new(rows: S, config: EngineConfig) -> Result<Self> {
        let backend: Arc<dyn LedgerBackend> = match &config.ledger_path {
            Some(path) => Arc::new(FileBackend::open(path)?),
            None => Arc::new(MemoryBackend::new()),
        };
        let ledger = Arc::new(UndoLedger::open(
            backend,
            Arc::new(SystemClock),
            config.undo_ttl,
            config.max_entries_per_verse,
        )?);
        Ok(Self::with_ledger(rows, config, ledger))
    }

    /// Build an engine around an existing ledger.
    pub fn with_ledger(rows: S, config: EngineConfig, ledger: Arc<UndoLedger>) -> Self {
        let sweeper = if config.sweep_interval.is_zero() {
            None
        } else {
            Some(ledger.spawn_sweeper(config.sweep_interval))
        };
        Self {
            config,
            rows,
            ledger,
            _sweeper: sweeper,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<UndoLedger> {
        &self.ledger
    }

    pub fn row_store(&self) -> &S {
        &self.rows
    }

    /// All rows of `verse`.
    pub fn load(&self, verse: &VerseKey) -> Result<Vec<AnalysisRow>> {
        self.rows.find_rows(verse).map_err(EngineError::store)
    }

    // --- Insertion ---

    /// Insert a single row at its `anvaya_no`, shifting others per `shift`.
    pub fn insert(&self, verse: &VerseKey, mut row: AnalysisRow, shift: ShiftType) -> Result<InsertOutcome> {
        row.verse = verse.clone();
        row.id = None;
        row.deleted = false;

        let existing = self.load(verse)?;
        let plan = plan_insertion(&existing, row, shift)?;

        let mut confirmed = Vec::new();
        self.write_updates(&plan.changed, &mut confirmed)
            .map_err(|source| self.partial(verse, "insert", confirmed.clone(), source))?;
        let updated = confirmed.clone();

        let id = self
            .rows
            .insert_row(&plan.row)
            .map_err(|source| self.partial(verse, "insert", confirmed, source))?;

        info!(%verse, anvaya_no = %plan.position, ?shift, shifted = plan.mapping.len(), "inserted row");

        Ok(InsertOutcome {
            id,
            position: plan.position,
            mapping: plan.mapping,
            updated,
        })
    }

    /// Insert a whole verse's rows without renumbering anything.
    ///
    /// Every row is validated and checked for duplicate positions (within the
    /// batch and against stored rows) before the first write.
    pub fn bulk_insert(&self, verse: &VerseKey, rows: Vec<AnalysisRow>) -> Result<Vec<RowId>> {
        let existing = self.load(verse)?;
        let mut taken: HashSet<(String, AnvayaNo)> = existing
            .iter()
            .filter_map(|r| r.position().map(|p| (r.sentno.clone(), p)))
            .collect();

        let mut batch = Vec::with_capacity(rows.len());
        for mut row in rows {
            let position = row.validate()?;
            if !taken.insert((row.sentno.clone(), position)) {
                return Err(EngineError::DuplicateIndex {
                    sentno: row.sentno,
                    anvaya_no: row.anvaya_no,
                });
            }
            row.verse = verse.clone();
            row.id = None;
            row.deleted = false;
            batch.push(row);
        }

        let mut confirmed = Vec::with_capacity(batch.len());
        for row in &batch {
            match self.rows.insert_row(row) {
                Ok(id) => confirmed.push(id),
                Err(source) => return Err(self.partial(verse, "bulk insert", confirmed, source)),
            }
        }

        info!(%verse, rows = confirmed.len(), "bulk inserted rows");
        Ok(confirmed)
    }

    // --- Edits ---

    /// Edit a row's payload in place. Positions are never changed here.
    pub fn edit_row(&self, verse: &VerseKey, id: RowId, edit: RowEdit) -> Result<AnalysisRow> {
        let mut row = self
            .load(verse)?
            .into_iter()
            .find(|r| r.id == Some(id))
            .ok_or(EngineError::RowNotFound(id))?;

        edit.apply(&mut row);
        if row.word.trim().is_empty() {
            return Err(EngineError::Validation("word is empty".into()));
        }

        self.rows.update_row(id, &row).map_err(EngineError::store)?;
        Ok(row)
    }

    // --- Deletion ---

    /// Delete row `id`, renumber its sentence grouping and record an undo entry.
    pub fn delete(&self, verse: &VerseKey, id: RowId) -> Result<DeleteOutcome> {
        let existing = self.load(verse)?;
        let plan = plan_deletion(&existing, id)?;

        let entry = self
            .ledger
            .record(verse, plan.deleted.clone(), plan.affected.clone())?;

        if let Err(source) = self.rows.delete_row(id) {
            // Nothing changed, so the entry must not be replayed.
            if let Err(e) = self.ledger.remove(entry.id) {
                warn!(%verse, entry = entry.id, error = %e, "could not drop undo entry after failed delete");
            }
            return Err(self.partial(verse, "delete", Vec::new(), source));
        }

        let mut confirmed = vec![id];
        self.write_updates(&plan.affected, &mut confirmed)
            .map_err(|source| self.partial(verse, "delete", confirmed.clone(), source))?;

        for d in &plan.dangling {
            info!(
                %verse,
                row = ?d.row,
                relation = %d.relation_type,
                former = %d.former_reference,
                "relation left without a reference"
            );
        }
        info!(%verse, anvaya_no = %plan.deleted.anvaya_no, renumbered = plan.mapping.len(), entry = entry.id, "deleted row");

        Ok(DeleteOutcome {
            entry,
            mapping: plan.mapping,
            updated: confirmed.into_iter().skip(1).collect(),
            dangling: plan.dangling,
        })
    }

    /// Undo the most recent deletion in `verse`.
    pub fn undo(&self, verse: &VerseKey) -> Result<RestoreReport> {
        self.ledger.undo(verse, &self.rows)
    }

    // --- Sentence partitioning ---

    /// Move rows `ids` into sentence `target_sentno`.
    pub fn split(&self, verse: &VerseKey, ids: &[RowId], target_sentno: &str) -> Result<PartitionOutcome> {
        let existing = self.load(verse)?;
        let plan = plan_split(&existing, ids, target_sentno)?;
        self.write_partition(verse, "split", &plan.moved, plan.collisions)
    }

    /// Merge sentences `sources` into `target_sentno`.
    pub fn join(&self, verse: &VerseKey, sources: [&str; 2], target_sentno: &str) -> Result<PartitionOutcome> {
        let existing = self.load(verse)?;
        let plan = plan_join(&existing, &sources, target_sentno)?;
        self.write_partition(verse, "join", &plan.moved, plan.collisions)
    }

    /// Invariant violations currently present in `verse`.
    pub fn check(&self, verse: &VerseKey) -> Result<Vec<InvariantViolation>> {
        Ok(check_rows(&self.load(verse)?))
    }

    fn write_partition(
        &self,
        verse: &VerseKey,
        op: &str,
        moved: &[AffectedRow],
        collisions: Vec<Collision>,
    ) -> Result<PartitionOutcome> {
        let mut confirmed = Vec::new();
        self.write_updates(moved, &mut confirmed)
            .map_err(|source| self.partial(verse, op, confirmed.clone(), source))?;
        info!(%verse, op, moved = confirmed.len(), collisions = collisions.len(), "relocated rows");
        Ok(PartitionOutcome {
            moved: confirmed,
            collisions,
        })
    }

    fn write_updates(
        &self,
        changes: &[AffectedRow],
        confirmed: &mut Vec<RowId>,
    ) -> std::result::Result<(), RowStoreError> {
        for change in changes {
            let Some(id) = change.updated.id else {
                warn!(anvaya_no = %change.updated.anvaya_no, "rewritten row has no id, skipping");
                continue;
            };
            self.rows.update_row(id, &change.updated)?;
            confirmed.push(id);
        }
        Ok(())
    }

    fn partial(&self, verse: &VerseKey, op: &str, confirmed: Vec<RowId>, source: RowStoreError) -> EngineError {
        warn!(%verse, op, written = confirmed.len(), error = %source, "persistence failed part way");
        EngineError::Persistence { confirmed, source }
    }
}
