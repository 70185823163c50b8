//! Error handling and edge case tests.

use anvaya::{
    AnalysisRow, Clock, Engine, EngineConfig, EngineError, MemoryBackend, MemoryRowStore,
    RowId, RowStore, RowStoreError, ShiftType, Timestamp, UndoLedger, VerseKey,
};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Row store that starts failing writes after a budget is used up.
struct FlakyStore {
    inner: MemoryRowStore,
    writes_left: AtomicUsize,
}

impl FlakyStore {
    fn new() -> Self {
        Self {
            inner: MemoryRowStore::new(),
            writes_left: AtomicUsize::new(usize::MAX),
        }
    }

    fn fail_after(&self, writes: usize) {
        self.writes_left.store(writes, Ordering::SeqCst);
    }

    fn heal(&self) {
        self.writes_left.store(usize::MAX, Ordering::SeqCst);
    }

    fn spend(&self) -> Result<(), RowStoreError> {
        let left = self.writes_left.load(Ordering::SeqCst);
        if left == 0 {
            return Err(RowStoreError::Unavailable("connection reset".into()));
        }
        self.writes_left.store(left - 1, Ordering::SeqCst);
        Ok(())
    }
}

impl RowStore for FlakyStore {
    fn find_rows(&self, verse: &VerseKey) -> Result<Vec<AnalysisRow>, RowStoreError> {
        self.inner.find_rows(verse)
    }

    fn insert_row(&self, row: &AnalysisRow) -> Result<RowId, RowStoreError> {
        self.spend()?;
        self.inner.insert_row(row)
    }

    fn update_row(&self, id: RowId, row: &AnalysisRow) -> Result<(), RowStoreError> {
        self.spend()?;
        self.inner.update_row(id, row)
    }

    fn delete_row(&self, id: RowId) -> Result<(), RowStoreError> {
        self.spend()?;
        self.inner.delete_row(id)
    }
}

struct TestClock(AtomicI64);

impl Clock for TestClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.0.load(Ordering::SeqCst))
    }
}

fn verse() -> VerseKey {
    VerseKey::new("kumarasambhava", "1", "1", "1", "3")
}

fn row(sentno: &str, anvaya: &str) -> AnalysisRow {
    AnalysisRow::new(verse(), sentno, anvaya, format!("w{}", anvaya))
}

fn quiet_config() -> EngineConfig {
    EngineConfig {
        sweep_interval: Duration::ZERO,
        ..Default::default()
    }
}

fn flaky_engine(positions: &[&str]) -> Engine<Arc<FlakyStore>> {
    let store = Arc::new(FlakyStore::new());
    let engine = Engine::new(store, quiet_config()).unwrap();
    engine
        .bulk_insert(&verse(), positions.iter().map(|p| row("1", p)).collect())
        .unwrap();
    engine
}

fn positions(engine: &Engine<impl RowStore>) -> Vec<String> {
    engine
        .load(&verse())
        .unwrap()
        .into_iter()
        .map(|r| r.anvaya_no)
        .collect()
}

// --- Validation ---

#[test]
fn test_insert_rejects_missing_fields() {
    let engine = Engine::new(MemoryRowStore::new(), quiet_config()).unwrap();
    for bad in [row("1", ""), row("", "1.1"), AnalysisRow::new(verse(), "1", "1.1", "  ")] {
        let err = engine.insert(&verse(), bad, ShiftType::Main).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)), "{:?}", err);
    }
    assert!(engine.load(&verse()).unwrap().is_empty());
}

#[test]
fn test_insert_rejects_malformed_anvaya() {
    let engine = Engine::new(MemoryRowStore::new(), quiet_config()).unwrap();
    let err = engine.insert(&verse(), row("1", "two"), ShiftType::Sub).unwrap_err();
    assert!(matches!(err, EngineError::InvalidAnvaya(_)));
}

#[test]
fn test_insert_without_shift_rejects_collision() {
    let engine = Engine::new(MemoryRowStore::new(), quiet_config()).unwrap();
    engine.bulk_insert(&verse(), vec![row("1", "1.1"), row("1", "2.1")]).unwrap();

    let err = engine.insert(&verse(), row("1", "2.1"), ShiftType::None).unwrap_err();
    assert!(matches!(
        err,
        EngineError::DuplicateIndex { ref sentno, ref anvaya_no } if sentno == "1" && anvaya_no == "2.1"
    ));
    assert_eq!(engine.load(&verse()).unwrap().len(), 2);

    // Same position in another sentence is fine.
    engine.insert(&verse(), row("2", "2.1"), ShiftType::None).unwrap();
}

#[test]
fn test_bulk_insert_rejects_batch_duplicates_before_writing() {
    let engine = Engine::new(MemoryRowStore::new(), quiet_config()).unwrap();
    let err = engine
        .bulk_insert(&verse(), vec![row("1", "1.1"), row("1", "1.2"), row("1", "1.1")])
        .unwrap_err();
    assert!(matches!(err, EngineError::DuplicateIndex { .. }));
    assert!(engine.load(&verse()).unwrap().is_empty());
}

#[test]
fn test_delete_unknown_row() {
    let engine = Engine::new(MemoryRowStore::new(), quiet_config()).unwrap();
    assert!(matches!(
        engine.delete(&verse(), RowId(5)),
        Err(EngineError::RowNotFound(RowId(5)))
    ));
    assert!(engine.ledger().is_empty());
}

#[test]
fn test_edit_rejects_empty_word() {
    let engine = Engine::new(MemoryRowStore::new(), quiet_config()).unwrap();
    let ids = engine.bulk_insert(&verse(), vec![row("1", "1.1")]).unwrap();
    let err = engine
        .edit_row(
            &verse(),
            ids[0],
            anvaya::RowEdit {
                word: Some(String::new()),
                ..Default::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

// --- Partial persistence ---

#[test]
fn test_insert_reports_confirmed_rows_on_failure() {
    let engine = flaky_engine(&["1.1", "2.1", "3.1"]);
    engine.row_store().fail_after(1);

    let err = engine
        .insert(&verse(), row("1", "1.1"), ShiftType::Main)
        .unwrap_err();
    match err {
        EngineError::Persistence { confirmed, source } => {
            assert_eq!(confirmed, vec![RowId(1)]);
            assert!(matches!(source, RowStoreError::Unavailable(_)));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    // Nothing is rolled back.
    assert_eq!(positions(&engine), vec!["2.1", "2.1", "3.1"]);
}

#[test]
fn test_failed_delete_leaves_no_undo_entry() {
    let engine = flaky_engine(&["1.1", "2.1"]);
    engine.row_store().fail_after(0);

    let err = engine.delete(&verse(), RowId(1)).unwrap_err();
    assert!(matches!(err, EngineError::Persistence { ref confirmed, .. } if confirmed.is_empty()));
    assert!(engine.ledger().is_empty());
    assert_eq!(positions(&engine), vec!["1.1", "2.1"]);
}

#[test]
fn test_delete_partial_failure_keeps_undo_entry() {
    let engine = flaky_engine(&["1.1", "2.1", "3.1", "4.1"]);
    engine.row_store().fail_after(2);

    let err = engine.delete(&verse(), RowId(1)).unwrap_err();
    match err {
        EngineError::Persistence { confirmed, .. } => assert_eq!(confirmed, vec![RowId(1), RowId(2)]),
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(engine.ledger().len(), 1);

    // The entry captured every affected row, so undo repairs the half-written state.
    engine.row_store().heal();
    engine.undo(&verse()).unwrap();
    assert_eq!(positions(&engine), vec!["1.1", "2.1", "3.1", "4.1"]);
}

#[test]
fn test_restore_retry_does_not_reinsert_twice() {
    let engine = flaky_engine(&["1.1", "2.1", "3.1"]);
    engine.delete(&verse(), RowId(1)).unwrap();

    // Re-insert succeeds, first row update fails.
    engine.row_store().fail_after(1);
    let err = engine.undo(&verse()).unwrap_err();
    match err {
        EngineError::Persistence { confirmed, .. } => assert_eq!(confirmed, vec![RowId(1)]),
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(engine.ledger().len(), 1);

    engine.row_store().heal();
    let report = engine.undo(&verse()).unwrap();
    assert_eq!(report.reinserted, RowId(1));
    assert_eq!(engine.load(&verse()).unwrap().len(), 3);
    assert_eq!(positions(&engine), vec!["1.1", "2.1", "3.1"]);
}

// --- Undo expiry ---

#[test]
fn test_undo_after_ttl_fails_and_changes_nothing() {
    let clock = Arc::new(TestClock(AtomicI64::new(0)));
    let ledger = Arc::new(
        UndoLedger::open(
            Arc::new(MemoryBackend::new()),
            clock.clone(),
            Duration::from_secs(3600),
            10,
        )
        .unwrap(),
    );
    let engine = Engine::with_ledger(MemoryRowStore::new(), quiet_config(), ledger);
    engine
        .bulk_insert(&verse(), vec![row("1", "1.1"), row("1", "2.1")])
        .unwrap();
    engine.delete(&verse(), RowId(1)).unwrap();
    let before = engine.load(&verse()).unwrap();

    clock.0.store(3_600_000_001, Ordering::SeqCst);
    let err = engine.undo(&verse()).unwrap_err();
    assert!(matches!(err, EngineError::UndoExpired { .. }));
    assert_eq!(engine.load(&verse()).unwrap(), before);

    assert_eq!(engine.ledger().sweep().unwrap(), 1);
    assert!(matches!(engine.undo(&verse()), Err(EngineError::NothingToUndo(_))));
}
