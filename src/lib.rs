//! # Anvaya
//!
//! Reindexing and relation-remapping engine for verse annotation.
//!
//! Each verse is broken into words, and each word is an [`AnalysisRow`]
//! carrying an `anvaya_no` (`"main.sub"`, its place in the sentence's
//! dependency structure) and relation strings that point at other rows by
//! `anvaya_no`. This crate keeps those positions and references consistent
//! as rows are inserted, deleted, moved between sentences, or restored.
//!
//! ## Core Concepts
//!
//! - **Planners** ([`reindex`]): pure functions from a verse's rows to the
//!   rewritten rows for insert, delete, split and join
//! - **Relation codec** ([`relations`]): parse and rewrite `type,ref` lists
//! - **Row store** ([`rows`]): the persistence collaborator, behind a trait
//! - **Undo ledger** ([`ledger`]): TTL-bounded snapshots of deletions
//!
//! ## Example
//!
//! ```ignore
//! use anvaya::{AnalysisRow, Engine, EngineConfig, MemoryRowStore, ShiftType, VerseKey};
//!
//! let engine = Engine::new(MemoryRowStore::new(), EngineConfig::default())?;
//! let verse = VerseKey::new("gita", "1", "1", "2", "47");
//!
//! engine.insert(&verse, AnalysisRow::new(verse.clone(), "1", "1.1", "karmaNi"), ShiftType::Main)?;
//! let added = engine.insert(&verse, AnalysisRow::new(verse.clone(), "1", "1.1", "eva"), ShiftType::Main)?;
//!
//! let deleted = engine.delete(&verse, added.id)?;
//! engine.undo(&verse)?;
//! ```

pub mod engine;
pub mod error;
pub mod ledger;
pub mod reindex;
pub mod relations;
pub mod rows;
pub mod types;

// Re-exports
pub use engine::{DeleteOutcome, Engine, EngineConfig, InsertOutcome, PartitionOutcome, RowEdit};
pub use error::{EngineError, Result, RowStoreError};
pub use ledger::{
    Clock, FileBackend, LedgerBackend, MemoryBackend, RestoreReport, SweeperHandle, SystemClock,
    UndoEntry, UndoLedger, DEFAULT_TTL,
};
pub use reindex::{
    check_rows, plan_deletion, plan_insertion, plan_join, plan_split, Collision,
    DanglingReference, DeletionPlan, InsertionPlan, InvariantViolation, PartitionPlan,
};
pub use relations::{remap_row, Delimiter, RelationEntry, RelationField, RelationList, Remap};
pub use rows::{MemoryRowStore, RowStore};
pub use types::*;
