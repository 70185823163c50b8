//! Row persistence.
//!
//! The engine never talks to storage directly; it goes through
//! [`RowStore`]. The surrounding system supplies the real implementation.
//! [`MemoryRowStore`] is provided for embedding and tests.

mod memory;

pub use memory::MemoryRowStore;

use crate::error::RowStoreError;
use crate::types::{AnalysisRow, RowId, VerseKey};

/// Durable keyed storage of annotation rows.
///
/// No transactions are assumed. Each call either succeeds or fails on its
/// own; concurrent writers resolve by last-write-wins.
pub trait RowStore: Send + Sync {
    /// All rows of one verse, in storage order.
    fn find_rows(&self, verse: &VerseKey) -> std::result::Result<Vec<AnalysisRow>, RowStoreError>;

    /// Insert a row and return the id it is stored under.
    fn insert_row(&self, row: &AnalysisRow) -> std::result::Result<RowId, RowStoreError>;

    /// Overwrite the stored fields of row `id`.
    fn update_row(&self, id: RowId, row: &AnalysisRow) -> std::result::Result<(), RowStoreError>;

    fn delete_row(&self, id: RowId) -> std::result::Result<(), RowStoreError>;
}

impl<S: RowStore + ?Sized> RowStore for std::sync::Arc<S> {
    fn find_rows(&self, verse: &VerseKey) -> std::result::Result<Vec<AnalysisRow>, RowStoreError> {
        (**self).find_rows(verse)
    }

    fn insert_row(&self, row: &AnalysisRow) -> std::result::Result<RowId, RowStoreError> {
        (**self).insert_row(row)
    }

    fn update_row(&self, id: RowId, row: &AnalysisRow) -> std::result::Result<(), RowStoreError> {
        (**self).update_row(id, row)
    }

    fn delete_row(&self, id: RowId) -> std::result::Result<(), RowStoreError> {
        (**self).delete_row(id)
    }
}
