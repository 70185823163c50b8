//! In-memory row store.

use super::RowStore;
use crate::error::{EngineError, Result, RowStoreError};
use crate::types::{AnalysisRow, RowId, VerseKey};
use parking_lot::RwLock;
use std::collections::BTreeMap;

#[derive(Default)]
struct Tables {
    rows: BTreeMap<RowId, AnalysisRow>,
    next_id: u64,
}

/// A [`RowStore`] held entirely in memory.
///
/// Inserting a row that already carries an unused id keeps that id, so a
/// deleted row restored from the undo ledger comes back under its old id.
#[derive(Default)]
pub struct MemoryRowStore {
    tables: RwLock<Tables>,
}

impl MemoryRowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from a JSON array of rows.
    pub fn from_json(json: &str) -> Result<Self> {
        let rows: Vec<AnalysisRow> = serde_json::from_str(json)
            .map_err(|e| EngineError::Deserialization(e.to_string()))?;
        let store = Self::new();
        for row in &rows {
            store.insert_row(row).map_err(EngineError::store)?;
        }
        Ok(store)
    }

    /// Dump every row as a JSON array, ordered by id.
    pub fn to_json(&self) -> Result<String> {
        let tables = self.tables.read();
        let rows: Vec<&AnalysisRow> = tables.rows.values().collect();
        Ok(serde_json::to_string_pretty(&rows)?)
    }

    pub fn get(&self, id: RowId) -> Option<AnalysisRow> {
        self.tables.read().rows.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.tables.read().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RowStore for MemoryRowStore {
    fn find_rows(&self, verse: &VerseKey) -> std::result::Result<Vec<AnalysisRow>, RowStoreError> {
        Ok(self
            .tables
            .read()
            .rows
            .values()
            .filter(|r| &r.verse == verse)
            .cloned()
            .collect())
    }

    fn insert_row(&self, row: &AnalysisRow) -> std::result::Result<RowId, RowStoreError> {
        let mut tables = self.tables.write();
        let id = match row.id {
            Some(id) if !tables.rows.contains_key(&id) => id,
            _ => RowId(tables.next_id + 1),
        };
        tables.next_id = tables.next_id.max(id.0);

        let mut stored = row.clone();
        stored.id = Some(id);
        stored.deleted = false;
        tables.rows.insert(id, stored);
        Ok(id)
    }

    fn update_row(&self, id: RowId, row: &AnalysisRow) -> std::result::Result<(), RowStoreError> {
        let mut tables = self.tables.write();
        let slot = tables.rows.get_mut(&id).ok_or(RowStoreError::NotFound(id))?;
        *slot = row.clone();
        slot.id = Some(id);
        slot.deleted = false;
        Ok(())
    }

    fn delete_row(&self, id: RowId) -> std::result::Result<(), RowStoreError> {
        self.tables
            .write()
            .rows
            .remove(&id)
            .map(|_| ())
            .ok_or(RowStoreError::NotFound(id))
    }
}
