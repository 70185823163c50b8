//! Renumbering after a row is removed.

use super::group;
use crate::error::{EngineError, Result};
use crate::relations::{remap_row, RelationField, Remap};
use crate::types::{AffectedRow, AnalysisRow, AnvayaNo, IndexMapping, RowId};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A relation whose reference was cleared because its target was deleted.
///
/// This is a recognised state, not an error: the relation type is kept and
/// an annotator can point it somewhere else later.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DanglingReference {
    pub row: Option<RowId>,
    pub sentno: String,
    pub anvaya_no: String,
    pub field: RelationField,
    pub relation_type: String,
    pub former_reference: AnvayaNo,
}

/// Result of planning a deletion.
#[derive(Clone, Debug)]
pub struct DeletionPlan {
    /// The deleted row as it was before the operation.
    pub deleted: AnalysisRow,
    /// Renumbering applied to the deleted row's sentence grouping.
    pub mapping: IndexMapping,
    /// Working set with the deleted row tombstoned in place.
    pub rows: Vec<AnalysisRow>,
    /// Surviving rows whose stored fields changed.
    pub affected: Vec<AffectedRow>,
    pub dangling: Vec<DanglingReference>,
}

impl DeletionPlan {
    /// Rows that remain after the deletion.
    pub fn surviving(&self) -> impl Iterator<Item = &AnalysisRow> {
        self.rows.iter().filter(|r| !r.deleted)
    }
}

/// Plan the removal of the row with id `target`.
///
/// If the row was the only occupant of its main slot, every later slot in
/// the sentence grouping moves up by one. Otherwise only its later siblings
/// move up. In every row of the verse, references to moved rows follow
/// them and references to the deleted row are cleared, keeping the type.
pub fn plan_deletion(rows: &[AnalysisRow], target: RowId) -> Result<DeletionPlan> {
    let target_idx = rows
        .iter()
        .position(|r| !r.deleted && r.id == Some(target))
        .ok_or(EngineError::RowNotFound(target))?;
    let deleted = rows[target_idx].clone();
    let sentno = deleted.sentno.as_str();
    let deleted_pos = deleted.position();

    let mut mapping = IndexMapping::new();

    if let Some(pos) = deleted_pos {
        let siblings: Vec<AnvayaNo> = group(rows, sentno)
            .filter(|(i, _)| *i != target_idx)
            .filter_map(|(_, r)| r.position())
            .collect();

        let is_only_item_in_group = !siblings.iter().any(|p| p.main == pos.main);

        for p in &siblings {
            if p.main == pos.main && p.sub > pos.sub {
                mapping.insert(*p, AnvayaNo::new(p.main, p.sub - 1));
            } else if is_only_item_in_group && p.main > pos.main {
                mapping.insert(*p, AnvayaNo::new(p.main - 1, p.sub));
            }
        }
    } else {
        debug!(anvaya_no = %deleted.anvaya_no, "deleting row with unparseable anvaya_no, no renumbering");
    }

    let remap = match deleted_pos {
        Some(pos) => Remap::new(&mapping).clearing(pos),
        None => Remap::new(&mapping),
    };

    let mut updated = rows.to_vec();
    updated[target_idx].deleted = true;

    let mut affected = Vec::new();
    let mut dangling = Vec::new();

    for (original, row) in rows.iter().zip(updated.iter_mut()) {
        if row.deleted {
            continue;
        }
        if row.sentno == sentno {
            if let Some(new) = row.position().and_then(|p| mapping.get(&p)) {
                row.anvaya_no = new.to_string();
            }
        }
        for cleared in remap_row(row, &remap) {
            dangling.push(DanglingReference {
                row: row.id,
                sentno: row.sentno.clone(),
                anvaya_no: row.anvaya_no.clone(),
                field: cleared.field,
                relation_type: cleared.relation_type,
                former_reference: cleared.former_reference,
            });
        }
        if row != original {
            affected.push(AffectedRow {
                original: original.clone(),
                updated: row.clone(),
            });
        }
    }

    debug!(
        sentno,
        anvaya_no = %deleted.anvaya_no,
        renumbered = mapping.len(),
        affected = affected.len(),
        dangling = dangling.len(),
        "planned deletion"
    );

    Ok(DeletionPlan {
        deleted,
        mapping,
        rows: updated,
        affected,
        dangling,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VerseKey;

    fn verse(layout: &[(&str, &str)]) -> Vec<AnalysisRow> {
        layout
            .iter()
            .enumerate()
            .map(|(i, (sentno, anvaya))| {
                AnalysisRow::new(VerseKey::default(), *sentno, *anvaya, format!("w{}", i))
                    .with_id(RowId(i as u64 + 1))
            })
            .collect()
    }

    fn surviving(plan: &DeletionPlan) -> Vec<&str> {
        plan.surviving().map(|r| r.anvaya_no.as_str()).collect()
    }

    #[test]
    fn test_sibling_renumbering() {
        let rows = verse(&[("1", "1.1"), ("1", "1.2"), ("1", "1.3"), ("1", "2.1")]);
        let plan = plan_deletion(&rows, RowId(2)).unwrap();
        assert_eq!(surviving(&plan), vec!["1.1", "1.2", "2.1"]);
        assert_eq!(plan.affected.len(), 1);
        assert_eq!(plan.deleted.anvaya_no, "1.2");
    }

    #[test]
    fn test_whole_slot_collapse() {
        let rows = verse(&[("1", "1.1"), ("1", "2.1"), ("1", "3.1"), ("1", "3.2")]);
        let plan = plan_deletion(&rows, RowId(2)).unwrap();
        assert_eq!(surviving(&plan), vec!["1.1", "2.1", "2.2"]);
    }

    #[test]
    fn test_deleted_row_is_tombstoned_not_removed() {
        let rows = verse(&[("1", "1.1"), ("1", "2.1")]);
        let plan = plan_deletion(&rows, RowId(1)).unwrap();
        assert_eq!(plan.rows.len(), 2);
        assert!(plan.rows[0].deleted);
        assert_eq!(plan.rows[0].anvaya_no, "1.1");
    }

    #[test]
    fn test_other_sentence_untouched() {
        let rows = verse(&[("1", "1.1"), ("1", "2.1"), ("2", "2.1"), ("2", "3.1")]);
        let plan = plan_deletion(&rows, RowId(1)).unwrap();
        assert_eq!(surviving(&plan), vec!["1.1", "2.1", "3.1"]);
    }

    #[test]
    fn test_dangling_reference_keeps_type() {
        let mut rows = verse(&[("1", "1.1"), ("1", "2.1"), ("1", "3.1")]);
        rows[0].kaaraka_sambandha = "karta,2.1;karma,3.1".into();
        let plan = plan_deletion(&rows, RowId(2)).unwrap();
        assert_eq!(plan.rows[0].kaaraka_sambandha, "karta,;karma,2.1");
        assert_eq!(plan.dangling.len(), 1);
        assert_eq!(plan.dangling[0].relation_type, "karta");
        assert_eq!(plan.dangling[0].row, Some(RowId(1)));
        assert_eq!(plan.dangling[0].former_reference, AnvayaNo::new(2, 1));
    }

    #[test]
    fn test_duplicate_occupant_still_clears() {
        let mut rows = verse(&[("1", "1.1"), ("1", "1.1"), ("1", "2.1")]);
        rows[2].kaaraka_sambandha = "karta,1.1".into();
        let plan = plan_deletion(&rows, RowId(1)).unwrap();
        assert_eq!(plan.rows[2].kaaraka_sambandha, "karta,");
        assert_eq!(plan.dangling.len(), 1);
    }

    #[test]
    fn test_clearing_reaches_other_sentences() {
        let mut rows = verse(&[("1", "1.1"), ("1", "2.1"), ("1", "3.1"), ("2", "1.1")]);
        rows[3].kaaraka_sambandha = "karta,2.1;karma,3.1".into();
        let plan = plan_deletion(&rows, RowId(2)).unwrap();
        assert_eq!(plan.rows[3].kaaraka_sambandha, "karta,;karma,2.1");
        assert_eq!(plan.rows[3].anvaya_no, "1.1");
        assert_eq!(plan.dangling.len(), 1);
        assert_eq!(plan.dangling[0].sentno, "2");
    }

    #[test]
    fn test_unknown_row() {
        let rows = verse(&[("1", "1.1")]);
        assert!(matches!(
            plan_deletion(&rows, RowId(99)),
            Err(EngineError::RowNotFound(RowId(99)))
        ));
    }

    #[test]
    fn test_unparseable_target_deletes_without_renumbering() {
        let rows = verse(&[("1", "?"), ("1", "1.1")]);
        let plan = plan_deletion(&rows, RowId(1)).unwrap();
        assert!(plan.mapping.is_empty());
        assert_eq!(surviving(&plan), vec!["1.1"]);
    }
}
