//! Index allocation for a newly inserted row.

use super::group;
use crate::error::{EngineError, Result};
use crate::relations::{remap_row, Remap};
use crate::types::{AffectedRow, AnalysisRow, AnvayaNo, IndexMapping, ShiftType};
use tracing::debug;

/// Result of planning an insertion.
#[derive(Clone, Debug)]
pub struct InsertionPlan {
    /// The row to insert, validated.
    pub row: AnalysisRow,
    /// Where it lands.
    pub position: AnvayaNo,
    /// Renumbering applied to its sentence grouping.
    pub mapping: IndexMapping,
    /// The existing rows after renumbering and relation rewriting.
    pub rows: Vec<AnalysisRow>,
    /// Existing rows whose stored fields changed.
    pub changed: Vec<AffectedRow>,
}

/// Compute the shift needed to make room for `new_row`.
///
/// `rows` is the whole verse. Renumbering is limited to the new row's
/// sentence grouping, but relation references are rewritten in every row.
pub fn plan_insertion(
    rows: &[AnalysisRow],
    new_row: AnalysisRow,
    shift: ShiftType,
) -> Result<InsertionPlan> {
    let position = new_row.validate()?;
    let sentno = new_row.sentno.as_str();

    let mut mapping = IndexMapping::new();
    for (_, row) in group(rows, sentno) {
        let Some(current) = row.position() else {
            debug!(anvaya_no = %row.anvaya_no, "skipping row with unparseable anvaya_no");
            continue;
        };
        match shift {
            ShiftType::Main if current.main >= position.main => {
                let main = current.main.checked_add(1).ok_or_else(|| overflow(&row.anvaya_no))?;
                mapping.insert(current, AnvayaNo::new(main, current.sub));
            }
            ShiftType::Sub if current.main == position.main && current.sub >= position.sub => {
                let sub = current.sub.checked_add(1).ok_or_else(|| overflow(&row.anvaya_no))?;
                mapping.insert(current, AnvayaNo::new(current.main, sub));
            }
            ShiftType::None if current == position => {
                return Err(EngineError::DuplicateIndex {
                    sentno: sentno.to_string(),
                    anvaya_no: new_row.anvaya_no.clone(),
                });
            }
            _ => {}
        }
    }

    let remap = Remap::new(&mapping);
    let mut updated = rows.to_vec();
    let mut changed = Vec::new();

    for (original, row) in rows.iter().zip(updated.iter_mut()) {
        if row.deleted {
            continue;
        }
        if row.sentno == sentno {
            if let Some(new) = row.position().and_then(|p| mapping.get(&p)) {
                row.anvaya_no = new.to_string();
            }
        }
        remap_row(row, &remap);
        if row != original {
            changed.push(AffectedRow {
                original: original.clone(),
                updated: row.clone(),
            });
        }
    }

    debug!(
        sentno,
        position = %position,
        ?shift,
        shifted = mapping.len(),
        changed = changed.len(),
        "planned insertion"
    );

    Ok(InsertionPlan {
        row: new_row,
        position,
        mapping,
        rows: updated,
        changed,
    })
}

fn overflow(anvaya_no: &str) -> EngineError {
    EngineError::InvalidAnvaya(format!("{} cannot be shifted any further", anvaya_no))
}
