//! Moving rows between sentence groupings.
//!
//! Split and join only relocate rows. `anvaya_no` values are kept as they
//! are and relation references are not retargeted, so the target grouping
//! may end up with duplicate positions or gaps. Those collisions are
//! reported in [`PartitionPlan::collisions`] and left for the annotator.

use super::validate::duplicate_indices;
use crate::error::{EngineError, Result};
use crate::types::{AffectedRow, AnalysisRow, AnvayaNo, RowId};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Two or more rows sharing a position after a relocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Collision {
    pub sentno: String,
    pub anvaya_no: AnvayaNo,
    pub rows: Vec<Option<RowId>>,
}

/// Result of planning a split or join.
#[derive(Clone, Debug)]
pub struct PartitionPlan {
    pub target_sentno: String,
    pub rows: Vec<AnalysisRow>,
    pub moved: Vec<AffectedRow>,
    pub collisions: Vec<Collision>,
}

/// Move the rows in `ids` (all from one sentence grouping) to `target_sentno`.
pub fn plan_split(rows: &[AnalysisRow], ids: &[RowId], target_sentno: &str) -> Result<PartitionPlan> {
    if target_sentno.trim().is_empty() {
        return Err(EngineError::Validation("target sentno is empty".into()));
    }
    if ids.is_empty() {
        return Err(EngineError::Validation("no rows selected for split".into()));
    }

    let mut source: Option<&str> = None;
    for id in ids {
        let row = rows
            .iter()
            .find(|r| !r.deleted && r.id == Some(*id))
            .ok_or(EngineError::RowNotFound(*id))?;
        match source {
            None => source = Some(row.sentno.as_str()),
            Some(s) if s != row.sentno => {
                return Err(EngineError::Validation(format!(
                    "selected rows span sentences {} and {}",
                    s, row.sentno
                )));
            }
            Some(_) => {}
        }
    }

    let selected: HashSet<RowId> = ids.iter().copied().collect();
    relocate(rows, target_sentno, |row| {
        row.id.is_some_and(|id| selected.contains(&id))
    })
}

/// Move every row of both `sources` into `target_sentno`.
pub fn plan_join(rows: &[AnalysisRow], sources: &[&str], target_sentno: &str) -> Result<PartitionPlan> {
    if target_sentno.trim().is_empty() {
        return Err(EngineError::Validation("target sentno is empty".into()));
    }
    let [first, second] = sources else {
        return Err(EngineError::Validation(format!(
            "join needs exactly two source sentences, got {}",
            sources.len()
        )));
    };
    if first == second {
        return Err(EngineError::Validation(format!(
            "cannot join sentence {} with itself",
            first
        )));
    }
    for s in [first, second] {
        if !rows.iter().any(|r| !r.deleted && r.sentno == *s) {
            return Err(EngineError::Validation(format!("sentence {} has no rows", s)));
        }
    }

    relocate(rows, target_sentno, |row| {
        row.sentno == *first || row.sentno == *second
    })
}

fn relocate(
    rows: &[AnalysisRow],
    target_sentno: &str,
    selected: impl Fn(&AnalysisRow) -> bool,
) -> Result<PartitionPlan> {
    let mut updated = rows.to_vec();
    let mut moved = Vec::new();

    for (original, row) in rows.iter().zip(updated.iter_mut()) {
        if row.deleted || !selected(original) || row.sentno == target_sentno {
            continue;
        }
        row.sentno = target_sentno.to_string();
        moved.push(AffectedRow {
            original: original.clone(),
            updated: row.clone(),
        });
    }

    let collisions: Vec<Collision> = duplicate_indices(&updated)
        .into_iter()
        .filter(|((sentno, _), _)| sentno == target_sentno)
        .map(|((sentno, anvaya_no), rows)| Collision {
            sentno,
            anvaya_no,
            rows,
        })
        .collect();

    if !collisions.is_empty() {
        warn!(
            target_sentno,
            collisions = collisions.len(),
            "relocation left duplicate anvaya numbers; not renumbering"
        );
    }
    debug!(target_sentno, moved = moved.len(), "planned relocation");

    Ok(PartitionPlan {
        target_sentno: target_sentno.to_string(),
        rows: updated,
        moved,
        collisions,
    })
}
