//! Pure planners for the four verse operations.
//!
//! Each planner takes the loaded rows of one verse and returns the rewritten
//! working set plus whatever the caller needs to persist or undo it. None of
//! them perform I/O.

mod delete;
mod insert;
mod partition;
mod validate;

pub use delete::{plan_deletion, DanglingReference, DeletionPlan};
pub use insert::{plan_insertion, InsertionPlan};
pub use partition::{plan_join, plan_split, Collision, PartitionPlan};
pub use validate::{check_rows, duplicate_indices, InvariantViolation};

use crate::types::AnalysisRow;

/// Live rows belonging to sentence grouping `sentno`.
pub(crate) fn group<'a>(
    rows: &'a [AnalysisRow],
    sentno: &'a str,
) -> impl Iterator<Item = (usize, &'a AnalysisRow)> + 'a {
    rows.iter()
        .enumerate()
        .filter(move |(_, r)| !r.deleted && r.sentno == sentno)
}
