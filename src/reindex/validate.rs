//! Invariant checks over a verse's rows.

use crate::relations::{RelationField, RelationList};
use crate::types::{AnalysisRow, AnvayaNo, RowId};
use std::collections::{BTreeMap, BTreeSet};

/// A broken invariant found by [`check_rows`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InvariantViolation {
    /// Two or more rows of one sentence grouping share an `anvaya_no`.
    DuplicateIndex {
        sentno: String,
        anvaya_no: AnvayaNo,
        rows: Vec<Option<RowId>>,
    },
    /// Main numbers in a sentence grouping skip `missing`.
    MainGap { sentno: String, missing: u32 },
    /// A relation names an `anvaya_no` not present in the row's grouping.
    UnresolvedReference {
        row: Option<RowId>,
        sentno: String,
        field: RelationField,
        reference: AnvayaNo,
    },
    /// `anvaya_no` is not of the form `main.sub`.
    UnparseableIndex {
        row: Option<RowId>,
        anvaya_no: String,
    },
}

/// Positions used more than once, per sentence grouping.
pub fn duplicate_indices(rows: &[AnalysisRow]) -> BTreeMap<(String, AnvayaNo), Vec<Option<RowId>>> {
    let mut seen: BTreeMap<(String, AnvayaNo), Vec<Option<RowId>>> = BTreeMap::new();
    for row in rows.iter().filter(|r| !r.deleted) {
        if let Some(pos) = row.position() {
            seen.entry((row.sentno.clone(), pos)).or_default().push(row.id);
        }
    }
    seen.retain(|_, ids| ids.len() > 1);
    seen
}

/// Report every uniqueness, contiguity and reference violation.
///
/// Dangling-but-typed references (`"karta,"`) are a valid state and are not
/// reported.
pub fn check_rows(rows: &[AnalysisRow]) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();

    for ((sentno, anvaya_no), ids) in duplicate_indices(rows) {
        violations.push(InvariantViolation::DuplicateIndex {
            sentno,
            anvaya_no,
            rows: ids,
        });
    }

    let mut positions: BTreeMap<&str, BTreeSet<AnvayaNo>> = BTreeMap::new();
    for row in rows.iter().filter(|r| !r.deleted) {
        match row.position() {
            Some(pos) => {
                positions.entry(row.sentno.as_str()).or_default().insert(pos);
            }
            None => violations.push(InvariantViolation::UnparseableIndex {
                row: row.id,
                anvaya_no: row.anvaya_no.clone(),
            }),
        }
    }

    for (sentno, used) in &positions {
        let mains: BTreeSet<u32> = used.iter().map(|p| p.main).collect();
        let max = mains.iter().next_back().copied().unwrap_or(0);
        for missing in (1..=max).filter(|m| !mains.contains(m)) {
            violations.push(InvariantViolation::MainGap {
                sentno: sentno.to_string(),
                missing,
            });
        }
    }

    for row in rows.iter().filter(|r| !r.deleted) {
        let used = positions.get(row.sentno.as_str());
        for field in RelationField::ALL {
            let list = RelationList::parse(field.get(row), field.delimiter());
            for reference in list.references() {
                if !used.is_some_and(|u| u.contains(&reference)) {
                    violations.push(InvariantViolation::UnresolvedReference {
                        row: row.id,
                        sentno: row.sentno.clone(),
                        field,
                        reference,
                    });
                }
            }
        }
    }

    violations
}
