//! Parse, rewrite and serialize relation lists.

use crate::types::{AnalysisRow, AnvayaNo, IndexMapping};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator between pairs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delimiter {
    /// `;` for `kaaraka_sambandha`.
    Kaaraka,
    /// `#` for `possible_relations`.
    Possible,
}

impl Delimiter {
    pub fn as_char(self) -> char {
        match self {
            Delimiter::Kaaraka => ';',
            Delimiter::Possible => '#',
        }
    }
}

/// Which relation column of a row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationField {
    KaarakaSambandha,
    PossibleRelations,
}

impl RelationField {
    pub fn delimiter(self) -> Delimiter {
        match self {
            RelationField::KaarakaSambandha => Delimiter::Kaaraka,
            RelationField::PossibleRelations => Delimiter::Possible,
        }
    }

    pub fn get(self, row: &AnalysisRow) -> &str {
        match self {
            RelationField::KaarakaSambandha => &row.kaaraka_sambandha,
            RelationField::PossibleRelations => &row.possible_relations,
        }
    }

    fn get_mut(self, row: &mut AnalysisRow) -> &mut String {
        match self {
            RelationField::KaarakaSambandha => &mut row.kaaraka_sambandha,
            RelationField::PossibleRelations => &mut row.possible_relations,
        }
    }

    pub const ALL: [RelationField; 2] = [
        RelationField::KaarakaSambandha,
        RelationField::PossibleRelations,
    ];
}

/// One `"<type>,<ref>"` item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelationEntry {
    /// Well-formed pair. `reference` is `None` when the reference was
    /// cleared (dangling-but-typed).
    Pair {
        relation_type: String,
        reference: Option<AnvayaNo>,
    },
    /// Anything else, kept verbatim.
    Malformed(String),
}

impl RelationEntry {
    pub fn parse(s: &str) -> Self {
        let Some((relation_type, reference)) = s.split_once(',') else {
            return RelationEntry::Malformed(s.to_string());
        };
        if reference.is_empty() {
            return RelationEntry::Pair {
                relation_type: relation_type.to_string(),
                reference: None,
            };
        }
        match AnvayaNo::parse(reference) {
            Some(anvaya) => RelationEntry::Pair {
                relation_type: relation_type.to_string(),
                reference: Some(anvaya),
            },
            None => RelationEntry::Malformed(s.to_string()),
        }
    }

    pub fn reference(&self) -> Option<AnvayaNo> {
        match self {
            RelationEntry::Pair { reference, .. } => *reference,
            RelationEntry::Malformed(_) => None,
        }
    }
}

impl fmt::Display for RelationEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationEntry::Pair {
                relation_type,
                reference: Some(r),
            } => write!(f, "{},{}", relation_type, r),
            RelationEntry::Pair {
                relation_type,
                reference: None,
            } => write!(f, "{},", relation_type),
            RelationEntry::Malformed(raw) => f.write_str(raw),
        }
    }
}

/// A parsed relation string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelationList {
    delimiter: Delimiter,
    entries: Vec<RelationEntry>,
}

/// Substitutions to apply to references.
#[derive(Clone, Copy, Debug)]
pub struct Remap<'a> {
    pub mapping: &'a IndexMapping,
    /// Reference to clear (the deleted row's original value).
    pub cleared: Option<AnvayaNo>,
}

impl<'a> Remap<'a> {
    pub fn new(mapping: &'a IndexMapping) -> Self {
        Self {
            mapping,
            cleared: None,
        }
    }

    pub fn clearing(mut self, anvaya: AnvayaNo) -> Self {
        self.cleared = Some(anvaya);
        self
    }
}

/// A reference cleared by a deletion; the relation type survives.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearedReference {
    pub field: RelationField,
    pub relation_type: String,
    pub former_reference: AnvayaNo,
}

impl RelationList {
    pub fn parse(s: &str, delimiter: Delimiter) -> Self {
        let entries = if s.is_empty() {
            Vec::new()
        } else {
            s.split(delimiter.as_char())
                .map(RelationEntry::parse)
                .collect()
        };
        Self { delimiter, entries }
    }

    pub fn entries(&self) -> &[RelationEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolved references, in order.
    pub fn references(&self) -> impl Iterator<Item = AnvayaNo> + '_ {
        self.entries.iter().filter_map(RelationEntry::reference)
    }

    /// Apply `remap` to every pair in a single pass, so a value that is
    /// both cleared and the target of another move is handled correctly.
    /// Returns `(rewritten, cleared)`.
    pub fn remap(&mut self, remap: &Remap<'_>) -> (usize, Vec<(String, AnvayaNo)>) {
        let mut rewritten = 0;
        let mut cleared = Vec::new();

        for entry in &mut self.entries {
            let RelationEntry::Pair {
                relation_type,
                reference,
            } = entry
            else {
                continue;
            };
            let Some(current) = *reference else {
                continue;
            };

            if remap.cleared == Some(current) {
                *reference = None;
                cleared.push((relation_type.clone(), current));
            } else if let Some(new) = remap.mapping.get(&current) {
                *reference = Some(new);
                rewritten += 1;
            }
        }

        (rewritten, cleared)
    }
}

impl fmt::Display for RelationList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sep = self.delimiter.as_char();
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", sep)?;
            }
            write!(f, "{}", entry)?;
        }
        Ok(())
    }
}

/// Rewrite both relation columns of `row` in place.
///
/// Returns the references that were cleared. Columns with nothing to change
/// are left untouched.
pub fn remap_row(row: &mut AnalysisRow, remap: &Remap<'_>) -> Vec<ClearedReference> {
    let mut cleared_refs = Vec::new();

    for field in RelationField::ALL {
        let raw = field.get(row);
        if raw.is_empty() {
            continue;
        }
        let mut list = RelationList::parse(raw, field.delimiter());
        let (rewritten, cleared) = list.remap(remap);
        if rewritten == 0 && cleared.is_empty() {
            continue;
        }
        *field.get_mut(row) = list.to_string();
        cleared_refs.extend(cleared.into_iter().map(|(relation_type, former)| {
            ClearedReference {
                field,
                relation_type,
                former_reference: former,
            }
        }));
    }

    cleared_refs
}
