//! Core types for the reindexing engine.

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Identifier assigned to a row by the row store.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RowId(pub u64);

impl fmt::Debug for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RowId({})", self.0)
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of a word in its sentence's dependency structure, `"<main>.<sub>"`.
///
/// `main` is the clause-level slot and `sub` the sibling order inside it.
/// Both are positive. Only the canonical decimal form is accepted, so a
/// parsed value always prints back to the exact text it came from.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AnvayaNo {
    pub main: u32,
    pub sub: u32,
}

impl AnvayaNo {
    pub fn new(main: u32, sub: u32) -> Self {
        Self { main, sub }
    }

    /// Parse `"<main>.<sub>"`, returning `None` for anything non-canonical.
    pub fn parse(s: &str) -> Option<Self> {
        let (main, sub) = s.split_once('.')?;
        Some(Self {
            main: parse_component(main)?,
            sub: parse_component(sub)?,
        })
    }
}

fn parse_component(s: &str) -> Option<u32> {
    if s.is_empty() || s.starts_with('0') || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

impl FromStr for AnvayaNo {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AnvayaNo::parse(s).ok_or_else(|| EngineError::InvalidAnvaya(s.to_string()))
    }
}

impl fmt::Debug for AnvayaNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Anvaya({}.{})", self.main, self.sub)
    }
}

impl fmt::Display for AnvayaNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.main, self.sub)
    }
}

/// Location of a verse: book / part1 / part2 / chapter / verse number.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default, Serialize, Deserialize)]
pub struct VerseKey {
    pub book: String,
    pub part1: String,
    pub part2: String,
    pub chapter: String,
    pub verse: String,
}

impl VerseKey {
    pub fn new(
        book: impl Into<String>,
        part1: impl Into<String>,
        part2: impl Into<String>,
        chapter: impl Into<String>,
        verse: impl Into<String>,
    ) -> Self {
        Self {
            book: book.into(),
            part1: part1.into(),
            part2: part2.into(),
            chapter: chapter.into(),
            verse: verse.into(),
        }
    }
}

impl fmt::Display for VerseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}/{}",
            self.book, self.part1, self.part2, self.chapter, self.verse
        )
    }
}

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp(duration.as_micros() as i64)
    }

    /// Time elapsed between `self` and `now` (zero if `now` is earlier).
    pub fn age_at(self, now: Timestamp) -> Duration {
        Duration::from_micros(now.0.saturating_sub(self.0).max(0) as u64)
    }

    pub fn plus(self, d: Duration) -> Timestamp {
        Timestamp(self.0.saturating_add(d.as_micros() as i64))
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// How existing rows make room for an inserted row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShiftType {
    /// Open a new main slot: rows with `main >= new.main` move down one slot.
    Main,
    /// Insert a sibling: rows in the same slot with `sub >= new.sub` shift by one.
    Sub,
    /// Renumber nothing; the caller guarantees the index is free.
    None,
}

impl FromStr for ShiftType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "main" => Ok(ShiftType::Main),
            "sub" => Ok(ShiftType::Sub),
            "none" | "" => Ok(ShiftType::None),
            other => Err(EngineError::Validation(format!(
                "unknown shift type {:?}",
                other
            ))),
        }
    }
}

/// One word's annotation within one verse.
///
/// Only `sentno`, `anvaya_no` and the two relation strings are interpreted
/// by the engine. The rest is payload carried through untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRow {
    /// Assigned by the row store; `None` before first insert.
    pub id: Option<RowId>,
    pub verse: VerseKey,
    pub sentno: String,
    pub anvaya_no: String,
    pub word: String,
    pub poem: String,
    pub morph_analysis: String,
    pub morph_in_context: String,
    /// `;`-separated `"<type>,<anvaya_no>"` pairs.
    pub kaaraka_sambandha: String,
    /// `#`-separated `"<type>,<anvaya_no>"` pairs.
    pub possible_relations: String,
    pub hindi_meaning: String,
    pub english_meaning: String,
    pub samasa: String,
    pub prayoga: String,
    pub sarvanama: String,
    pub name_classification: String,
    /// Any further columns the surrounding system stores.
    pub extra: BTreeMap<String, String>,
    /// Tombstone used only inside an in-progress operation.
    #[serde(skip)]
    pub deleted: bool,
}

impl AnalysisRow {
    /// Create a row with the fields the engine requires.
    pub fn new(
        verse: VerseKey,
        sentno: impl Into<String>,
        anvaya_no: impl Into<String>,
        word: impl Into<String>,
    ) -> Self {
        Self {
            verse,
            sentno: sentno.into(),
            anvaya_no: anvaya_no.into(),
            word: word.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: RowId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_kaaraka(mut self, relations: impl Into<String>) -> Self {
        self.kaaraka_sambandha = relations.into();
        self
    }

    pub fn with_possible(mut self, relations: impl Into<String>) -> Self {
        self.possible_relations = relations.into();
        self
    }

    /// Parsed `anvaya_no`, if canonical.
    pub fn position(&self) -> Option<AnvayaNo> {
        AnvayaNo::parse(&self.anvaya_no)
    }

    /// Check the fields that must be present before a row can be inserted.
    pub fn validate(&self) -> Result<AnvayaNo, EngineError> {
        if self.word.trim().is_empty() {
            return Err(EngineError::Validation("word is empty".into()));
        }
        if self.sentno.trim().is_empty() {
            return Err(EngineError::Validation("sentno is empty".into()));
        }
        if self.anvaya_no.trim().is_empty() {
            return Err(EngineError::Validation("anvaya_no is empty".into()));
        }
        self.anvaya_no.parse()
    }
}

/// Old to new `anvaya_no` values within one sentence grouping.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IndexMapping {
    moves: BTreeMap<AnvayaNo, AnvayaNo>,
}

impl IndexMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, old: AnvayaNo, new: AnvayaNo) {
        if old != new {
            self.moves.insert(old, new);
        }
    }

    pub fn get(&self, old: &AnvayaNo) -> Option<AnvayaNo> {
        self.moves.get(old).copied()
    }

    pub fn len(&self) -> usize {
        self.moves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    /// Moves in ascending order of the old value.
    pub fn iter(&self) -> impl Iterator<Item = (AnvayaNo, AnvayaNo)> + '_ {
        self.moves.iter().map(|(k, v)| (*k, *v))
    }
}

/// A row before and after an operation rewrote it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffectedRow {
    pub original: AnalysisRow,
    pub updated: AnalysisRow,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anvaya_parse() {
        assert_eq!(AnvayaNo::parse("1.2"), Some(AnvayaNo::new(1, 2)));
        assert_eq!(AnvayaNo::parse("12.10"), Some(AnvayaNo::new(12, 10)));
        assert_eq!(AnvayaNo::parse("1"), None);
        assert_eq!(AnvayaNo::parse("0.1"), None);
        assert_eq!(AnvayaNo::parse("01.1"), None);
        assert_eq!(AnvayaNo::parse("1.2.3"), None);
        assert_eq!(AnvayaNo::parse(" 1.2"), None);
        assert_eq!(AnvayaNo::parse(""), None);
    }

    #[test]
    fn test_anvaya_display_matches_input() {
        for s in ["1.1", "3.14", "10.2"] {
            assert_eq!(AnvayaNo::parse(s).unwrap().to_string(), s);
        }
    }

    #[test]
    fn test_anvaya_ordering() {
        let mut v = vec![AnvayaNo::new(2, 1), AnvayaNo::new(1, 3), AnvayaNo::new(1, 1)];
        v.sort();
        assert_eq!(
            v,
            vec![AnvayaNo::new(1, 1), AnvayaNo::new(1, 3), AnvayaNo::new(2, 1)]
        );
    }

    #[test]
    fn test_validate_required_fields() {
        let verse = VerseKey::default();
        assert!(AnalysisRow::new(verse.clone(), "1", "1.1", "rAmaH").validate().is_ok());
        assert!(matches!(
            AnalysisRow::new(verse.clone(), "1", "1.1", "").validate(),
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            AnalysisRow::new(verse.clone(), "", "1.1", "rAmaH").validate(),
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            AnalysisRow::new(verse.clone(), "1", "", "rAmaH").validate(),
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            AnalysisRow::new(verse, "1", "x", "rAmaH").validate(),
            Err(EngineError::InvalidAnvaya(_))
        ));
    }

    #[test]
    fn test_mapping_ignores_identity() {
        let mut m = IndexMapping::new();
        m.insert(AnvayaNo::new(1, 1), AnvayaNo::new(1, 1));
        assert!(m.is_empty());
        m.insert(AnvayaNo::new(1, 2), AnvayaNo::new(1, 1));
        assert_eq!(m.get(&AnvayaNo::new(1, 2)), Some(AnvayaNo::new(1, 1)));
    }

    #[test]
    fn test_timestamp_age() {
        let t = Timestamp(1_000_000);
        assert_eq!(t.age_at(Timestamp(3_000_000)), Duration::from_secs(2));
        assert_eq!(t.age_at(Timestamp(0)), Duration::ZERO);
        assert_eq!(t.plus(Duration::from_secs(1)), Timestamp(2_000_000));
    }

    #[test]
    fn test_shift_type_from_str() {
        assert_eq!("main".parse::<ShiftType>().unwrap(), ShiftType::Main);
        assert_eq!("sub".parse::<ShiftType>().unwrap(), ShiftType::Sub);
        assert_eq!("none".parse::<ShiftType>().unwrap(), ShiftType::None);
        assert!("sideways".parse::<ShiftType>().is_err());
    }
}
