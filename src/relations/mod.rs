//! Relation strings embedded in each row.
//!
//! `kaaraka_sambandha` and `possible_relations` hold delimited lists of
//! `"<relationType>,<anvaya_no>"` pairs. They are parsed into
//! [`RelationList`] for rewriting and serialized back only at the row
//! boundary. Pairs that do not parse are carried as
//! [`RelationEntry::Malformed`] and written back byte-identical.

mod codec;

pub use codec::{
    remap_row, ClearedReference, Delimiter, RelationEntry, RelationField, RelationList, Remap,
};
