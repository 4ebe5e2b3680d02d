//! Record identifiers
//!
//! This module defines the composite record identifier used throughout the
//! system: a logical table name plus a per-table uid. A uid of zero is the
//! "no record" / root sentinel; negative uids denote static sentinel values
//! that are carried through import unresolved.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel uid denoting "no record" / tree root
pub const UID_NONE: i64 = 0;

/// Composite record identifier: `(table, uid)`
///
/// Tables are logical record types; `uid` is unique per table. RecordIds are
/// the keys of the Document's record map and of the import mapping, and they
/// define the visited-set identity for the relation closure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId {
    /// Logical table (record type) name
    pub table: String,
    /// Per-table unique identifier; 0 is the "no record" sentinel
    pub uid: i64,
}

impl RecordId {
    /// Create a new record identifier
    pub fn new(table: impl Into<String>, uid: i64) -> Self {
        Self {
            table: table.into(),
            uid,
        }
    }

    /// True if this identifier points at no record (zero uid or empty table)
    pub fn is_none(&self) -> bool {
        self.uid == UID_NONE || self.table.is_empty()
    }

    /// Parse a `table:uid` selector string
    ///
    /// Returns None if the string is not of the form `name:integer`.
    pub fn parse(s: &str) -> Option<Self> {
        let (table, uid) = s.rsplit_once(':')?;
        if table.is_empty() {
            return None;
        }
        let uid = uid.parse::<i64>().ok()?;
        Some(Self::new(table, uid))
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.table, self.uid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_roundtrip() {
        let id = RecordId::new("pages", 42);
        assert_eq!(id.to_string(), "pages:42");
        assert_eq!(RecordId::parse("pages:42"), Some(id));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert_eq!(RecordId::parse("pages"), None);
        assert_eq!(RecordId::parse(":1"), None);
        assert_eq!(RecordId::parse("pages:abc"), None);
    }

    #[test]
    fn test_parse_negative_uid() {
        // Negative uids are static sentinel values; the selector syntax
        // still accepts them.
        assert_eq!(
            RecordId::parse("languages:-1"),
            Some(RecordId::new("languages", -1))
        );
    }

    #[test]
    fn test_is_none() {
        assert!(RecordId::new("pages", UID_NONE).is_none());
        assert!(RecordId::new("", 5).is_none());
        assert!(!RecordId::new("pages", 5).is_none());
    }

    #[test]
    fn test_ordering_by_table_then_uid() {
        let a = RecordId::new("content", 9);
        let b = RecordId::new("pages", 1);
        let c = RecordId::new("pages", 2);
        assert!(a < b);
        assert!(b < c);
    }
}
