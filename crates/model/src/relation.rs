//! Relation entries
//!
//! A record's discovered relations are stored per field as a tagged
//! `RelationEntry`. Three kinds exist: direct record references, file
//! references, and structured entries whose relations live at paths inside a
//! self-describing field value. Any entry may additionally carry soft
//! references: substitution points found by scanning text content rather
//! than by schema.

use serde::{Deserialize, Serialize};
use sitepack_core::RecordId;
use std::collections::BTreeMap;

use crate::digest::FileId;

/// What a soft-reference token substitutes to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Substitution {
    /// A record reference, remapped through the import mapping
    Record(RecordId),
    /// A file blob by content digest, materialized into the target on import
    File(FileId),
    /// An opaque literal carried through unchanged
    Literal(String),
}

/// One soft reference discovered in text content
///
/// Export replaces the matched text with a `{softref:<token_id>}` marker in
/// the stored field value; import regenerates the text by substituting each
/// token according to its configured mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftRef {
    /// Token identity, unique within the Document
    pub token_id: String,
    /// The original matched text
    pub matched: String,
    /// Resolved substitution target
    pub substitution: Substitution,
}

/// Kind-specific payload of a relation entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationKind {
    /// Hard foreign-key-style references, in source order
    Direct {
        /// Referenced records
        items: Vec<RecordId>,
    },
    /// References to binary assets, in source order
    File {
        /// Referenced blobs by content digest
        items: Vec<FileId>,
    },
    /// Relations nested inside a structured field value
    Structured {
        /// Path (dot separated) → nested entry
        child_relations: BTreeMap<String, RelationEntry>,
        /// Path → soft references found in text at that path
        child_soft_refs: BTreeMap<String, Vec<SoftRef>>,
    },
}

/// One field's discovered relations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationEntry {
    /// Kind-specific payload
    pub kind: RelationKind,
    /// Soft references found in this field's own text
    pub soft_refs: Vec<SoftRef>,
}

impl RelationEntry {
    /// Direct entry over the given items
    ///
    /// An empty item list is meaningful: the field had relation
    /// configuration that resolved to nothing.
    pub fn direct(items: Vec<RecordId>) -> Self {
        Self {
            kind: RelationKind::Direct { items },
            soft_refs: Vec::new(),
        }
    }

    /// File entry over the given digests
    pub fn file(items: Vec<FileId>) -> Self {
        Self {
            kind: RelationKind::File { items },
            soft_refs: Vec::new(),
        }
    }

    /// Structured entry
    pub fn structured(
        child_relations: BTreeMap<String, RelationEntry>,
        child_soft_refs: BTreeMap<String, Vec<SoftRef>>,
    ) -> Self {
        Self {
            kind: RelationKind::Structured {
                child_relations,
                child_soft_refs,
            },
            soft_refs: Vec::new(),
        }
    }

    /// Builder: attach soft references
    pub fn with_soft_refs(mut self, soft_refs: Vec<SoftRef>) -> Self {
        self.soft_refs = soft_refs;
        self
    }

    /// Direct items, if this is a direct entry
    pub fn direct_items(&self) -> Option<&[RecordId]> {
        match &self.kind {
            RelationKind::Direct { items } => Some(items),
            _ => None,
        }
    }

    /// File items, if this is a file entry
    pub fn file_items(&self) -> Option<&[FileId]> {
        match &self.kind {
            RelationKind::File { items } => Some(items),
            _ => None,
        }
    }

    /// Every direct record reference in this entry, including nested
    /// structured children and soft-reference record substitutions
    pub fn referenced_records(&self) -> Vec<&RecordId> {
        let mut out = Vec::new();
        self.collect_records(&mut out);
        out
    }

    fn collect_records<'a>(&'a self, out: &mut Vec<&'a RecordId>) {
        match &self.kind {
            RelationKind::Direct { items } => out.extend(items.iter()),
            RelationKind::File { .. } => {}
            RelationKind::Structured {
                child_relations,
                child_soft_refs,
            } => {
                for child in child_relations.values() {
                    child.collect_records(out);
                }
                for refs in child_soft_refs.values() {
                    for soft in refs {
                        if let Substitution::Record(id) = &soft.substitution {
                            out.push(id);
                        }
                    }
                }
            }
        }
        for soft in &self.soft_refs {
            if let Substitution::Record(id) = &soft.substitution {
                out.push(id);
            }
        }
    }

    /// Every file reference in this entry, including nested children
    pub fn referenced_files(&self) -> Vec<&FileId> {
        let mut out = Vec::new();
        self.collect_files(&mut out);
        out
    }

    fn collect_files<'a>(&'a self, out: &mut Vec<&'a FileId>) {
        match &self.kind {
            RelationKind::Direct { .. } => {}
            RelationKind::File { items } => out.extend(items.iter()),
            RelationKind::Structured {
                child_relations, ..
            } => {
                for child in child_relations.values() {
                    child.collect_files(out);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn soft_record(token: &str, table: &str, uid: i64) -> SoftRef {
        SoftRef {
            token_id: token.to_string(),
            matched: format!("rec://{table}/{uid}"),
            substitution: Substitution::Record(RecordId::new(table, uid)),
        }
    }

    #[test]
    fn test_empty_direct_entry_is_retained_shape() {
        let entry = RelationEntry::direct(vec![]);
        assert_eq!(entry.direct_items(), Some(&[][..]));
        assert!(entry.referenced_records().is_empty());
    }

    #[test]
    fn test_referenced_records_includes_soft_refs() {
        let entry = RelationEntry::direct(vec![RecordId::new("pages", 1)])
            .with_soft_refs(vec![soft_record("t1", "content", 5)]);
        let refs = entry.referenced_records();
        assert_eq!(refs.len(), 2);
        assert!(refs.contains(&&RecordId::new("content", 5)));
    }

    #[test]
    fn test_structured_collects_nested() {
        let nested = RelationEntry::direct(vec![RecordId::new("pages", 9)]);
        let entry = RelationEntry::structured(
            BTreeMap::from([("settings.link".to_string(), nested)]),
            BTreeMap::from([(
                "settings.body".to_string(),
                vec![soft_record("t2", "pages", 4)],
            )]),
        );
        let refs = entry.referenced_records();
        assert!(refs.contains(&&RecordId::new("pages", 9)));
        assert!(refs.contains(&&RecordId::new("pages", 4)));
    }

    #[test]
    fn test_referenced_files_ignores_record_items() {
        let entry = RelationEntry::file(vec!["a".repeat(32), "b".repeat(32)]);
        assert_eq!(entry.referenced_files().len(), 2);
        assert!(entry.referenced_records().is_empty());
    }
}
