//! The Document aggregate
//!
//! A Document holds everything one archive contains: header, records with
//! their discovered relations, and file blobs keyed by content digest.
//! Export builds it incrementally across multiple passes; the codec
//! serializes it; import consumes it read-mostly, annotating records as
//! their relations get patched.

use serde::{Deserialize, Serialize};
use sitepack_core::{RecordData, RecordId, RunReport};
use std::collections::BTreeMap;

use crate::digest::FileId;
use crate::header::{ArchiveMeta, Header};
use crate::relation::RelationEntry;

/// One archived record: field data plus discovered relations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordEntry {
    /// Field data as exported
    pub data: RecordData,
    /// field name → discovered relations
    pub relations: BTreeMap<String, RelationEntry>,
    /// Import-side annotation: relations of this record were already
    /// patched. Never serialized; guards against double-patching.
    #[serde(skip)]
    pub has_been_mapped: bool,
}

/// One archived file blob
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Original filename
    pub filename: String,
    /// Modification time (unix seconds) at export
    pub mtime: i64,
    /// Blob content, when stored inside the archive
    pub content: Option<Vec<u8>>,
    /// Relative path in the `.files` sibling directory, when stored
    /// externally
    pub external_ref: Option<String>,
    /// Content digest; also the entry's key
    pub content_hash: FileId,
    /// Record and field this blob was first attached from
    pub record_ref: Option<(RecordId, String)>,
    /// Embedded resources discovered inside HTML/CSS content, by digest
    pub external_resources: Vec<FileId>,
}

/// The complete archive unit
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    /// Archive header
    pub header: Header,
    /// (table, uid) → record entry
    pub records: BTreeMap<RecordId, RecordEntry>,
    /// Record keys in insertion (export discovery) order
    ///
    /// Seeded records come first, closure-discovered records follow in
    /// discovery order. Import's bulk pre-pass walks this list backwards.
    pub order: Vec<RecordId>,
    /// digest → blob referenced from record fields
    pub files: BTreeMap<FileId, FileEntry>,
    /// digest → blob owned by first-class binary-asset records
    pub managed_files: BTreeMap<FileId, FileEntry>,
}

impl Document {
    /// Create an empty Document with the given metadata
    pub fn new(meta: ArchiveMeta) -> Self {
        Self {
            header: Header::new(meta),
            ..Default::default()
        }
    }

    /// Add a record
    ///
    /// Re-adding an existing key is a no-op reported as a warning, not an
    /// error; the original entry is kept untouched. Returns true if the
    /// record was stored.
    pub fn add_record(&mut self, id: RecordId, entry: RecordEntry, report: &mut RunReport) -> bool {
        if self.records.contains_key(&id) {
            report.warn(id, "already added to the archive, keeping first copy");
            return false;
        }
        self.order.push(id.clone());
        self.records.insert(id, entry);
        true
    }

    /// Record lookup
    pub fn record(&self, id: &RecordId) -> Option<&RecordEntry> {
        self.records.get(id)
    }

    /// Mutable record lookup
    pub fn record_mut(&mut self, id: &RecordId) -> Option<&mut RecordEntry> {
        self.records.get_mut(id)
    }

    /// True if the record is stored
    pub fn contains(&self, id: &RecordId) -> bool {
        self.records.contains_key(id)
    }

    /// Attach a file blob, collapsing identical content to one entry
    ///
    /// Returns the digest under which the blob is stored. A second attach
    /// of the same bytes only merges back-reference metadata.
    pub fn attach_file(&mut self, entry: FileEntry) -> FileId {
        Self::attach_into(&mut self.files, entry)
    }

    /// Attach a managed (first-class binary-asset) blob
    pub fn attach_managed_file(&mut self, entry: FileEntry) -> FileId {
        Self::attach_into(&mut self.managed_files, entry)
    }

    fn attach_into(map: &mut BTreeMap<FileId, FileEntry>, entry: FileEntry) -> FileId {
        let id = entry.content_hash.clone();
        match map.get_mut(&id) {
            Some(existing) => {
                // Same bytes, possibly new back-references.
                if existing.record_ref.is_none() {
                    existing.record_ref = entry.record_ref;
                }
                for res in entry.external_resources {
                    if !existing.external_resources.contains(&res) {
                        existing.external_resources.push(res);
                    }
                }
            }
            None => {
                map.insert(id.clone(), entry);
            }
        }
        id
    }

    /// File lookup across both blob maps
    pub fn any_file(&self, id: &FileId) -> Option<&FileEntry> {
        self.files.get(id).or_else(|| self.managed_files.get(id))
    }

    /// Records in deterministic key order
    pub fn record_ids(&self) -> impl Iterator<Item = &RecordId> {
        self.records.keys()
    }

    /// Number of stored records
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Records of one table in uid order
    pub fn records_of_table<'a>(
        &'a self,
        table: &'a str,
    ) -> impl Iterator<Item = (&'a RecordId, &'a RecordEntry)> {
        self.records
            .iter()
            .filter(move |(id, _)| id.table == table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::content_digest;
    use crate::header::ArchiveMeta;

    fn entry_with(data: RecordData) -> RecordEntry {
        RecordEntry {
            data,
            ..Default::default()
        }
    }

    fn blob(bytes: &[u8], name: &str) -> FileEntry {
        FileEntry {
            filename: name.to_string(),
            content: Some(bytes.to_vec()),
            content_hash: content_digest(bytes),
            ..Default::default()
        }
    }

    #[test]
    fn test_duplicate_add_is_warning_noop() {
        let mut doc = Document::new(ArchiveMeta::default());
        let mut report = RunReport::new();
        let id = RecordId::new("pages", 1);

        let first = entry_with(RecordData::new().with("title", "first"));
        let second = entry_with(RecordData::new().with("title", "second"));

        assert!(doc.add_record(id.clone(), first, &mut report));
        assert!(!doc.add_record(id.clone(), second, &mut report));

        assert_eq!(doc.record_count(), 1);
        assert_eq!(doc.record(&id).unwrap().data.text("title"), Some("first"));
        assert_eq!(report.warnings().count(), 1);
        assert!(report.is_success());
    }

    #[test]
    fn test_identical_blob_collapses() {
        let mut doc = Document::new(ArchiveMeta::default());
        let mut a = blob(b"same bytes", "a.png");
        a.record_ref = Some((RecordId::new("content", 1), "image".to_string()));
        let b = blob(b"same bytes", "b.png");

        let id_a = doc.attach_file(a);
        let id_b = doc.attach_file(b);

        assert_eq!(id_a, id_b);
        assert_eq!(doc.files.len(), 1);
        // First back-reference wins
        assert_eq!(
            doc.files[&id_a].record_ref,
            Some((RecordId::new("content", 1), "image".to_string()))
        );
    }

    #[test]
    fn test_distinct_blobs_stay_distinct() {
        let mut doc = Document::new(ArchiveMeta::default());
        doc.attach_file(blob(b"one", "one.txt"));
        doc.attach_file(blob(b"two", "two.txt"));
        assert_eq!(doc.files.len(), 2);
    }

    #[test]
    fn test_any_file_searches_both_maps() {
        let mut doc = Document::new(ArchiveMeta::default());
        let managed = doc.attach_managed_file(blob(b"asset", "asset.bin"));
        assert!(doc.any_file(&managed).is_some());
        assert!(doc.files.is_empty());
    }

    #[test]
    fn test_has_been_mapped_not_serialized() {
        let mut doc = Document::new(ArchiveMeta::default());
        let mut report = RunReport::new();
        let id = RecordId::new("pages", 1);
        let mut entry = entry_with(RecordData::new().with("uid", 1));
        entry.has_been_mapped = true;
        doc.add_record(id.clone(), entry, &mut report);

        let json = serde_json::to_string(&doc).unwrap();
        let back: Document = serde_json::from_str(&json).unwrap();
        assert!(!back.record(&id).unwrap().has_been_mapped);
    }

    #[test]
    fn test_records_of_table_filters() {
        let mut doc = Document::new(ArchiveMeta::default());
        let mut report = RunReport::new();
        doc.add_record(
            RecordId::new("pages", 1),
            entry_with(RecordData::new()),
            &mut report,
        );
        doc.add_record(
            RecordId::new("content", 1),
            entry_with(RecordData::new()),
            &mut report,
        );
        assert_eq!(doc.records_of_table("pages").count(), 1);
    }
}
