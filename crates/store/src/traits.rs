//! Collaborator traits
//!
//! These traits are the seams between the archiver core and the repository
//! it operates on. Implementations can be swapped without touching the
//! engines: the in-memory and JSON-backed stores in this crate are the
//! reference implementations, a production deployment would bind its own.

use sitepack_core::{RecordData, RecordId, Result};
use sitepack_model::FileId;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Record store: CRUD + query-by-parent over one repository instance
pub trait RecordStore {
    /// Fetch one record; `fields` limits the returned columns when given
    fn get(&self, table: &str, uid: i64, fields: Option<&[String]>)
        -> Result<Option<RecordData>>;

    /// All records of a table located at a parent page, sorted by the given
    /// field (uid order when empty)
    fn query(&self, table: &str, pid: i64, order_by: &str) -> Result<Vec<RecordData>>;

    /// Create a record, returning the assigned uid
    ///
    /// `requested_uid` asks for an exact identifier (force-original-id
    /// imports); the store errors if it is taken.
    fn create(&mut self, table: &str, data: &RecordData, requested_uid: Option<i64>)
        -> Result<i64>;

    /// Update an existing record's fields
    fn update(&mut self, table: &str, uid: i64, data: &RecordData) -> Result<()>;

    /// Move a record under a new parent page
    fn move_record(&mut self, table: &str, uid: i64, new_pid: i64) -> Result<()>;
}

/// One file discovered behind a file-relation field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFile {
    /// Path of the blob, relative to the blob store root
    pub path: String,
    /// Content digest; empty when the blob could not be read
    pub digest: FileId,
    /// Modification time (unix seconds), 0 when unknown
    pub mtime: i64,
}

/// Soft-reference target as found by scanning
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawTarget {
    /// Embedded record reference
    Record(RecordId),
    /// Embedded file reference
    File {
        /// Path of the blob, relative to the blob store root
        path: String,
        /// Content digest; empty when the blob could not be read
        digest: FileId,
    },
}

/// One soft reference found in text content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSoftRef {
    /// The exact matched text
    pub matched: String,
    /// What it points at
    pub target: RawTarget,
}

/// Schema-kind payload of a raw relation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawKind {
    /// Hard record references in source order
    Records(Vec<RecordId>),
    /// File references in source order
    Files(Vec<RawFile>),
    /// Relations at paths inside a structured field value
    Structured(BTreeMap<String, RawRelation>),
}

/// Raw per-field relation data as produced by the reference index
///
/// `kind` is None when the field has no relation configuration but soft
/// references were found in its text. A field with neither yields no
/// RawRelation at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRelation {
    /// Schema-configured relation payload
    pub kind: Option<RawKind>,
    /// Soft references found in the field's text
    pub soft_refs: Vec<RawSoftRef>,
}

/// Reference index: outgoing relations of one record
pub trait ReferenceIndex {
    /// field name → raw relation data
    fn relations_of(&self, table: &str, row: &RecordData)
        -> Result<BTreeMap<String, RawRelation>>;
}

/// Blob storage: binary asset reads/writes
pub trait BlobStore {
    /// Read a blob
    fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Write a blob, creating parent directories as needed
    fn write(&mut self, path: &str, bytes: &[u8]) -> Result<()>;

    /// True if the blob exists
    fn exists(&self, path: &str) -> bool;

    /// Modification time (unix seconds) of a blob, if known
    fn mtime(&self, path: &str) -> Option<i64>;

    /// A name in `dir` that does not collide with an existing blob
    ///
    /// Returns `base` itself when free, otherwise a numbered variant.
    fn unique_name(&self, base: &str, dir: &str) -> String {
        let candidate = join_blob_path(dir, base);
        if !self.exists(&candidate) {
            return base.to_string();
        }
        let (stem, ext) = match base.rsplit_once('.') {
            Some((s, e)) => (s.to_string(), format!(".{e}")),
            None => (base.to_string(), String::new()),
        };
        let mut n = 1u32;
        loop {
            let name = format!("{stem}_{n:02}{ext}");
            if !self.exists(&join_blob_path(dir, &name)) {
                return name;
            }
            n += 1;
        }
    }
}

/// Join a blob directory and name without introducing doubled separators
pub fn join_blob_path(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir.trim_end_matches('/'), name)
    }
}

/// Blob store over a filesystem directory
#[derive(Debug)]
pub struct DiskBlobStore {
    root: PathBuf,
}

impl DiskBlobStore {
    /// Create a blob store rooted at the given directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn full(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

impl BlobStore for DiskBlobStore {
    fn read(&self, path: &str) -> Result<Vec<u8>> {
        Ok(std::fs::read(self.full(path))?)
    }

    fn write(&mut self, path: &str, bytes: &[u8]) -> Result<()> {
        let full = self.full(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(full, bytes)?;
        Ok(())
    }

    fn exists(&self, path: &str) -> bool {
        self.full(path).exists()
    }

    fn mtime(&self, path: &str) -> Option<i64> {
        let meta = std::fs::metadata(self.full(path)).ok()?;
        let modified = meta.modified().ok()?;
        let secs = modified
            .duration_since(std::time::UNIX_EPOCH)
            .ok()?
            .as_secs();
        Some(secs as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_join_blob_path() {
        assert_eq!(join_blob_path("", "a.png"), "a.png");
        assert_eq!(join_blob_path("img", "a.png"), "img/a.png");
        assert_eq!(join_blob_path("img/", "a.png"), "img/a.png");
    }

    #[test]
    fn test_disk_blob_roundtrip() {
        let dir = tempdir().unwrap();
        let mut blobs = DiskBlobStore::new(dir.path());

        blobs.write("img/logo.png", b"bytes").unwrap();
        assert!(blobs.exists("img/logo.png"));
        assert_eq!(blobs.read("img/logo.png").unwrap(), b"bytes");
        assert!(blobs.mtime("img/logo.png").is_some());
    }

    #[test]
    fn test_unique_name_numbers_collisions() {
        let dir = tempdir().unwrap();
        let mut blobs = DiskBlobStore::new(dir.path());

        assert_eq!(blobs.unique_name("logo.png", "img"), "logo.png");
        blobs.write("img/logo.png", b"a").unwrap();
        assert_eq!(blobs.unique_name("logo.png", "img"), "logo_01.png");
        blobs.write("img/logo_01.png", b"b").unwrap();
        assert_eq!(blobs.unique_name("logo.png", "img"), "logo_02.png");
    }

    #[test]
    fn test_unique_name_without_extension() {
        let dir = tempdir().unwrap();
        let mut blobs = DiskBlobStore::new(dir.path());
        blobs.write("notes", b"a").unwrap();
        assert_eq!(blobs.unique_name("notes", ""), "notes_01");
    }
}
