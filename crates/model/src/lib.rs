//! Document model for sitepack archives
//!
//! The Document is the complete exported unit: a header (archive metadata,
//! relation configuration, page tree, record index), the records with their
//! discovered relations, and the file blobs they reference. It is built
//! incrementally by the export engine, frozen and serialized by the codec,
//! and consumed read-mostly by the import engine.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod digest;
pub mod document;
pub mod header;
pub mod relation;

pub use digest::{content_digest, FileId};
pub use document::{Document, FileEntry, RecordEntry};
pub use header::{ArchiveMeta, Header, PageTreeNode, RecordSummary, RelationConfig};
pub use relation::{RelationEntry, RelationKind, SoftRef, Substitution};
