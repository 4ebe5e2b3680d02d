//! Collaborator contracts and reference implementations
//!
//! The export/import engines depend only on the traits in this crate:
//! - [`RecordStore`]: CRUD + query-by-parent over the target repository
//! - [`ReferenceIndex`]: outgoing relations of a record
//! - [`BlobStore`]: binary asset reads/writes
//!
//! Reference implementations ship alongside: an in-memory store (tests,
//! import targets), a JSON-file-backed store (the CLI's repository format),
//! blob stores for both, a schema-driven reference index, and the built-in
//! default CMS schema.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod builtin;
pub mod json_store;
pub mod memory;
pub mod refindex;
pub mod scan;
pub mod traits;

pub use builtin::builtin_schema;
pub use json_store::JsonStore;
pub use memory::{MemoryBlobStore, MemoryStore};
pub use refindex::SchemaReferenceIndex;
pub use traits::{
    join_blob_path, BlobStore, DiskBlobStore, RawFile, RawKind, RawRelation, RawSoftRef,
    RawTarget, RecordStore, ReferenceIndex,
};
