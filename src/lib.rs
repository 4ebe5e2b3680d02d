//! sitepack — bidirectional content-graph archiver
//!
//! Serializes a subtree of typed, relationally-linked records (plus their
//! referenced binary assets) into a portable archive, and reconstitutes
//! that archive into a possibly different repository instance, remapping
//! identifiers and repairing relations.
//!
//! This facade crate re-exports the member crates:
//! - [`core`]: identifiers, values, schema, context, errors, run report
//! - [`model`]: the Document aggregate
//! - [`store`]: collaborator traits and reference implementations
//! - [`codec`]: segmented-binary and XML wire forms
//! - [`engine`]: export/import engines and the preview renderer
//!
//! ## Example
//!
//! ```
//! use sitepack::core::Context;
//! use sitepack::engine::{Depth, ExportConfig, Exporter};
//! use sitepack::store::{builtin_schema, MemoryBlobStore, MemoryStore, SchemaReferenceIndex};
//!
//! let schema = builtin_schema();
//! let store = MemoryStore::new();
//! let blobs = MemoryBlobStore::new();
//! let index = SchemaReferenceIndex::new(&schema, &blobs);
//! let ctx = Context::operator("docs");
//!
//! let outcome = Exporter::new(
//!     &ctx,
//!     &schema,
//!     &store,
//!     &index,
//!     &blobs,
//!     ExportConfig {
//!         root_page: Some(0),
//!         depth: Depth::Infinite,
//!         tables: vec!["*".to_string()],
//!         relation_tables: vec!["*".to_string()],
//!         ..Default::default()
//!     },
//! )
//! .run()
//! .unwrap();
//! assert!(outcome.report.is_success());
//! ```

pub use sitepack_codec as codec;
pub use sitepack_core as core;
pub use sitepack_engine as engine;
pub use sitepack_model as model;
pub use sitepack_store as store;
