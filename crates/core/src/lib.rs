//! Core types for sitepack
//!
//! This crate defines the foundational types used throughout the system:
//! - RecordId: Composite record identifier (table + uid)
//! - Value / RecordData: Schema-aware tagged field values
//! - Schema: Table and field configuration (relations, roles, constraints)
//! - Context: Explicit run context (actor, permissions, locale)
//! - Error: Error type hierarchy
//! - RunReport: Shared non-fatal error/warning accumulator

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod context;
pub mod error;
pub mod identifier;
pub mod report;
pub mod schema;
pub mod value;

// Re-export commonly used types
pub use context::{AccessPolicy, AllowAll, Context};
pub use error::{Error, Result};
pub use identifier::{RecordId, UID_NONE};
pub use report::{ReportEntry, RunReport, Severity};
pub use schema::{
    FieldKind, FieldSchema, RelationTarget, RootLevel, Schema, SoftRefMode, StructureVariant,
    StructuredDef, TableRole, TableSchema,
};
pub use value::{RecordData, Value};
