//! Export and import engines
//!
//! The run engines over the Document model:
//! - [`resolver`]: normalizes raw reference-index output into relation
//!   entries and applies the soft-reference de-duplication rule
//! - [`export`]: seeds, computes the relation closure, attaches files
//! - [`import`]: the multi-phase write pipeline with deferred relation
//!   patching through the import mapping
//! - [`preview`]: read-side rendering of an archive for operator review
//!
//! One engine instance corresponds to one synchronous run; the only shared
//! state is the Document and the run's report, both owned by the run.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod export;
pub mod import;
pub mod observer;
pub mod preview;
pub mod resolver;

pub use export::{Depth, ExportConfig, ExportOutcome, Exporter, MAX_CLOSURE_ROUNDS};
pub use import::{ImportConfig, ImportMapping, ImportMode, ImportOutcome, Importer};
pub use observer::{ImportObserver, ImportPhase};
pub use preview::{diff_record, render_preview, FieldDiff, PreviewLine};
pub use resolver::{RelationResolver, ResolvedRelations};
