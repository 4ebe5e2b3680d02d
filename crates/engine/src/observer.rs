//! Import observers
//!
//! Extension point for callers that need to react to import writes
//! (auditing, cache invalidation, progress display). Observers are a typed
//! list passed into the Importer at construction; there is no global
//! registry. Both hooks default to no-ops.

use sitepack_core::RecordId;
use std::fmt;

/// Import pipeline phase, as reported to observers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportPhase {
    /// Storage pre-pass
    Storages,
    /// Managed binary-asset pre-pass
    ManagedFiles,
    /// Page write pass
    Pages,
    /// Bulk record write pass
    Records,
    /// Deferred relation patch pass
    Relations,
    /// Structured-field patch pass
    Structured,
    /// Soft-reference substitution pass
    SoftRefs,
    /// Update-mode ordering fix-up pass
    Ordering,
}

impl fmt::Display for ImportPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ImportPhase::Storages => "storages",
            ImportPhase::ManagedFiles => "managed_files",
            ImportPhase::Pages => "pages",
            ImportPhase::Records => "records",
            ImportPhase::Relations => "relations",
            ImportPhase::Structured => "structured",
            ImportPhase::SoftRefs => "soft_refs",
            ImportPhase::Ordering => "ordering",
        };
        f.write_str(name)
    }
}

/// Observer of import write batches
pub trait ImportObserver {
    /// Called before a phase writes its batch
    fn before_write(&mut self, _phase: ImportPhase, _batch: &[RecordId]) {}

    /// Called after a phase wrote its batch
    fn after_write(&mut self, _phase: ImportPhase, _batch: &[RecordId]) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        calls: Vec<(String, usize)>,
    }

    impl ImportObserver for Recorder {
        fn before_write(&mut self, phase: ImportPhase, batch: &[RecordId]) {
            self.calls.push((format!("before:{phase}"), batch.len()));
        }

        fn after_write(&mut self, phase: ImportPhase, batch: &[RecordId]) {
            self.calls.push((format!("after:{phase}"), batch.len()));
        }
    }

    #[test]
    fn test_observer_receives_batches() {
        let mut recorder = Recorder::default();
        let batch = vec![RecordId::new("pages", 1)];
        recorder.before_write(ImportPhase::Pages, &batch);
        recorder.after_write(ImportPhase::Pages, &batch);
        assert_eq!(
            recorder.calls,
            vec![("before:pages".to_string(), 1), ("after:pages".to_string(), 1)]
        );
    }

    #[test]
    fn test_default_hooks_are_noops() {
        struct Silent;
        impl ImportObserver for Silent {}
        let mut silent = Silent;
        silent.before_write(ImportPhase::Records, &[]);
        silent.after_write(ImportPhase::Records, &[]);
    }
}
