//! Archive header
//!
//! The header is the lightweight, always-loaded part of an archive: the
//! operator-facing metadata, the relation configuration the export ran
//! with, the page tree, and summary indexes over the record set. Loading
//! only the header is enough to preview an archive without touching the
//! record or file segments.

use serde::{Deserialize, Serialize};
use sitepack_core::{RecordId, SoftRefMode};
use std::collections::{BTreeMap, BTreeSet};

use crate::digest::FileId;

/// Current archive format version
pub const FORMAT_VERSION: u32 = 1;

/// File extension of segmented-binary archives
pub const BINARY_EXTENSION: &str = "sitepack";

/// File extension of XML archives
pub const XML_EXTENSION: &str = "xml";

/// Suffix of the sibling directory used by externally-stored-blob mode
pub const FILES_DIR_SUFFIX: &str = ".sitepack.files";

/// Operator-facing archive metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveMeta {
    /// Archive title
    pub title: String,
    /// Longer description
    pub description: String,
    /// Free-form operator notes
    pub notes: String,
    /// Acting operator identity at export time
    pub author: String,
    /// Generator version string
    pub generator_version: String,
    /// ISO 8601 creation timestamp
    pub created_at: String,
}

/// Relation configuration the export ran with
///
/// Import consults this to reproduce the export's view of the schema:
/// which tables are static reference data, which records were deliberately
/// excluded, and how each soft-reference token is to be substituted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationConfig {
    /// Tables treated as static reference data (referenced by id only)
    pub static_tables: BTreeSet<String>,
    /// Records deliberately excluded from the archive
    pub excluded: BTreeSet<RecordId>,
    /// Per-token soft-reference import mode
    pub softref_modes: BTreeMap<String, SoftRefMode>,
    /// Extensions the target must provide before import may proceed
    pub extension_dependencies: Vec<String>,
}

/// One node of the archived page tree
///
/// Children preserve source sibling ordering. The tree is a strict
/// hierarchy; cycles cannot be expressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageTreeNode {
    /// Page uid
    pub uid: i64,
    /// Child pages in source order
    pub children: Vec<PageTreeNode>,
}

impl PageTreeNode {
    /// Leaf node
    pub fn leaf(uid: i64) -> Self {
        Self {
            uid,
            children: Vec::new(),
        }
    }

    /// Pre-order walk of this subtree's uids
    pub fn walk(&self) -> Vec<i64> {
        let mut out = vec![self.uid];
        for child in &self.children {
            out.extend(child.walk());
        }
        out
    }
}

/// Per-record summary in the header index
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSummary {
    /// Record title (label field value)
    pub title: String,
    /// Owning page id
    pub pid: i64,
    /// Number of relation-bearing fields
    pub relation_fields: u32,
    /// File blobs referenced by the record
    pub file_refs: Vec<FileId>,
    /// Number of soft references found in the record
    pub soft_refs: u32,
    /// Closure discovery depth: 0 for seeded records, n for records found
    /// in round n of the relation walk
    pub relation_level: u32,
}

/// Archive header
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Format version of the archive
    pub format_version: u32,
    /// Operator-facing metadata
    pub meta: ArchiveMeta,
    /// Relation configuration
    pub relation_config: RelationConfig,
    /// Page tree, roots in source order
    pub page_tree: Vec<PageTreeNode>,
    /// table → uid → summary
    ///
    /// A superset view of the record set: preview pruning may drop records
    /// from the body while their summaries remain here.
    pub record_index: BTreeMap<String, BTreeMap<i64, RecordSummary>>,
    /// parent pid → table → uids located at that page
    pub pid_index: BTreeMap<i64, BTreeMap<String, BTreeSet<i64>>>,
}

impl Header {
    /// Create an empty header at the current format version
    pub fn new(meta: ArchiveMeta) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            meta,
            ..Default::default()
        }
    }

    /// Index a record summary, maintaining both indexes
    pub fn index_record(&mut self, id: &RecordId, summary: RecordSummary) {
        self.pid_index
            .entry(summary.pid)
            .or_default()
            .entry(id.table.clone())
            .or_default()
            .insert(id.uid);
        self.record_index
            .entry(id.table.clone())
            .or_default()
            .insert(id.uid, summary);
    }

    /// Summary lookup
    pub fn summary(&self, id: &RecordId) -> Option<&RecordSummary> {
        self.record_index.get(&id.table)?.get(&id.uid)
    }

    /// All page uids of the page tree in pre-order
    pub fn tree_page_uids(&self) -> Vec<i64> {
        let mut out = Vec::new();
        for root in &self.page_tree {
            out.extend(root.walk());
        }
        out
    }
}
