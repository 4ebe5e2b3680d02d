//! Export engine
//!
//! Builds a Document from a live repository in four passes:
//!
//! 1. **Seed**: explicit records, explicit table+page lists, and/or the
//!    page tree under a root page at a configurable depth.
//! 2. **Closure**: repeatedly scan stored relations and fetch allowed,
//!    not-yet-stored targets, up to [`MAX_CLOSURE_ROUNDS`] rounds. Hitting
//!    the cap with work still pending is reported as `closure_truncated`,
//!    distinct from convergence.
//! 3. **File attachment**: read every referenced blob once the record set
//!    is stable; HTML/CSS assets are scanned one level deep for embedded
//!    resources, which are attached as their own entries.
//! 4. **Managed files**: first-class binary-asset records get their blob
//!    attached with the stored hash cross-checked against fresh content;
//!    drift self-heals with a warning.
//!
//! In externally-stored-blob mode, content goes to a run-scoped staging
//! directory (cleaned up on every exit path via ownership) instead of
//! being embedded.

use chrono::{SecondsFormat, Utc};
use sitepack_core::{
    Context, RecordData, RecordId, Result, RunReport, Schema, SoftRefMode, TableRole, Value,
    UID_NONE,
};
use sitepack_model::{
    content_digest, ArchiveMeta, Document, FileEntry, FileId, PageTreeNode, RecordEntry,
    RecordSummary,
};
use sitepack_store::scan::{scan_embedded_resources, substitute_spans};
use sitepack_store::{BlobStore, RecordStore, ReferenceIndex};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::debug;

use crate::resolver::{FileSource, RelationResolver, ResolvedRelations};

/// Upper bound on relation-closure rounds
///
/// Bounds closure depth so cyclic relation configuration combined with
/// broad allow-lists cannot walk forever. Hitting the bound is reported
/// explicitly, never silently.
pub const MAX_CLOSURE_ROUNDS: u32 = 10;

/// Page-tree walk depth
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Depth {
    /// Only the root page itself
    ThisPage,
    /// N levels below the root
    Levels(u32),
    /// Walk into exactly the pages the caller expanded
    Expanded(BTreeSet<i64>),
    /// The whole subtree
    Infinite,
}

/// Export run configuration
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Archive title
    pub title: String,
    /// Archive description
    pub description: String,
    /// Operator notes
    pub notes: String,
    /// Root page of the tree walk; None skips the tree seed
    pub root_page: Option<i64>,
    /// Tree walk depth
    pub depth: Depth,
    /// Tables collected per tree page (`*` for all non-static tables)
    pub tables: Vec<String>,
    /// Closure allow-list (`*` for all non-static tables)
    pub relation_tables: Vec<String>,
    /// Explicitly seeded single records
    pub records: Vec<RecordId>,
    /// Explicitly seeded table+page lists
    pub lists: Vec<(String, i64)>,
    /// Records excluded from the archive
    pub exclude: BTreeSet<RecordId>,
    /// Skip records flagged disabled by their table's enablement rule
    pub exclude_disabled: bool,
    /// Extensions the importing side must provide
    pub extension_dependencies: Vec<String>,
    /// Per-token soft-reference import modes
    pub softref_modes: BTreeMap<String, SoftRefMode>,
    /// Store blob content in a staging directory instead of the archive
    pub files_external: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            title: String::new(),
            description: String::new(),
            notes: String::new(),
            root_page: None,
            depth: Depth::Infinite,
            tables: Vec::new(),
            relation_tables: Vec::new(),
            records: Vec::new(),
            lists: Vec::new(),
            exclude: BTreeSet::new(),
            exclude_disabled: false,
            extension_dependencies: Vec::new(),
            softref_modes: BTreeMap::new(),
            files_external: false,
        }
    }
}

/// Result of one export run
pub struct ExportOutcome {
    /// The built Document
    pub document: Document,
    /// Accumulated errors and warnings
    pub report: RunReport,
    /// The closure hit [`MAX_CLOSURE_ROUNDS`] with targets still pending
    pub closure_truncated: bool,
    /// Staging directory holding blob content in externally-stored mode;
    /// dropping it removes the directory
    pub external_files: Option<tempfile::TempDir>,
}

/// Export engine
pub struct Exporter<'a> {
    ctx: &'a Context,
    schema: &'a Schema,
    store: &'a dyn RecordStore,
    index: &'a dyn ReferenceIndex,
    blobs: &'a dyn BlobStore,
    config: ExportConfig,

    doc: Document,
    report: RunReport,
    file_sources: BTreeMap<FileId, FileSource>,
    closure_truncated: bool,
    staging: Option<tempfile::TempDir>,
}

impl<'a> Exporter<'a> {
    /// Create an export engine for one run
    pub fn new(
        ctx: &'a Context,
        schema: &'a Schema,
        store: &'a dyn RecordStore,
        index: &'a dyn ReferenceIndex,
        blobs: &'a dyn BlobStore,
        config: ExportConfig,
    ) -> Self {
        let meta = ArchiveMeta {
            title: config.title.clone(),
            description: config.description.clone(),
            notes: config.notes.clone(),
            author: ctx.actor.clone(),
            generator_version: env!("CARGO_PKG_VERSION").to_string(),
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        };
        Self {
            ctx,
            schema,
            store,
            index,
            blobs,
            config,
            doc: Document::new(meta),
            report: RunReport::new(),
            file_sources: BTreeMap::new(),
            closure_truncated: false,
            staging: None,
        }
    }

    /// Run the export
    pub fn run(mut self) -> Result<ExportOutcome> {
        self.seed()?;
        self.closure()?;
        self.attach_files()?;
        self.attach_managed_files()?;
        self.finalize();

        Ok(ExportOutcome {
            document: self.doc,
            report: self.report,
            closure_truncated: self.closure_truncated,
            external_files: self.staging,
        })
    }

    // =========================================================================
    // Seeding
    // =========================================================================

    fn seed(&mut self) -> Result<()> {
        if let Some(root) = self.config.root_page {
            self.seed_tree(root)?;
        }

        let lists = self.config.lists.clone();
        for (table, pid) in lists {
            self.seed_list(&table, pid)?;
        }

        let singles = self.config.records.clone();
        for id in singles {
            match self.store.get(&id.table, id.uid, None)? {
                Some(row) => self.add_record(&id.table, row, 0)?,
                None => self.report.error(id, "record not found in the source store"),
            }
        }
        Ok(())
    }

    /// Walk the page tree under the root, seeding pages and their records
    fn seed_tree(&mut self, root: i64) -> Result<()> {
        let page_table = self.schema.page_table().to_string();
        let sort = self
            .schema
            .table(&page_table)
            .and_then(|t| t.sort_field.clone())
            .unwrap_or_default();

        let mut tree = Vec::new();
        if root == UID_NONE {
            for row in self.store.query(&page_table, UID_NONE, &sort)? {
                if let Some(node) = self.seed_page(&page_table, &sort, row, 0)? {
                    tree.push(node);
                }
            }
        } else {
            match self.store.get(&page_table, root, None)? {
                Some(row) => {
                    if let Some(node) = self.seed_page(&page_table, &sort, row, 0)? {
                        tree.push(node);
                    }
                }
                None => self.report.error(
                    RecordId::new(page_table.clone(), root),
                    "export root page not found",
                ),
            }
        }
        self.doc.header.page_tree = tree;
        Ok(())
    }

    fn descend(&self, page_uid: i64, level: u32) -> bool {
        match &self.config.depth {
            Depth::ThisPage => false,
            Depth::Levels(n) => level < *n,
            Depth::Expanded(open) => open.contains(&page_uid),
            Depth::Infinite => true,
        }
    }

    fn seed_page(
        &mut self,
        page_table: &str,
        sort: &str,
        row: RecordData,
        level: u32,
    ) -> Result<Option<PageTreeNode>> {
        let Some(uid) = row.uid() else {
            self.report
                .error_global("page row without uid in source store");
            return Ok(None);
        };
        if !self.ctx.is_within_scope(uid) {
            self.report.warn(
                RecordId::new(page_table, uid),
                "page is outside the permitted scope, skipping subtree",
            );
            return Ok(None);
        }

        self.add_record(page_table, row, 0)?;
        self.seed_page_records(uid)?;

        let mut node = PageTreeNode::leaf(uid);
        if self.descend(uid, level) {
            for child in self.store.query(page_table, uid, sort)? {
                if let Some(child_node) = self.seed_page(page_table, sort, child, level + 1)? {
                    node.children.push(child_node);
                }
            }
        }
        Ok(Some(node))
    }

    /// Seed records of the configured tables located at one page
    fn seed_page_records(&mut self, page_uid: i64) -> Result<()> {
        for table in self.tables_for_pages() {
            let sort = self
                .schema
                .table(&table)
                .and_then(|t| t.sort_field.clone())
                .unwrap_or_default();
            for row in self.store.query(&table, page_uid, &sort)? {
                self.add_record(&table, row, 0)?;
            }
        }
        Ok(())
    }

    fn tables_for_pages(&self) -> Vec<String> {
        expand_table_selection(&self.config.tables, self.schema)
    }

    fn seed_list(&mut self, table: &str, pid: i64) -> Result<()> {
        let sort = self
            .schema
            .table(table)
            .and_then(|t| t.sort_field.clone())
            .unwrap_or_default();
        for row in self.store.query(table, pid, &sort)? {
            self.add_record(table, row, 0)?;
        }
        Ok(())
    }

    // =========================================================================
    // Add-record primitive
    // =========================================================================

    /// Add one record to the Document, applying all skip rules
    fn add_record(&mut self, table: &str, row: RecordData, level: u32) -> Result<()> {
        let Some(uid) = row.uid() else {
            self.report
                .error_global(format!("row without uid in table '{table}'"));
            return Ok(());
        };
        if uid == UID_NONE || table.is_empty() {
            return Ok(());
        }
        let id = RecordId::new(table, uid);
        if self.config.exclude.contains(&id) {
            return Ok(());
        }
        let Some(table_schema) = self.schema.table(table) else {
            self.report.error(id, "table is not part of the schema");
            return Ok(());
        };
        if table_schema.is_static {
            return Ok(());
        }
        if self.config.exclude_disabled && table_schema.is_disabled(&row) {
            self.report.warn(id, "record is disabled, excluded from export");
            return Ok(());
        }
        if !self.ctx.can_access_table(table) {
            self.report.warn(id, "table access denied, record skipped");
            return Ok(());
        }
        let owning_page = if table_schema.role == TableRole::Page {
            uid
        } else {
            row.pid().unwrap_or(UID_NONE)
        };
        if owning_page != UID_NONE && !self.ctx.is_within_scope(owning_page) {
            self.report
                .warn(id, "record's page is outside the permitted scope");
            return Ok(());
        }
        if self.doc.contains(&id) {
            // Route through the Document so the duplicate warning has one
            // shape everywhere.
            self.doc
                .add_record(id, RecordEntry::default(), &mut self.report);
            return Ok(());
        }

        let resolver = RelationResolver::new(self.schema, self.index, self.store);
        let resolved = resolver.resolve(&id, &row, &mut self.report)?;

        let entry = self.build_record_entry(row, &resolved);
        let summary = self.build_summary(table_schema.label_field.as_str(), &entry, level);

        debug!(record = %id, level, "exporting record");
        self.doc.header.index_record(&id, summary);
        self.doc.add_record(id, entry, &mut self.report);
        self.file_sources.extend(resolved.file_sources);
        Ok(())
    }

    fn build_record_entry(&self, row: RecordData, resolved: &ResolvedRelations) -> RecordEntry {
        let mut data = row;
        for (field, tokenized) in &resolved.tokenized {
            data.set(field.clone(), Value::Text(tokenized.clone()));
        }
        RecordEntry {
            data,
            relations: resolved.entries.clone(),
            has_been_mapped: false,
        }
    }

    fn build_summary(&self, label_field: &str, entry: &RecordEntry, level: u32) -> RecordSummary {
        let mut file_refs = Vec::new();
        let mut soft_refs = 0u32;
        for relation in entry.relations.values() {
            file_refs.extend(relation.referenced_files().into_iter().cloned());
            soft_refs += relation.soft_refs.len() as u32;
        }
        RecordSummary {
            title: entry.data.text(label_field).unwrap_or_default().to_string(),
            pid: entry.data.pid().unwrap_or(UID_NONE),
            relation_fields: entry.relations.len() as u32,
            file_refs,
            soft_refs,
            relation_level: level,
        }
    }

    // =========================================================================
    // Closure
    // =========================================================================

    /// Targets referenced by stored records that should be fetched next
    ///
    /// The pending queue preserves first-reference order and collapses
    /// duplicates across source relations.
    fn scan_pending(&self) -> Vec<RecordId> {
        let mut queued: HashSet<RecordId> = HashSet::new();
        let mut pending = Vec::new();

        for id in &self.doc.order {
            let Some(entry) = self.doc.record(id) else {
                continue;
            };
            for relation in entry.relations.values() {
                for target in relation.referenced_records() {
                    if target.is_none() || target.uid < 0 {
                        continue;
                    }
                    if !self.relation_table_allowed(&target.table) {
                        continue;
                    }
                    if self.config.exclude.contains(target) || self.doc.contains(target) {
                        continue;
                    }
                    if queued.insert(target.clone()) {
                        pending.push(target.clone());
                    }
                }
            }
        }
        pending
    }

    fn relation_table_allowed(&self, table: &str) -> bool {
        if self.schema.is_static(table) {
            return false;
        }
        self.config
            .relation_tables
            .iter()
            .any(|t| t == "*" || t == table)
    }

    /// Iterative relation closure with the bounded round loop
    fn closure(&mut self) -> Result<()> {
        let mut round = 0u32;
        loop {
            let pending = self.scan_pending();
            if pending.is_empty() {
                debug!(rounds = round, "relation closure converged");
                break;
            }
            if round >= MAX_CLOSURE_ROUNDS {
                self.closure_truncated = true;
                self.report.warn_global(format!(
                    "relation closure stopped after {MAX_CLOSURE_ROUNDS} rounds with {} \
                     target(s) still pending",
                    pending.len()
                ));
                break;
            }
            round += 1;
            debug!(round, pending = pending.len(), "relation closure round");

            for target in pending {
                match self.store.get(&target.table, target.uid, None)? {
                    Some(row) => self.add_record(&target.table.clone(), row, round)?,
                    None => self
                        .report
                        .error(target, "related record not found in the source store"),
                }
            }
        }
        Ok(())
    }

    // =========================================================================
    // File attachment
    // =========================================================================

    /// Attach every referenced blob, strictly after the closure is stable
    fn attach_files(&mut self) -> Result<()> {
        let sources = std::mem::take(&mut self.file_sources);
        for (digest, source) in sources {
            let bytes = match self.blobs.read(&source.path) {
                Ok(bytes) => bytes,
                Err(_) => {
                    self.report
                        .error_global(format!("referenced file '{}' unreadable", source.path));
                    continue;
                }
            };
            if content_digest(&bytes) != digest {
                self.report.warn_global(format!(
                    "file '{}' changed while exporting, archiving current content",
                    source.path
                ));
            }

            let mut entry = FileEntry {
                filename: source.path.clone(),
                mtime: source.mtime,
                content_hash: digest.clone(),
                ..Default::default()
            };

            let mut content = bytes;
            if is_text_asset(&source.path) {
                content = self.attach_embedded_resources(&source.path, content, &mut entry)?;
            }
            self.store_content(&mut entry, content)?;
            self.doc.attach_file(entry);
        }
        Ok(())
    }

    /// Scan an HTML/CSS asset for embedded resources, one level only
    ///
    /// Discovered resources become their own file entries; the scanned
    /// content is rewritten to `{resource:<digest>}` placeholders so import
    /// can relocate the links. Attached resources are not scanned further.
    fn attach_embedded_resources(
        &mut self,
        asset_path: &str,
        content: Vec<u8>,
        entry: &mut FileEntry,
    ) -> Result<Vec<u8>> {
        let Ok(text) = String::from_utf8(content.clone()) else {
            return Ok(content);
        };
        let matches = scan_embedded_resources(&text);
        if matches.is_empty() {
            return Ok(content);
        }

        let base_dir = match asset_path.rsplit_once('/') {
            Some((dir, _)) => dir.to_string(),
            None => String::new(),
        };

        let mut subs = Vec::new();
        for resource in matches {
            let resolved = resolve_resource_path(&base_dir, &resource.path);
            let candidate = [resolved.as_str(), resource.path.as_str()]
                .into_iter()
                .find(|p| self.blobs.exists(p));
            let Some(found) = candidate else {
                self.report.warn_global(format!(
                    "embedded resource '{}' of '{asset_path}' not found",
                    resource.path
                ));
                continue;
            };
            let bytes = self.blobs.read(found)?;
            let digest = content_digest(&bytes);
            let mut resource_entry = FileEntry {
                filename: found.to_string(),
                mtime: self.blobs.mtime(found).unwrap_or(0),
                content_hash: digest.clone(),
                ..Default::default()
            };
            self.store_content(&mut resource_entry, bytes)?;
            self.doc.attach_file(resource_entry);
            if !entry.external_resources.contains(&digest) {
                entry.external_resources.push(digest.clone());
            }
            subs.push((resource.span, format!("{{resource:{digest}}}")));
        }

        Ok(substitute_spans(&text, subs).into_bytes())
    }

    /// Place content inline or into the external staging directory
    fn store_content(&mut self, entry: &mut FileEntry, content: Vec<u8>) -> Result<()> {
        if !self.config.files_external {
            entry.content = Some(content);
            return Ok(());
        }
        if self.staging.is_none() {
            self.staging = Some(tempfile::TempDir::new()?);
        }
        let staging = self.staging.as_ref().expect("staging directory just created");
        let name = entry.content_hash.clone();
        std::fs::write(staging.path().join(&name), &content)?;
        entry.external_ref = Some(name);
        Ok(())
    }

    // =========================================================================
    // Managed files
    // =========================================================================

    /// Attach blobs of first-class binary-asset records, cross-checking
    /// their stored content hash
    fn attach_managed_files(&mut self) -> Result<()> {
        let Some(file_table) = self.schema.table_with_role(TableRole::FileRecord) else {
            return Ok(());
        };
        let file_table = file_table.name.clone();
        let hash_field = sitepack_core::schema::fields::CONTENT_HASH;
        let identifier_field = sitepack_core::schema::fields::IDENTIFIER;

        let ids: Vec<RecordId> = self
            .doc
            .records_of_table(&file_table)
            .map(|(id, _)| id.clone())
            .collect();

        for id in ids {
            let entry = self.doc.record(&id).expect("record id just listed");
            let Some(identifier) = entry.data.text(identifier_field).map(str::to_string) else {
                self.report.error(id, "binary-asset record has no identifier");
                continue;
            };
            let stored_hash = entry.data.text(hash_field).unwrap_or_default().to_string();

            let bytes = match self.blobs.read(&identifier) {
                Ok(bytes) => bytes,
                Err(_) => {
                    self.report
                        .error(id, format!("asset content '{identifier}' unreadable"));
                    continue;
                }
            };
            let fresh = content_digest(&bytes);
            if fresh != stored_hash {
                // Self-heal: the archive stays internally consistent even
                // when the source index was stale.
                self.report.warn(
                    id.clone(),
                    format!("stored content hash was stale, corrected to {fresh}"),
                );
                if let Some(entry) = self.doc.record_mut(&id) {
                    entry.data.set(hash_field, Value::Text(fresh.clone()));
                }
            }

            let mtime = self.blobs.mtime(&identifier).unwrap_or(0);
            let mut file_entry = FileEntry {
                filename: identifier,
                mtime,
                content_hash: fresh,
                record_ref: Some((id.clone(), identifier_field.to_string())),
                ..Default::default()
            };
            self.store_content(&mut file_entry, bytes)?;
            self.doc.attach_managed_file(file_entry);
        }
        Ok(())
    }

    // =========================================================================
    // Finalize
    // =========================================================================

    fn finalize(&mut self) {
        let config = &mut self.doc.header.relation_config;
        for table in self.schema.table_names() {
            if self.schema.is_static(table) {
                config.static_tables.insert(table.clone());
            }
        }
        config.excluded = self.config.exclude.clone();
        config.softref_modes = self.config.softref_modes.clone();
        config.extension_dependencies = self.config.extension_dependencies.clone();
    }
}

/// Expand a table selection, resolving the `*` wildcard to all non-static
/// content tables
fn expand_table_selection(selection: &[String], schema: &Schema) -> Vec<String> {
    if selection.iter().any(|t| t == "*") {
        schema
            .table_names()
            .filter(|t| {
                !schema.is_static(t)
                    && schema
                        .table(t)
                        .map(|ts| ts.role != TableRole::Page)
                        .unwrap_or(false)
            })
            .cloned()
            .collect()
    } else {
        selection
            .iter()
            .filter(|t| !schema.is_static(t))
            .cloned()
            .collect()
    }
}

fn is_text_asset(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    lower.ends_with(".html") || lower.ends_with(".htm") || lower.ends_with(".css")
}

/// Resolve a resource link relative to its referencing asset's directory
fn resolve_resource_path(base_dir: &str, link: &str) -> String {
    if base_dir.is_empty() || link.contains('/') {
        link.to_string()
    } else {
        format!("{base_dir}/{link}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitepack_store::{builtin_schema, MemoryBlobStore, MemoryStore, SchemaReferenceIndex};

    struct Fixture {
        schema: Schema,
        store: MemoryStore,
        blobs: MemoryBlobStore,
        ctx: Context,
    }

    fn row(uid: i64, pid: i64) -> RecordData {
        RecordData::new().with("uid", uid).with("pid", pid)
    }

    fn fixture() -> Fixture {
        let mut store = MemoryStore::new();
        store.seed("pages", row(1, 0).with("title", "Home").with("sorting", 10));
        store.seed("pages", row(2, 1).with("title", "About").with("sorting", 10));
        store.seed("pages", row(3, 2).with("title", "Deep").with("sorting", 10));
        store.seed(
            "content",
            row(10, 1).with("header", "Welcome").with("sorting", 10),
        );
        store.seed(
            "content",
            row(11, 2)
                .with("header", "Block")
                .with("sorting", 10)
                .with("related_page", "3"),
        );

        let mut blobs = MemoryBlobStore::new();
        blobs.seed("img/logo.png", b"logo-bytes", 40);

        Fixture {
            schema: builtin_schema(),
            store,
            blobs,
            ctx: Context::operator("tester"),
        }
    }

    fn export(fx: &Fixture, config: ExportConfig) -> ExportOutcome {
        let index = SchemaReferenceIndex::new(&fx.schema, &fx.blobs);
        Exporter::new(&fx.ctx, &fx.schema, &fx.store, &index, &fx.blobs, config)
            .run()
            .unwrap()
    }

    fn tree_config() -> ExportConfig {
        ExportConfig {
            title: "test".to_string(),
            root_page: Some(1),
            depth: Depth::Infinite,
            tables: vec!["*".to_string()],
            relation_tables: vec!["*".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_tree_seed_collects_pages_and_records() {
        let fx = fixture();
        let outcome = export(&fx, tree_config());

        assert!(outcome.report.is_success());
        assert!(!outcome.closure_truncated);
        let doc = &outcome.document;
        assert!(doc.contains(&RecordId::new("pages", 1)));
        assert!(doc.contains(&RecordId::new("pages", 2)));
        assert!(doc.contains(&RecordId::new("pages", 3)));
        assert!(doc.contains(&RecordId::new("content", 10)));
        assert!(doc.contains(&RecordId::new("content", 11)));

        assert_eq!(doc.header.page_tree.len(), 1);
        assert_eq!(doc.header.page_tree[0].uid, 1);
        assert_eq!(doc.header.page_tree[0].children[0].uid, 2);
    }

    #[test]
    fn test_depth_this_page() {
        let fx = fixture();
        let outcome = export(
            &fx,
            ExportConfig {
                depth: Depth::ThisPage,
                ..tree_config()
            },
        );
        let doc = &outcome.document;
        assert!(doc.contains(&RecordId::new("pages", 1)));
        assert!(!doc.contains(&RecordId::new("pages", 2)));
        assert!(doc.contains(&RecordId::new("content", 10)));
    }

    #[test]
    fn test_depth_levels() {
        let fx = fixture();
        let outcome = export(
            &fx,
            ExportConfig {
                depth: Depth::Levels(1),
                relation_tables: vec![],
                ..tree_config()
            },
        );
        let doc = &outcome.document;
        assert!(doc.contains(&RecordId::new("pages", 2)));
        assert!(!doc.contains(&RecordId::new("pages", 3)));
    }

    #[test]
    fn test_closure_fetches_related_records() {
        let fx = fixture();
        let outcome = export(
            &fx,
            ExportConfig {
                root_page: Some(2),
                ..tree_config()
            },
        );
        let doc = &outcome.document;
        // content:11 relates to pages:3, which is inside the subtree anyway;
        // restrict to page 2 only and the relation still pulls pages:3 in.
        assert!(doc.contains(&RecordId::new("content", 11)));
        assert!(doc.contains(&RecordId::new("pages", 3)));
        assert_eq!(
            doc.header
                .summary(&RecordId::new("pages", 3))
                .unwrap()
                .relation_level,
            0,
            "page 3 sits in the walked subtree, so it is a seed"
        );
    }

    #[test]
    fn test_closure_level_tagging() {
        let mut fx = fixture();
        // content:20 on page 1 relates to content:21 on an unwalked page,
        // which relates to content:22.
        fx.store.seed(
            "content",
            row(20, 1).with("records", "content:21").with("sorting", 20),
        );
        fx.store.seed("content", row(21, 99).with("records", "content:22"));
        fx.store.seed("content", row(22, 99));

        let outcome = export(
            &fx,
            ExportConfig {
                depth: Depth::ThisPage,
                ..tree_config()
            },
        );
        let doc = &outcome.document;
        assert_eq!(
            doc.header
                .summary(&RecordId::new("content", 21))
                .unwrap()
                .relation_level,
            1
        );
        assert_eq!(
            doc.header
                .summary(&RecordId::new("content", 22))
                .unwrap()
                .relation_level,
            2
        );
    }

    #[test]
    fn test_closure_respects_allow_list() {
        let fx = fixture();
        let outcome = export(
            &fx,
            ExportConfig {
                root_page: Some(2),
                depth: Depth::ThisPage,
                relation_tables: vec![],
                ..tree_config()
            },
        );
        // related pages:3 not fetched: no allow-list
        assert!(!outcome.document.contains(&RecordId::new("pages", 3)));
        assert!(outcome.report.is_success());
    }

    #[test]
    fn test_closure_truncation_flagged() {
        let mut fx = fixture();
        // A reference chain longer than the round cap.
        let chain_len = MAX_CLOSURE_ROUNDS + 3;
        for i in 0..chain_len {
            let uid = 100 + i as i64;
            let mut r = row(uid, 99);
            if i + 1 < chain_len {
                r.set("records", format!("content:{}", uid + 1));
            }
            fx.store.seed("content", r);
        }
        fx.store
            .seed("content", row(50, 1).with("records", "content:100"));

        let outcome = export(
            &fx,
            ExportConfig {
                depth: Depth::ThisPage,
                ..tree_config()
            },
        );
        assert!(outcome.closure_truncated);
        // The record one past the cap was not fetched
        assert!(!outcome
            .document
            .contains(&RecordId::new("content", 100 + MAX_CLOSURE_ROUNDS as i64)));
    }

    #[test]
    fn test_cyclic_relations_terminate() {
        let mut fx = fixture();
        fx.store
            .seed("content", row(30, 1).with("records", "content:31"));
        fx.store
            .seed("content", row(31, 99).with("records", "content:30"));

        let outcome = export(
            &fx,
            ExportConfig {
                depth: Depth::ThisPage,
                ..tree_config()
            },
        );
        assert!(!outcome.closure_truncated);
        assert!(outcome.document.contains(&RecordId::new("content", 31)));
        // Each record stored exactly once
        assert_eq!(
            outcome
                .document
                .record_ids()
                .filter(|id| id.table == "content")
                .count(),
            outcome
                .document
                .records_of_table("content")
                .count()
        );
    }

    #[test]
    fn test_disabled_record_excluded_with_warning() {
        let mut fx = fixture();
        fx.store
            .seed("content", row(40, 1).with("hidden", 1).with("header", "off"));

        let outcome = export(
            &fx,
            ExportConfig {
                exclude_disabled: true,
                ..tree_config()
            },
        );
        assert!(!outcome.document.contains(&RecordId::new("content", 40)));
        assert!(outcome
            .report
            .warnings()
            .any(|e| e.message.contains("disabled")));
    }

    #[test]
    fn test_exclude_set_is_silent_skip() {
        let fx = fixture();
        let outcome = export(
            &fx,
            ExportConfig {
                exclude: BTreeSet::from([RecordId::new("content", 10)]),
                ..tree_config()
            },
        );
        assert!(!outcome.document.contains(&RecordId::new("content", 10)));
        assert!(outcome.report.is_success());
        assert_eq!(outcome.report.warnings().count(), 0);
    }

    #[test]
    fn test_scope_skip_has_distinct_warning() {
        use sitepack_core::AccessPolicy;
        use std::sync::Arc;

        struct OnlyPageOne;
        impl AccessPolicy for OnlyPageOne {
            fn is_within_scope(&self, page_uid: i64) -> bool {
                page_uid == 1
            }
            fn can_access_table(&self, _table: &str) -> bool {
                true
            }
        }

        let mut fx = fixture();
        fx.ctx = Context::new("tester", false, Arc::new(OnlyPageOne));
        let outcome = export(&fx, tree_config());

        assert!(outcome.document.contains(&RecordId::new("pages", 1)));
        assert!(!outcome.document.contains(&RecordId::new("pages", 2)));
        assert!(outcome
            .report
            .warnings()
            .any(|e| e.message.contains("scope")));
    }

    #[test]
    fn test_file_attachment_and_dedup() {
        let mut fx = fixture();
        fx.store.seed(
            "content",
            row(60, 1).with("assets", "img/logo.png"),
        );
        fx.store.seed(
            "content",
            row(61, 1).with("assets", "img/logo.png"),
        );

        let outcome = export(&fx, tree_config());
        let doc = &outcome.document;
        assert_eq!(doc.files.len(), 1);
        let digest = content_digest(b"logo-bytes");
        assert_eq!(doc.files[&digest].content, Some(b"logo-bytes".to_vec()));
        assert_eq!(doc.files[&digest].mtime, 40);
    }

    #[test]
    fn test_embedded_resources_one_level() {
        let mut fx = fixture();
        fx.blobs
            .seed("css/site.css", b"body { background: url('bg.png'); }", 1);
        fx.blobs.seed("css/bg.png", b"png-bytes", 2);
        fx.store.seed("content", row(62, 1).with("assets", "css/site.css"));

        let outcome = export(&fx, tree_config());
        let doc = &outcome.document;

        let css_digest = content_digest(b"body { background: url('bg.png'); }");
        let png_digest = content_digest(b"png-bytes");
        assert_eq!(doc.files.len(), 2);

        let css = &doc.files[&css_digest];
        assert_eq!(css.external_resources, vec![png_digest.clone()]);
        let rewritten = String::from_utf8(css.content.clone().unwrap()).unwrap();
        assert!(rewritten.contains(&format!("{{resource:{png_digest}}}")));
        assert!(!rewritten.contains("bg.png"));
    }

    #[test]
    fn test_managed_file_hash_self_heal() {
        let mut fx = fixture();
        fx.blobs.seed("assets/photo.jpg", b"fresh-bytes", 5);
        fx.store.seed(
            "files",
            row(70, 0)
                .with("name", "photo.jpg")
                .with("identifier", "assets/photo.jpg")
                .with("storage", "1")
                .with("content_hash", "0000stale00000000000000000000000"),
        );

        let outcome = export(
            &fx,
            ExportConfig {
                records: vec![RecordId::new("files", 70)],
                relation_tables: vec![],
                ..Default::default()
            },
        );
        let doc = &outcome.document;
        let fresh = content_digest(b"fresh-bytes");
        assert_eq!(
            doc.record(&RecordId::new("files", 70))
                .unwrap()
                .data
                .text("content_hash"),
            Some(fresh.as_str())
        );
        assert!(doc.managed_files.contains_key(&fresh));
        assert!(outcome.report.warnings().any(|e| e.message.contains("stale")));
        assert!(outcome.report.is_success());
    }

    #[test]
    fn test_external_files_mode_stages_content() {
        let mut fx = fixture();
        fx.store.seed("content", row(63, 1).with("assets", "img/logo.png"));

        let outcome = export(
            &fx,
            ExportConfig {
                files_external: true,
                ..tree_config()
            },
        );
        let doc = &outcome.document;
        let digest = content_digest(b"logo-bytes");
        let entry = &doc.files[&digest];
        assert!(entry.content.is_none());
        assert_eq!(entry.external_ref.as_deref(), Some(digest.as_str()));

        let staging = outcome.external_files.as_ref().unwrap();
        let staged = staging.path().join(&digest);
        assert_eq!(std::fs::read(staged).unwrap(), b"logo-bytes");
    }

    #[test]
    fn test_explicit_seed_missing_record_is_error() {
        let fx = fixture();
        let outcome = export(
            &fx,
            ExportConfig {
                records: vec![RecordId::new("content", 999)],
                ..Default::default()
            },
        );
        assert!(!outcome.report.is_success());
    }

    #[test]
    fn test_metadata_filled() {
        let fx = fixture();
        let outcome = export(&fx, tree_config());
        let meta = &outcome.document.header.meta;
        assert_eq!(meta.title, "test");
        assert_eq!(meta.author, "tester");
        assert!(!meta.generator_version.is_empty());
        assert!(meta.created_at.ends_with('Z'));
        assert!(outcome
            .document
            .header
            .relation_config
            .static_tables
            .contains("languages"));
    }
}
