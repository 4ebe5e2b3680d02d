//! Import engine
//!
//! Reconstitutes a Document into a target repository. Phase ordering is the
//! crux of correctness: relation targets are not writable until their new
//! identifiers exist, but new identifiers are assigned by the write step
//! itself. The engine therefore writes everything with blanked relation
//! fields first, records every assigned identifier in the append-only
//! import mapping, and patches relations in dedicated later passes:
//!
//! 1. storage pre-pass (match or create declared storages)
//! 2. managed binary-asset pre-pass (find-or-create by content hash)
//! 3. pages in tree order (parents before children)
//! 4. bulk records in reverse insertion order, relation fields blanked
//! 5. identifier mapping (maintained by every write above)
//! 6. deferred relation patch through the mapping
//! 7. structured-field patch (re-parse, walk, write back)
//! 8. soft-reference substitution per token mode
//! 9. ordering fix-up for updated records
//!
//! Every step accumulates into the shared report rather than aborting; the
//! run is failed iff the report holds errors. Partial writes are not
//! rolled back.

use sitepack_core::{
    Context, Error, RecordData, RecordId, Result, RunReport, Schema, SoftRefMode, RelationTarget,
    RootLevel, TableRole, Value, UID_NONE,
};
use sitepack_model::{
    Document, FileEntry, FileId, RelationEntry, RelationKind, SoftRef, Substitution,
};
use sitepack_store::{join_blob_path, BlobStore, RecordStore};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::observer::{ImportObserver, ImportPhase};
use crate::resolver::softref_marker;

/// Per-record import behavior override
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    /// Do not import this record at all
    Exclude,
    /// Always create a new record, even in update mode
    AsNew,
    /// Request the exact archive identifier (elevated permission only)
    ForceUid,
    /// On update, keep the target-side parent untouched
    IgnorePid,
    /// On update, re-apply the archive parent even under a global ignore
    RespectPid,
}

impl ImportMode {
    /// Parse the CLI spelling of a mode
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "exclude" => Some(Self::Exclude),
            "as-new" => Some(Self::AsNew),
            "force-uid" => Some(Self::ForceUid),
            "ignore-pid" => Some(Self::IgnorePid),
            "respect-pid" => Some(Self::RespectPid),
            _ => None,
        }
    }
}

/// Import run configuration
#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// Page the imported tree roots are attached under
    pub destination_pid: i64,
    /// Update records in place instead of always creating
    pub update: bool,
    /// On update, keep target-side parents untouched
    pub ignore_pid: bool,
    /// Request original identifiers for every record
    pub force_uids: bool,
    /// Per-record mode overrides
    pub overrides: BTreeMap<RecordId, ImportMode>,
    /// Operator-supplied values for editable soft-reference tokens
    pub softref_overrides: BTreeMap<String, String>,
    /// Extensions the target provides (checked against archive dependencies)
    pub available_extensions: BTreeSet<String>,
    /// Sibling directory holding externally-stored blob content
    pub external_files_dir: Option<PathBuf>,
    /// Target blob directory for materialized files
    pub asset_dir: String,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            destination_pid: UID_NONE,
            update: false,
            ignore_pid: false,
            force_uids: false,
            overrides: BTreeMap::new(),
            softref_overrides: BTreeMap::new(),
            available_extensions: BTreeSet::new(),
            external_files_dir: None,
            asset_dir: "imported".to_string(),
        }
    }
}

/// Append-only archive-uid → target-uid mapping
///
/// Once a mapping is set it is never overwritten; the first write wins for
/// the whole run.
#[derive(Debug, Default, Clone)]
pub struct ImportMapping {
    map: BTreeMap<RecordId, i64>,
}

impl ImportMapping {
    /// Record a mapping; a second insert for the same key is ignored
    pub fn insert(&mut self, id: RecordId, target_uid: i64) {
        self.map.entry(id).or_insert(target_uid);
    }

    /// Look up the target uid for an archive identifier
    pub fn get(&self, id: &RecordId) -> Option<i64> {
        self.map.get(id).copied()
    }

    /// Number of mapped identifiers
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// True if nothing was mapped
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterate mappings in key order
    pub fn iter(&self) -> impl Iterator<Item = (&RecordId, &i64)> {
        self.map.iter()
    }
}

/// Result of one import run
#[derive(Debug)]
pub struct ImportOutcome {
    /// Accumulated errors and warnings; success ⇔ no errors
    pub report: RunReport,
    /// Archive → target identifier mapping
    pub mapping: ImportMapping,
    /// The destination page the run imported under
    pub destination_pid: i64,
}

#[derive(Debug, Clone)]
struct Materialized {
    relpath: String,
    asset_uid: Option<i64>,
}

/// Import engine
pub struct Importer<'a> {
    ctx: &'a Context,
    schema: &'a Schema,
    store: &'a mut dyn RecordStore,
    blobs: &'a mut dyn BlobStore,
    observers: Vec<Box<dyn ImportObserver + 'a>>,
    config: ImportConfig,

    doc: Document,
    report: RunReport,
    mapping: ImportMapping,
    storage_map: BTreeMap<i64, i64>,
    materialized: BTreeMap<FileId, Materialized>,
    updated_in_place: BTreeSet<RecordId>,
}

impl<'a> Importer<'a> {
    /// Create an import engine for one run over the given Document
    pub fn new(
        ctx: &'a Context,
        schema: &'a Schema,
        store: &'a mut dyn RecordStore,
        blobs: &'a mut dyn BlobStore,
        doc: Document,
        config: ImportConfig,
    ) -> Self {
        Self {
            ctx,
            schema,
            store,
            blobs,
            observers: Vec::new(),
            config,
            doc,
            report: RunReport::new(),
            mapping: ImportMapping::default(),
            storage_map: BTreeMap::new(),
            materialized: BTreeMap::new(),
            updated_in_place: BTreeSet::new(),
        }
    }

    /// Attach an observer
    pub fn with_observer(mut self, observer: Box<dyn ImportObserver + 'a>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Run the import
    pub fn run(mut self) -> Result<ImportOutcome> {
        self.check_prerequisites()?;
        self.pass_storages()?;
        self.pass_managed_files()?;
        self.pass_pages()?;
        self.pass_records()?;
        self.pass_relations()?;
        self.pass_structured()?;
        self.pass_soft_refs()?;
        self.pass_ordering()?;

        Ok(ImportOutcome {
            report: self.report,
            mapping: self.mapping,
            destination_pid: self.config.destination_pid,
        })
    }

    fn mode(&self, id: &RecordId) -> Option<ImportMode> {
        self.config.overrides.get(id).copied()
    }

    fn excluded(&self, id: &RecordId) -> bool {
        self.mode(id) == Some(ImportMode::Exclude)
    }

    fn notify(&mut self, phase: ImportPhase, batch: &[RecordId], before: bool) {
        for observer in &mut self.observers {
            if before {
                observer.before_write(phase, batch);
            } else {
                observer.after_write(phase, batch);
            }
        }
    }

    // =========================================================================
    // Prerequisites
    // =========================================================================

    /// Hard checks before any target mutation
    fn check_prerequisites(&self) -> Result<()> {
        for dep in &self.doc.header.relation_config.extension_dependencies {
            if !self.config.available_extensions.contains(dep) {
                return Err(Error::MissingDependency(dep.clone()));
            }
        }

        let needs_external = self
            .doc
            .files
            .values()
            .chain(self.doc.managed_files.values())
            .any(|f| f.content.is_none() && f.external_ref.is_some());
        if needs_external {
            match &self.config.external_files_dir {
                Some(dir) if dir.is_dir() => {}
                Some(dir) => {
                    return Err(Error::StorageUnavailable(format!(
                        "external files directory '{}' is not readable",
                        dir.display()
                    )))
                }
                None => {
                    return Err(Error::StorageUnavailable(
                        "archive stores files externally but no files directory was given"
                            .to_string(),
                    ))
                }
            }
        }
        Ok(())
    }

    /// Blob content of a file entry, inline or from the external directory
    fn file_content(&self, entry: &FileEntry) -> Option<Vec<u8>> {
        if let Some(content) = &entry.content {
            return Some(content.clone());
        }
        let external = entry.external_ref.as_ref()?;
        let dir = self.config.external_files_dir.as_ref()?;
        std::fs::read(dir.join(external)).ok()
    }

    // =========================================================================
    // Step 1: storages
    // =========================================================================

    fn pass_storages(&mut self) -> Result<()> {
        use sitepack_core::schema::fields;

        let Some(storage_table) = self.schema.table_with_role(TableRole::FileStorage) else {
            return Ok(());
        };
        let table = storage_table.name.clone();

        let declared: Vec<(RecordId, RecordData)> = self
            .doc
            .records_of_table(&table)
            .map(|(id, e)| (id.clone(), e.data.clone()))
            .collect();
        if declared.is_empty() {
            return Ok(());
        }
        let batch: Vec<RecordId> = declared.iter().map(|(id, _)| id.clone()).collect();
        self.notify(ImportPhase::Storages, &batch, true);

        let existing = self.store.query(&table, UID_NONE, "")?;
        let default_storage = existing.first().and_then(|r| r.uid()).unwrap_or(UID_NONE);

        for (id, data) in declared {
            if self.excluded(&id) {
                continue;
            }
            let matched = existing.iter().find(|candidate| {
                [fields::DRIVER, fields::BASE_PATH, fields::WRITABLE, fields::ONLINE]
                    .iter()
                    .all(|f| {
                        candidate.get(f).map(|v| v.to_field_string())
                            == data.get(f).map(|v| v.to_field_string())
                    })
            });

            if let Some(found) = matched {
                let target_uid = found.uid().unwrap_or(UID_NONE);
                debug!(storage = %id, target_uid, "reusing matching storage");
                self.storage_map.insert(id.uid, target_uid);
                self.mapping.insert(id, target_uid);
                continue;
            }

            let local = data.text(fields::DRIVER).unwrap_or("") == "local";
            let writable = data.int(fields::WRITABLE).unwrap_or(0) != 0;
            let online = data.int(fields::ONLINE).unwrap_or(0) != 0;
            if local && writable && online {
                let mut row = data.clone();
                row.remove("uid");
                row.set("pid", Value::Int(UID_NONE));
                match self.store.create(&table, &row, None) {
                    Ok(uid) => {
                        self.storage_map.insert(id.uid, uid);
                        self.mapping.insert(id, uid);
                    }
                    Err(e) => self.report.error(id, format!("storage create failed: {e}")),
                }
            } else {
                // Non-reusable declared storages are redirected, not cloned.
                self.report.warn(
                    id.clone(),
                    "declared storage is not reusable here, redirecting to the default storage",
                );
                self.storage_map.insert(id.uid, default_storage);
                self.mapping.insert(id, default_storage);
            }
        }

        self.notify(ImportPhase::Storages, &batch, false);
        Ok(())
    }

    // =========================================================================
    // Step 2: managed binary assets
    // =========================================================================

    fn pass_managed_files(&mut self) -> Result<()> {
        use sitepack_core::schema::fields;

        let Some(file_table) = self.schema.table_with_role(TableRole::FileRecord) else {
            return Ok(());
        };
        let table = file_table.name.clone();

        let batch: Vec<RecordId> = self
            .doc
            .order
            .iter()
            .filter(|id| id.table == table)
            .cloned()
            .collect();
        if batch.is_empty() {
            return Ok(());
        }
        self.notify(ImportPhase::ManagedFiles, &batch, true);

        let existing = self.store.query(&table, UID_NONE, "")?;

        for id in batch.clone() {
            if self.excluded(&id) {
                continue;
            }
            let Some(entry) = self.doc.record(&id) else {
                continue;
            };
            let data = entry.data.clone();
            let hash = data.text(fields::CONTENT_HASH).unwrap_or_default().to_string();
            let Some(file_entry) = self.doc.managed_files.get(&hash).cloned() else {
                self.report
                    .error(id, "archive holds no content for this binary asset");
                continue;
            };
            let Some(content) = self.file_content(&file_entry) else {
                self.report
                    .error(id, "binary-asset content missing from archive files");
                continue;
            };

            let archive_storage = data.int(fields::STORAGE).unwrap_or(UID_NONE);
            let target_storage = self
                .storage_map
                .get(&archive_storage)
                .copied()
                .unwrap_or(UID_NONE);
            let identifier = data.text(fields::IDENTIFIER).unwrap_or_default().to_string();

            // Find-or-create: an existing row with the same identifier is
            // reused when the content matches, shadowed otherwise.
            let same_identifier = existing.iter().find(|row| {
                row.text(fields::IDENTIFIER) == Some(identifier.as_str())
                    && row.int(fields::STORAGE).unwrap_or(UID_NONE) == target_storage
            });

            let (target_uid, final_identifier) = match same_identifier {
                Some(row) if row.text(fields::CONTENT_HASH) == Some(hash.as_str()) => {
                    (row.uid().unwrap_or(UID_NONE), identifier.clone())
                }
                other => {
                    let final_identifier = if other.is_some() || self.blobs.exists(&identifier) {
                        let (dir, base) = split_blob_path(&identifier);
                        join_blob_path(&dir, &self.blobs.unique_name(&base, &dir))
                    } else {
                        identifier.clone()
                    };
                    if let Err(e) = self.blobs.write(&final_identifier, &content) {
                        self.report
                            .error(id.clone(), format!("asset content write failed: {e}"));
                        continue;
                    }
                    let mut row = data.clone();
                    row.remove("uid");
                    row.set("pid", Value::Int(UID_NONE));
                    row.set(fields::STORAGE, Value::Text(target_storage.to_string()));
                    row.set(fields::IDENTIFIER, Value::Text(final_identifier.clone()));
                    row.set(fields::CONTENT_HASH, Value::Text(hash.clone()));
                    row.set(fields::SIZE, Value::Int(content.len() as i64));
                    let requested = self.requested_uid(&id);
                    match self.store.create(&table, &row, requested) {
                        Ok(uid) => (uid, final_identifier),
                        Err(e) => {
                            self.report
                                .error(id.clone(), format!("asset record create failed: {e}"));
                            continue;
                        }
                    }
                }
            };

            debug!(asset = %id, target_uid, "mapped binary asset");
            self.mapping.insert(id, target_uid);
            self.materialized.insert(
                hash,
                Materialized {
                    relpath: final_identifier,
                    asset_uid: Some(target_uid),
                },
            );
        }

        self.notify(ImportPhase::ManagedFiles, &batch, false);
        Ok(())
    }

    // =========================================================================
    // Steps 3–5: record writes and the identifier mapping
    // =========================================================================

    fn requested_uid(&mut self, id: &RecordId) -> Option<i64> {
        let wanted = self.config.force_uids || self.mode(id) == Some(ImportMode::ForceUid);
        if !wanted {
            return None;
        }
        if !self.ctx.elevated {
            self.report.error(
                id.clone(),
                "forcing original identifiers requires elevated permission, assigning a new one",
            );
            return None;
        }
        Some(id.uid)
    }

    /// Page pre-pass: tree order so parents exist before their children
    fn pass_pages(&mut self) -> Result<()> {
        let page_table = self.schema.page_table().to_string();

        let tree_uids = self.doc.header.tree_page_uids();
        let mut batch: Vec<RecordId> = tree_uids
            .iter()
            .map(|uid| RecordId::new(page_table.clone(), *uid))
            .collect();
        let remaining: Vec<RecordId> = self
            .doc
            .order
            .iter()
            .filter(|id| id.table == page_table && !tree_uids.contains(&id.uid))
            .cloned()
            .collect();
        batch.extend(remaining.clone());
        if batch.is_empty() {
            return Ok(());
        }
        self.notify(ImportPhase::Pages, &batch, true);

        let tree = self.doc.header.page_tree.clone();
        for root in &tree {
            self.write_page_subtree(&page_table, root, self.config.destination_pid);
        }
        for id in remaining {
            self.write_record(&id, self.config.destination_pid);
        }

        self.notify(ImportPhase::Pages, &batch, false);
        Ok(())
    }

    fn write_page_subtree(
        &mut self,
        page_table: &str,
        node: &sitepack_model::PageTreeNode,
        parent_pid: i64,
    ) {
        let id = RecordId::new(page_table, node.uid);
        let own_pid = self.write_record(&id, parent_pid).unwrap_or(parent_pid);
        for child in &node.children {
            self.write_page_subtree(page_table, child, own_pid);
        }
    }

    /// Bulk record pre-pass, reverse insertion order
    ///
    /// A heuristic, not a guarantee: later-declared records are more likely
    /// to be relation sources. Forward references are what the deferred
    /// patch pass exists for.
    fn pass_records(&mut self) -> Result<()> {
        let page_table = self.schema.page_table().to_string();
        let skip_tables: BTreeSet<String> = [
            Some(page_table),
            self.schema
                .table_with_role(TableRole::FileStorage)
                .map(|t| t.name.clone()),
            self.schema
                .table_with_role(TableRole::FileRecord)
                .map(|t| t.name.clone()),
        ]
        .into_iter()
        .flatten()
        .collect();

        let batch: Vec<RecordId> = self
            .doc
            .order
            .iter()
            .rev()
            .filter(|id| !skip_tables.contains(&id.table))
            .cloned()
            .collect();
        if batch.is_empty() {
            return Ok(());
        }
        self.notify(ImportPhase::Records, &batch, true);

        for id in batch.clone() {
            let archive_pid = self
                .doc
                .record(&id)
                .and_then(|e| e.data.pid())
                .unwrap_or(UID_NONE);
            let desired_pid = self.resolve_pid(archive_pid);
            self.write_record(&id, desired_pid);
        }

        self.notify(ImportPhase::Records, &batch, false);
        Ok(())
    }

    /// Map an archive page id to the target side, falling back to the
    /// destination parent
    fn resolve_pid(&self, archive_pid: i64) -> i64 {
        if archive_pid == UID_NONE {
            return UID_NONE;
        }
        let page_id = RecordId::new(self.schema.page_table(), archive_pid);
        self.mapping
            .get(&page_id)
            .unwrap_or(self.config.destination_pid)
    }

    /// Write one record with blanked relation fields; returns the target uid
    fn write_record(&mut self, id: &RecordId, desired_pid: i64) -> Option<i64> {
        if self.excluded(id) {
            debug!(record = %id, "excluded by operator override");
            return None;
        }
        let entry = self.doc.record(id)?.clone();
        let Some(table_schema) = self.schema.table(&id.table) else {
            self.report
                .error(id.clone(), "table is not part of the target schema");
            return None;
        };
        if table_schema.is_static {
            self.report
                .error(id.clone(), "static table records cannot be imported");
            return None;
        }
        if table_schema.read_only {
            self.report
                .error(id.clone(), "table is read-only on the target");
            return None;
        }
        if table_schema.admin_only && !self.ctx.elevated {
            self.report
                .error(id.clone(), "table requires elevated permission");
            return None;
        }

        let pid = match table_schema.root_level {
            RootLevel::RootOnly => {
                if desired_pid != UID_NONE {
                    self.report.warn(
                        id.clone(),
                        "table is root-level only, placing the record at the root",
                    );
                }
                UID_NONE
            }
            RootLevel::PagesOnly if desired_pid == UID_NONE => {
                self.report
                    .error(id.clone(), "table records cannot live at the tree root");
                return None;
            }
            _ => desired_pid,
        };

        let mut data = entry.data.clone();
        data.remove("uid");
        data.set("pid", Value::Int(pid));
        if !self.blank_relation_fields(id, table_schema, &mut data) {
            return None;
        }

        let mode = self.mode(id);
        if self.config.update && mode != Some(ImportMode::AsNew) {
            if let Ok(Some(_)) = self.store.get(&id.table, id.uid, None) {
                let ignore_pid = (self.config.ignore_pid || mode == Some(ImportMode::IgnorePid))
                    && mode != Some(ImportMode::RespectPid);
                if ignore_pid {
                    data.remove("pid");
                }
                return match self.store.update(&id.table, id.uid, &data) {
                    Ok(()) => {
                        self.mapping.insert(id.clone(), id.uid);
                        self.updated_in_place.insert(id.clone());
                        Some(id.uid)
                    }
                    Err(e) => {
                        self.report.error(id.clone(), format!("update failed: {e}"));
                        None
                    }
                };
            }
        }

        let requested = self.requested_uid(id);
        match self.store.create(&id.table, &data, requested) {
            Ok(uid) => {
                debug!(record = %id, uid, "created record");
                self.mapping.insert(id.clone(), uid);
                Some(uid)
            }
            Err(e) => {
                self.report.error(id.clone(), format!("create failed: {e}"));
                None
            }
        }
    }

    /// Blank every relation-bearing field before the first write
    ///
    /// The one exception: an asset-reference record's pointer field is
    /// patched immediately, because the reference-type validator on the
    /// write path requires a valid target. Returns false when the record
    /// must be dropped (its asset never mapped).
    fn blank_relation_fields(
        &mut self,
        id: &RecordId,
        table_schema: &sitepack_core::TableSchema,
        data: &mut RecordData,
    ) -> bool {
        use sitepack_core::schema::fields;

        let is_file_reference = table_schema.role == TableRole::FileReference;
        let file_table = self
            .schema
            .table_with_role(TableRole::FileRecord)
            .map(|t| t.name.clone());

        for (field, field_schema) in &table_schema.fields {
            if field_schema.relation.is_none() || !data.contains(field) {
                continue;
            }
            if is_file_reference && field == fields::FILE {
                let target = data.int(fields::FILE).unwrap_or(UID_NONE);
                let mapped = file_table
                    .as_ref()
                    .and_then(|t| self.mapping.get(&RecordId::new(t.clone(), target)));
                match mapped {
                    Some(uid) => data.set(fields::FILE, Value::Text(uid.to_string())),
                    None => {
                        self.report.error(
                            id.clone(),
                            "dropping asset reference: its binary asset failed to map",
                        );
                        return false;
                    }
                }
                continue;
            }
            data.set(field.clone(), Value::Text(String::new()));
        }
        true
    }

    // =========================================================================
    // Step 6: deferred relation patch
    // =========================================================================

    fn pass_relations(&mut self) -> Result<()> {
        let batch: Vec<RecordId> = self
            .doc
            .order
            .iter()
            .filter(|id| self.mapping.get(id).is_some())
            .cloned()
            .collect();
        if batch.is_empty() {
            return Ok(());
        }
        self.notify(ImportPhase::Relations, &batch, true);

        for id in batch.clone() {
            let Some(target_uid) = self.mapping.get(&id) else {
                continue;
            };
            let Some(entry) = self.doc.record(&id) else {
                continue;
            };
            if entry.has_been_mapped {
                continue;
            }
            let entry = entry.clone();
            let Some(table_schema) = self.schema.table(&id.table) else {
                continue;
            };
            let is_file_reference = table_schema.role == TableRole::FileReference;

            let mut updates = RecordData::new();
            for (field, relation) in &entry.relations {
                if is_file_reference && field == sitepack_core::schema::fields::FILE {
                    // Patched at write time already.
                    continue;
                }
                // Only fields the schema declares as relations are patched;
                // an entry that exists purely to carry soft references (an
                // empty direct entry on a text field) keeps its tokenized
                // text for the soft-reference pass.
                let field_relation = table_schema
                    .field_schema(field)
                    .and_then(|f| f.relation.as_ref());
                match &relation.kind {
                    RelationKind::Direct { items } => {
                        let Some(RelationTarget::Direct { tables }) = field_relation else {
                            continue;
                        };
                        let value = self.patch_direct_items(&id, items, tables.len() > 1);
                        updates.set(field.clone(), Value::Text(value));
                    }
                    RelationKind::File { items } => {
                        if !matches!(field_relation, Some(RelationTarget::File)) {
                            continue;
                        }
                        let value = self.patch_file_items(&id, items);
                        updates.set(field.clone(), Value::Text(value));
                    }
                    RelationKind::Structured { .. } => {
                        // Restore the archived structured value verbatim; the
                        // structured pass re-parses and patches it next.
                        if let Some(original) = entry.data.get(field) {
                            updates.set(field.clone(), original.clone());
                        }
                    }
                }
            }

            if !updates.is_empty() {
                if let Err(e) = self.store.update(&id.table, target_uid, &updates) {
                    self.report
                        .error(id.clone(), format!("relation patch failed: {e}"));
                }
            }
            if let Some(entry) = self.doc.record_mut(&id) {
                entry.has_been_mapped = true;
            }
        }

        self.notify(ImportPhase::Relations, &batch, false);
        Ok(())
    }

    /// True if relation items of this table pass through unresolved
    ///
    /// Covers static tables and sentinel uids (zero = "no record", negative
    /// = static values such as "all languages").
    fn passes_through(&self, item: &RecordId) -> bool {
        item.uid <= 0
            || self
                .doc
                .header
                .relation_config
                .static_tables
                .contains(&item.table)
            || self.schema.is_static(&item.table)
    }

    fn patch_direct_items(&mut self, source: &RecordId, items: &[RecordId], multi: bool) -> String {
        let mut out = Vec::new();
        for item in items {
            if self.passes_through(item) {
                out.push(render_item(item, multi));
                continue;
            }
            match self.mapping.get(item) {
                Some(uid) => out.push(render_item(&RecordId::new(item.table.clone(), uid), multi)),
                None => {
                    self.report.error(
                        source.clone(),
                        format!("lost relation to {item}: target was not imported"),
                    );
                }
            }
        }
        out.join(",")
    }

    fn patch_file_items(&mut self, source: &RecordId, items: &[FileId]) -> String {
        let mut out = Vec::new();
        for digest in items {
            match self.materialize_file(digest, false) {
                Some(relpath) => out.push(relpath),
                None => {
                    self.report.error(
                        source.clone(),
                        format!("lost file relation {digest}: content not materializable"),
                    );
                }
            }
        }
        out.join(",")
    }

    /// Copy an archived blob into the target, once per digest
    ///
    /// With `create_asset_record` the blob also gets a binary-asset row
    /// (created at most once, shared across all referencing records).
    fn materialize_file(&mut self, digest: &FileId, create_asset_record: bool) -> Option<String> {
        if let Some(done) = self.materialized.get(digest).cloned() {
            if create_asset_record && done.asset_uid.is_none() {
                let uid = self.create_asset_record(digest, &done.relpath)?;
                if let Some(entry) = self.materialized.get_mut(digest) {
                    entry.asset_uid = Some(uid);
                }
            }
            return Some(self.materialized.get(digest)?.relpath.clone());
        }

        let entry = self.doc.any_file(digest)?.clone();
        let content = self.file_content(&entry)?;

        let (_, base) = split_blob_path(&entry.filename);
        let dir = self.config.asset_dir.clone();
        let name = self.blobs.unique_name(&base, &dir);
        let relpath = join_blob_path(&dir, &name);
        if let Err(e) = self.blobs.write(&relpath, &content) {
            warn!(digest = %digest, "blob write failed: {e}");
            return None;
        }

        // Replicate embedded-resource rewrites: materialize each referenced
        // resource and swap its placeholder for the new location.
        if !entry.external_resources.is_empty() {
            if let Ok(mut text) = String::from_utf8(content.clone()) {
                for resource in &entry.external_resources {
                    if let Some(resource_path) = self.materialize_file(resource, false) {
                        text = text.replace(
                            &format!("{{resource:{resource}}}"),
                            &resource_path,
                        );
                    }
                }
                if let Err(e) = self.blobs.write(&relpath, text.as_bytes()) {
                    warn!(digest = %digest, "blob rewrite failed: {e}");
                }
            }
        }

        let asset_uid = if create_asset_record {
            self.create_asset_record(digest, &relpath)
        } else {
            None
        };

        self.materialized.insert(
            digest.clone(),
            Materialized {
                relpath: relpath.clone(),
                asset_uid,
            },
        );
        Some(relpath)
    }

    fn create_asset_record(&mut self, digest: &FileId, relpath: &str) -> Option<i64> {
        use sitepack_core::schema::fields;

        let table = self.schema.table_with_role(TableRole::FileRecord)?.name.clone();
        let entry = self.doc.any_file(digest)?;
        let (_, base) = split_blob_path(relpath);
        let size = entry.content.as_ref().map(|c| c.len() as i64).unwrap_or(0);
        let row = RecordData::new()
            .with("pid", UID_NONE)
            .with(fields::NAME, base)
            .with(fields::IDENTIFIER, relpath)
            .with(fields::STORAGE, "0")
            .with(fields::CONTENT_HASH, digest.clone())
            .with(fields::SIZE, size);
        match self.store.create(&table, &row, None) {
            Ok(uid) => Some(uid),
            Err(e) => {
                self.report.error_global(format!(
                    "asset record create for materialized file failed: {e}"
                ));
                None
            }
        }
    }

    // =========================================================================
    // Step 7: structured fields
    // =========================================================================

    fn pass_structured(&mut self) -> Result<()> {
        let batch: Vec<RecordId> = self
            .doc
            .order
            .iter()
            .filter(|id| {
                self.mapping.get(id).is_some()
                    && self
                        .doc
                        .record(id)
                        .map(|e| {
                            e.relations
                                .values()
                                .any(|r| matches!(r.kind, RelationKind::Structured { .. }))
                        })
                        .unwrap_or(false)
            })
            .cloned()
            .collect();
        if batch.is_empty() {
            return Ok(());
        }
        self.notify(ImportPhase::Structured, &batch, true);

        for id in batch.clone() {
            let Some(target_uid) = self.mapping.get(&id) else {
                continue;
            };
            let entry = match self.doc.record(&id) {
                Some(e) => e.clone(),
                None => continue,
            };
            let Some(table_schema) = self.schema.table(&id.table) else {
                continue;
            };

            for (field, relation) in &entry.relations {
                let RelationKind::Structured {
                    child_relations, ..
                } = &relation.kind
                else {
                    continue;
                };
                let Some(RelationTarget::Structured(def)) = table_schema
                    .field_schema(field)
                    .and_then(|f| f.relation.as_ref())
                else {
                    continue;
                };

                // Re-read the just-written value and the (possibly patched)
                // selector from the target: structure selection may depend
                // on other fields' resolved values.
                let current_row = match self.store.get(&id.table, target_uid, None) {
                    Ok(Some(row)) => row,
                    _ => continue,
                };
                let Some(current_text) = current_row.text(field) else {
                    continue;
                };
                let selector_value = def
                    .selector
                    .as_deref()
                    .and_then(|f| current_row.text(f))
                    .map(str::to_string);
                let Some(variant) = def.variant_for(selector_value.as_deref()) else {
                    continue;
                };

                let Ok(parsed) = serde_json::from_str::<serde_json::Value>(current_text) else {
                    self.report.warn(
                        id.clone(),
                        format!("structured field '{field}' holds no parseable value"),
                    );
                    continue;
                };

                let mut patcher = |path: &str, leaf: &serde_json::Value| {
                    let path_schema = variant.paths.get(path)?;
                    let child = child_relations.get(path)?;
                    self.patch_structured_leaf(&id, path_schema, child, leaf)
                };
                let patched = patch_structured(&parsed, "", &mut patcher);

                let rendered = serde_json::to_string(&patched).unwrap_or_default();
                let updates =
                    RecordData::new().with(field.clone(), Value::Text(rendered));
                if let Err(e) = self.store.update(&id.table, target_uid, &updates) {
                    self.report
                        .error(id.clone(), format!("structured patch failed: {e}"));
                }
            }
        }

        self.notify(ImportPhase::Structured, &batch, false);
        Ok(())
    }

    fn patch_structured_leaf(
        &mut self,
        source: &RecordId,
        path_schema: &sitepack_core::FieldSchema,
        child: &RelationEntry,
        _leaf: &serde_json::Value,
    ) -> Option<serde_json::Value> {
        match path_schema.relation.as_ref()? {
            RelationTarget::Direct { tables } => {
                let items = child.direct_items()?;
                let value = self.patch_direct_items(source, items, tables.len() > 1);
                Some(serde_json::Value::String(value))
            }
            RelationTarget::File => {
                let items = child.file_items()?;
                let value = self.patch_file_items(source, items);
                Some(serde_json::Value::String(value))
            }
            RelationTarget::Structured(_) => None,
        }
    }

    // =========================================================================
    // Step 8: soft references
    // =========================================================================

    fn pass_soft_refs(&mut self) -> Result<()> {
        let batch: Vec<RecordId> = self
            .doc
            .order
            .iter()
            .filter(|id| self.mapping.get(id).is_some())
            .cloned()
            .collect();
        self.notify(ImportPhase::SoftRefs, &batch, true);

        for id in batch.clone() {
            let Some(target_uid) = self.mapping.get(&id) else {
                continue;
            };
            let entry = match self.doc.record(&id) {
                Some(e) => e.clone(),
                None => continue,
            };

            for (field, relation) in &entry.relations {
                let mut refs: Vec<&SoftRef> = relation.soft_refs.iter().collect();
                collect_structured_soft_refs(relation, &mut refs);
                if refs.is_empty() {
                    continue;
                }

                let current = match self.store.get(&id.table, target_uid, None) {
                    Ok(Some(row)) => row.get(field).map(|v| v.to_field_string()),
                    _ => None,
                };
                let Some(mut text) = current else {
                    continue;
                };

                for soft in refs {
                    let marker = softref_marker(&soft.token_id);
                    if !text.contains(&marker) {
                        continue;
                    }
                    let replacement = self.soft_ref_replacement(&id, soft);
                    text = text.replace(&marker, &replacement);
                }

                let updates = RecordData::new().with(field.clone(), Value::Text(text));
                if let Err(e) = self.store.update(&id.table, target_uid, &updates) {
                    self.report
                        .error(id.clone(), format!("soft-reference patch failed: {e}"));
                }
            }
        }

        self.notify(ImportPhase::SoftRefs, &batch, false);
        Ok(())
    }

    /// Regenerated text for one soft-reference token
    fn soft_ref_replacement(&mut self, source: &RecordId, soft: &SoftRef) -> String {
        let mode = self
            .doc
            .header
            .relation_config
            .softref_modes
            .get(&soft.token_id)
            .copied()
            .unwrap_or(SoftRefMode::Default);

        match mode {
            SoftRefMode::Exclude => soft.matched.clone(),
            SoftRefMode::Editable => match self.config.softref_overrides.get(&soft.token_id) {
                Some(value) => value.clone(),
                None => {
                    self.report.warn(
                        source.clone(),
                        "editable soft reference has no operator value, keeping original",
                    );
                    soft.matched.clone()
                }
            },
            SoftRefMode::Default => match &soft.substitution {
                Substitution::Record(target) => {
                    if self.passes_through(target) {
                        return soft.matched.clone();
                    }
                    match self.mapping.get(target) {
                        Some(uid) => format!("rec://{}/{uid}", target.table),
                        None => {
                            self.report.error(
                                source.clone(),
                                format!("lost soft reference to {target}"),
                            );
                            soft.matched.clone()
                        }
                    }
                }
                Substitution::File(digest) => match self.materialize_file(digest, true) {
                    Some(relpath) => format!("file://{relpath}"),
                    None => {
                        self.report.error(
                            source.clone(),
                            format!("lost soft file reference {digest}"),
                        );
                        soft.matched.clone()
                    }
                },
                Substitution::Literal(value) => value.clone(),
            },
        }
    }

    // =========================================================================
    // Step 9: ordering fix-up
    // =========================================================================

    /// Re-apply archive sibling ordering for records updated in place
    fn pass_ordering(&mut self) -> Result<()> {
        if !self.config.update {
            return Ok(());
        }
        let batch: Vec<RecordId> = self.updated_in_place.iter().cloned().collect();
        if batch.is_empty() {
            return Ok(());
        }
        self.notify(ImportPhase::Ordering, &batch, true);

        for id in batch.clone() {
            let Some(target_uid) = self.mapping.get(&id) else {
                continue;
            };
            let Some(sort_field) = self
                .schema
                .table(&id.table)
                .and_then(|t| t.sort_field.clone())
            else {
                continue;
            };
            let Some(entry) = self.doc.record(&id) else {
                continue;
            };
            let Some(sorting) = entry.data.int(&sort_field) else {
                continue;
            };

            let archive_pid = entry.data.pid().unwrap_or(UID_NONE);
            let mode = self.mode(&id);
            let respect_pid = mode == Some(ImportMode::RespectPid)
                || (!self.config.ignore_pid && mode != Some(ImportMode::IgnorePid));
            if respect_pid {
                let new_pid = self.resolve_pid(archive_pid);
                if let Err(e) = self.store.move_record(&id.table, target_uid, new_pid) {
                    self.report
                        .error(id.clone(), format!("ordering move failed: {e}"));
                    continue;
                }
            }
            let updates = RecordData::new().with(sort_field, Value::Int(sorting));
            if let Err(e) = self.store.update(&id.table, target_uid, &updates) {
                self.report
                    .error(id.clone(), format!("ordering update failed: {e}"));
            }
        }

        self.notify(ImportPhase::Ordering, &batch, false);
        Ok(())
    }
}

/// Pure recursive structured-value patcher
///
/// Walks objects by dot path and lets `resolve` replace leaves; everything
/// it declines is kept as-is. Returns a new tree, the input is untouched.
pub fn patch_structured(
    node: &serde_json::Value,
    path: &str,
    resolve: &mut dyn FnMut(&str, &serde_json::Value) -> Option<serde_json::Value>,
) -> serde_json::Value {
    match node {
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.iter()
                .map(|(key, value)| {
                    let child_path = if path.is_empty() {
                        key.clone()
                    } else {
                        format!("{path}.{key}")
                    };
                    (key.clone(), patch_structured(value, &child_path, resolve))
                })
                .collect(),
        ),
        leaf => resolve(path, leaf).unwrap_or_else(|| leaf.clone()),
    }
}

fn collect_structured_soft_refs<'e>(entry: &'e RelationEntry, out: &mut Vec<&'e SoftRef>) {
    if let RelationKind::Structured {
        child_relations,
        child_soft_refs,
    } = &entry.kind
    {
        for refs in child_soft_refs.values() {
            out.extend(refs.iter());
        }
        for child in child_relations.values() {
            out.extend(child.soft_refs.iter());
            collect_structured_soft_refs(child, out);
        }
    }
}

fn render_item(item: &RecordId, multi: bool) -> String {
    if multi {
        item.to_string()
    } else {
        item.uid.to_string()
    }
}

/// Split a blob path into (directory, base name)
fn split_blob_path(path: &str) -> (String, String) {
    match path.rsplit_once('/') {
        Some((dir, base)) => (dir.to_string(), base.to_string()),
        None => (String::new(), path.to_string()),
    }
}
