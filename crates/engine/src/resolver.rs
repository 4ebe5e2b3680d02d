//! Relation resolver
//!
//! Wraps the reference-index collaborator and normalizes its raw output
//! into the Document's relation entries. Pure over its inputs and
//! collaborator calls: given the same record, schema and index state it
//! produces the same entries.
//!
//! Two shapes are preserved deliberately:
//! - a field with no relation configuration yields no entry at all;
//! - a configured relation that resolved to nothing yields an entry with
//!   an empty item list.
//!
//! De-duplication rule: when a hard file relation and a soft reference on
//! the same field resolve to the same asset, the soft reference is
//! suppressed — the hard relation wins, a link must not be archived twice.

use sitepack_core::{RecordData, RecordId, Result, RunReport, Schema, TableRole};
use sitepack_model::{content_digest, FileId, RelationEntry, SoftRef, Substitution};
use sitepack_store::{RawKind, RawRelation, RawSoftRef, RawTarget, RecordStore, ReferenceIndex};
use std::collections::BTreeMap;

/// Where an archived blob's bytes come from at attachment time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSource {
    /// Path relative to the blob store root
    pub path: String,
    /// Modification time (unix seconds)
    pub mtime: i64,
}

/// Output of resolving one record's relations
#[derive(Debug, Default)]
pub struct ResolvedRelations {
    /// field name → normalized relation entry
    pub entries: BTreeMap<String, RelationEntry>,
    /// digest → blob source, for the post-closure attachment pass
    pub file_sources: BTreeMap<FileId, FileSource>,
    /// field name → field value with soft-reference matches tokenized
    pub tokenized: BTreeMap<String, String>,
}

/// Soft-reference token marker written into stored field values
pub fn softref_marker(token_id: &str) -> String {
    format!("{{softref:{token_id}}}")
}

/// Relation resolver over the reference-index collaborator
pub struct RelationResolver<'a> {
    schema: &'a Schema,
    index: &'a dyn ReferenceIndex,
    store: &'a dyn RecordStore,
}

impl<'a> RelationResolver<'a> {
    /// Create a resolver
    pub fn new(
        schema: &'a Schema,
        index: &'a dyn ReferenceIndex,
        store: &'a dyn RecordStore,
    ) -> Self {
        Self {
            schema,
            index,
            store,
        }
    }

    /// Resolve one record's relations
    pub fn resolve(
        &self,
        id: &RecordId,
        row: &RecordData,
        report: &mut RunReport,
    ) -> Result<ResolvedRelations> {
        let raw = self.index.relations_of(&id.table, row)?;
        let mut out = ResolvedRelations::default();

        for (field, raw_relation) in raw {
            let entry =
                self.build_entry(id, &field, &raw_relation, &mut out.file_sources, report);

            let hard_file_items: Vec<FileId> = entry
                .as_ref()
                .map(|e| e.referenced_files().into_iter().cloned().collect())
                .unwrap_or_default();
            let hard_record_items: Vec<RecordId> = entry
                .as_ref()
                .and_then(|e| e.direct_items().map(|items| items.to_vec()))
                .unwrap_or_default();

            let soft_refs = self.resolve_soft_refs(
                id,
                &field,
                &raw_relation.soft_refs,
                &hard_file_items,
                &hard_record_items,
                &mut out.file_sources,
                report,
            );

            // Tokenize surviving soft references (including the ones nested
            // in structured children) into the stored field value.
            let mut all_tokens: Vec<&SoftRef> = soft_refs.iter().collect();
            if let Some(e) = &entry {
                collect_child_soft_refs(e, &mut all_tokens);
            }
            if !all_tokens.is_empty() {
                let original = row.get(&field).map(|v| v.to_field_string()).unwrap_or_default();
                let mut text = original;
                for soft in &all_tokens {
                    text = text.replacen(&soft.matched, &softref_marker(&soft.token_id), 1);
                }
                out.tokenized.insert(field.clone(), text);
            }

            let entry = match (entry, soft_refs.is_empty()) {
                (Some(mut e), false) => {
                    e.soft_refs = soft_refs;
                    Some(e)
                }
                (Some(e), true) => Some(e),
                // A field with no relation config but found soft refs still
                // gets an entry to carry them.
                (None, false) => {
                    Some(RelationEntry::direct(vec![]).with_soft_refs(soft_refs))
                }
                (None, true) => None,
            };

            if let Some(entry) = entry {
                out.entries.insert(field, entry);
            }
        }

        Ok(out)
    }

    fn build_entry(
        &self,
        id: &RecordId,
        field: &str,
        raw: &RawRelation,
        file_sources: &mut BTreeMap<FileId, FileSource>,
        report: &mut RunReport,
    ) -> Option<RelationEntry> {
        match raw.kind.as_ref()? {
            RawKind::Records(items) => Some(RelationEntry::direct(items.clone())),
            RawKind::Files(files) => {
                let mut items = Vec::new();
                for file in files {
                    if file.digest.is_empty() {
                        report.error(
                            id.clone(),
                            format!("file '{}' in field '{field}' could not be read", file.path),
                        );
                        continue;
                    }
                    file_sources.insert(
                        file.digest.clone(),
                        FileSource {
                            path: file.path.clone(),
                            mtime: file.mtime,
                        },
                    );
                    items.push(file.digest.clone());
                }
                Some(RelationEntry::file(items))
            }
            RawKind::Structured(children) => {
                let mut child_relations = BTreeMap::new();
                let mut child_soft_refs = BTreeMap::new();
                for (path, child_raw) in children {
                    let scoped_field = format!("{field}.{path}");
                    if let Some(child_entry) =
                        self.build_entry(id, &scoped_field, child_raw, file_sources, report)
                    {
                        child_relations.insert(path.clone(), child_entry);
                    }
                    let refs = self.resolve_soft_refs(
                        id,
                        &scoped_field,
                        &child_raw.soft_refs,
                        &[],
                        &[],
                        file_sources,
                        report,
                    );
                    if !refs.is_empty() {
                        child_soft_refs.insert(path.clone(), refs);
                    }
                }
                Some(RelationEntry::structured(child_relations, child_soft_refs))
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn resolve_soft_refs(
        &self,
        id: &RecordId,
        field: &str,
        raw_refs: &[RawSoftRef],
        hard_file_items: &[FileId],
        hard_record_items: &[RecordId],
        file_sources: &mut BTreeMap<FileId, FileSource>,
        report: &mut RunReport,
    ) -> Vec<SoftRef> {
        let mut out = Vec::new();
        for (idx, raw) in raw_refs.iter().enumerate() {
            let token_id = content_digest(
                format!("{}:{}:{}:{}:{}", id.table, id.uid, field, idx, raw.matched).as_bytes(),
            );
            let substitution = match &raw.target {
                RawTarget::Record(target) => Substitution::Record(target.clone()),
                RawTarget::File { path, digest } => {
                    if digest.is_empty() {
                        report.warn(
                            id.clone(),
                            format!(
                                "soft-referenced file '{path}' in field '{field}' could not \
                                 be read, keeping literal text"
                            ),
                        );
                        Substitution::Literal(raw.matched.clone())
                    } else if hard_file_items.contains(digest)
                        || self.hard_relation_covers_asset(hard_record_items, digest)
                    {
                        // The hard relation wins; the soft duplicate is
                        // suppressed entirely.
                        continue;
                    } else {
                        file_sources.insert(
                            digest.clone(),
                            FileSource {
                                path: path.clone(),
                                mtime: 0,
                            },
                        );
                        Substitution::File(digest.clone())
                    }
                }
            };
            out.push(SoftRef {
                token_id,
                matched: raw.matched.clone(),
                substitution,
            });
        }
        out
    }

    /// True if a hard direct relation already covers the asset with this
    /// digest via a binary-asset record
    fn hard_relation_covers_asset(&self, hard_items: &[RecordId], digest: &str) -> bool {
        let Some(file_table) = self.schema.table_with_role(TableRole::FileRecord) else {
            return false;
        };
        let hash_field = sitepack_core::schema::fields::CONTENT_HASH.to_string();
        hard_items
            .iter()
            .filter(|item| item.table == file_table.name)
            .any(|item| {
                self.store
                    .get(&item.table, item.uid, Some(std::slice::from_ref(&hash_field)))
                    .ok()
                    .flatten()
                    .and_then(|row| row.text(&hash_field).map(|h| h == digest))
                    .unwrap_or(false)
            })
    }
}

fn collect_child_soft_refs<'a>(entry: &'a RelationEntry, out: &mut Vec<&'a SoftRef>) {
    if let sitepack_model::RelationKind::Structured {
        child_relations,
        child_soft_refs,
    } = &entry.kind
    {
        for refs in child_soft_refs.values() {
            out.extend(refs.iter());
        }
        for child in child_relations.values() {
            collect_child_soft_refs(child, out);
        }
    }
}
