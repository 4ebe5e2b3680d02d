//! Schema-driven reference index
//!
//! The reference index contract takes a record and answers "which outgoing
//! relations does it carry, per field". This implementation derives the
//! answer from the schema: direct-relation fields hold comma-separated uid
//! lists, file fields hold comma-separated blob paths, structured fields
//! hold a JSON value whose internal schema is declared per variant, and
//! text fields are scanned for embedded soft references.

use sitepack_core::{
    FieldKind, FieldSchema, RecordData, RecordId, RelationTarget, Result, Schema, StructureVariant,
};
use sitepack_model::content_digest;
use std::collections::BTreeMap;

use crate::scan::{scan_soft_refs, ScanTarget};
use crate::traits::{BlobStore, RawFile, RawKind, RawRelation, RawSoftRef, RawTarget, ReferenceIndex};

/// Reference index deriving relations from the schema
pub struct SchemaReferenceIndex<'a> {
    schema: &'a Schema,
    blobs: &'a dyn BlobStore,
}

impl<'a> SchemaReferenceIndex<'a> {
    /// Create an index over the given schema and blob store
    pub fn new(schema: &'a Schema, blobs: &'a dyn BlobStore) -> Self {
        Self { schema, blobs }
    }

    fn raw_file(&self, path: &str) -> RawFile {
        let digest = match self.blobs.read(path) {
            Ok(bytes) => content_digest(&bytes),
            Err(_) => String::new(),
        };
        RawFile {
            path: path.to_string(),
            digest,
            mtime: self.blobs.mtime(path).unwrap_or(0),
        }
    }

    fn scan_text(&self, text: &str) -> Vec<RawSoftRef> {
        scan_soft_refs(text)
            .into_iter()
            .map(|m| {
                let target = match m.target {
                    ScanTarget::Record(id) => RawTarget::Record(id),
                    ScanTarget::FilePath(path) => {
                        let digest = match self.blobs.read(&path) {
                            Ok(bytes) => content_digest(&bytes),
                            Err(_) => String::new(),
                        };
                        RawTarget::File { path, digest }
                    }
                };
                RawSoftRef {
                    matched: m.matched,
                    target,
                }
            })
            .collect()
    }

    /// Parse a direct-relation field value into record ids
    ///
    /// Single-target-table fields hold `1,2,3`; multi-table fields hold
    /// `table:uid` items.
    fn parse_direct(&self, value: &str, tables: &[String]) -> Vec<RecordId> {
        value
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .filter_map(|item| {
                if let Some(id) = RecordId::parse(item) {
                    return Some(id);
                }
                let uid = item.parse::<i64>().ok()?;
                let table = tables.first()?;
                Some(RecordId::new(table.clone(), uid))
            })
            .collect()
    }

    fn field_relation(&self, field_schema: &FieldSchema, value_text: &str, row: &RecordData) -> Option<RawRelation> {
        match &field_schema.relation {
            Some(RelationTarget::Direct { tables }) => Some(RawRelation {
                kind: Some(RawKind::Records(self.parse_direct(value_text, tables))),
                soft_refs: Vec::new(),
            }),
            Some(RelationTarget::File) => {
                let files = value_text
                    .split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(|p| self.raw_file(p))
                    .collect();
                Some(RawRelation {
                    kind: Some(RawKind::Files(files)),
                    soft_refs: Vec::new(),
                })
            }
            Some(RelationTarget::Structured(def)) => {
                let selector_value = def.selector.as_deref().and_then(|f| row.text(f));
                let variant = def.variant_for(selector_value)?;
                let children = self.structured_children(value_text, variant, row);
                Some(RawRelation {
                    kind: Some(RawKind::Structured(children)),
                    soft_refs: Vec::new(),
                })
            }
            None => {
                if field_schema.kind != FieldKind::Text {
                    return None;
                }
                let soft_refs = self.scan_text(value_text);
                if soft_refs.is_empty() {
                    return None;
                }
                Some(RawRelation {
                    kind: None,
                    soft_refs,
                })
            }
        }
    }

    /// Flatten a structured JSON value and resolve its declared paths
    fn structured_children(
        &self,
        value_text: &str,
        variant: &StructureVariant,
        row: &RecordData,
    ) -> BTreeMap<String, RawRelation> {
        let mut out = BTreeMap::new();
        let parsed: serde_json::Value = match serde_json::from_str(value_text) {
            Ok(v) => v,
            Err(_) => return out,
        };
        let mut leaves = BTreeMap::new();
        flatten_json("", &parsed, &mut leaves);

        for (path, leaf_value) in &leaves {
            let Some(path_schema) = variant.paths.get(path) else {
                continue;
            };
            if let Some(raw) = self.field_relation(path_schema, leaf_value, row) {
                out.insert(path.clone(), raw);
            }
        }
        out
    }
}

/// Collect string leaves of a JSON value by dot path
fn flatten_json(prefix: &str, value: &serde_json::Value, out: &mut BTreeMap<String, String>) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten_json(&path, child, out);
            }
        }
        serde_json::Value::String(s) => {
            out.insert(prefix.to_string(), s.clone());
        }
        serde_json::Value::Number(n) => {
            out.insert(prefix.to_string(), n.to_string());
        }
        _ => {}
    }
}

impl ReferenceIndex for SchemaReferenceIndex<'_> {
    fn relations_of(
        &self,
        table: &str,
        row: &RecordData,
    ) -> Result<BTreeMap<String, RawRelation>> {
        let mut out = BTreeMap::new();
        let Some(table_schema) = self.schema.table(table) else {
            return Ok(out);
        };

        for (field, value) in row.iter() {
            let Some(field_schema) = table_schema.field_schema(field) else {
                continue;
            };
            let value_text = value.to_field_string();
            if let Some(raw) = self.field_relation(field_schema, &value_text, row) {
                out.insert(field.clone(), raw);
            }
        }
        Ok(out)
    }
}
