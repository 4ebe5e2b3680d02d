//! Table and field schema
//!
//! The schema drives everything the engines do with a record: which fields
//! are relations (and of which kind), which table is the page tree, which
//! tables play the file-storage / file-record / file-reference roles, and
//! which constraints the target store enforces per table (static, read-only,
//! admin-only, root-level placement).
//!
//! The schema is external reference data: the archiver consults it, the
//! record store owns it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Well-known field names for the role tables
///
/// These names are part of the archive contract: import pre-passes match
/// storages and file records by these fields.
pub mod fields {
    /// Storage driver kind (file_storage)
    pub const DRIVER: &str = "driver";
    /// Storage base path configuration (file_storage)
    pub const BASE_PATH: &str = "base_path";
    /// Storage writability flag (file_storage)
    pub const WRITABLE: &str = "writable";
    /// Storage online-state flag (file_storage)
    pub const ONLINE: &str = "online";
    /// Owning storage uid (file_record)
    pub const STORAGE: &str = "storage";
    /// Path of the asset inside its storage (file_record)
    pub const IDENTIFIER: &str = "identifier";
    /// Display name / filename (file_record)
    pub const NAME: &str = "name";
    /// Stored content digest (file_record)
    pub const CONTENT_HASH: &str = "content_hash";
    /// Size in bytes (file_record)
    pub const SIZE: &str = "size";
    /// Pointer at the file_record row (file_reference)
    pub const FILE: &str = "file";
}

/// Placement constraint for records of a table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RootLevel {
    /// Records may live on any page
    Anywhere,
    /// Records live only at the tree root (pid 0)
    RootOnly,
    /// Records live only on pages, never at the root
    PagesOnly,
}

/// Functional role a table plays for the archiver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableRole {
    /// Ordinary content records
    Content,
    /// The page-tree table
    Page,
    /// Storage/volume definitions
    FileStorage,
    /// First-class binary-asset metadata rows
    FileRecord,
    /// Rows pointing at a FileRecord row
    FileReference,
}

/// Import behavior for one soft-reference token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SoftRefMode {
    /// Keep the literal original value
    Exclude,
    /// Operator supplies the substituted value
    Editable,
    /// Remap through the import mapping (records) or materialize (files)
    Default,
}

/// Relation configuration of one field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationTarget {
    /// Hard reference list into the named tables
    Direct {
        /// Allowed target tables for items of this field
        tables: Vec<String>,
    },
    /// Reference list into the Document's file blobs
    File,
    /// Self-describing structured value with an internal schema
    Structured(StructuredDef),
}

/// Internal schema of a structured field value
///
/// Structure selection can depend on another field of the same record: the
/// `selector` field's value picks the variant. With no selector, the
/// `"default"` variant applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredDef {
    /// Field whose value selects the structure variant
    pub selector: Option<String>,
    /// Variant name → per-path field schemas
    pub variants: BTreeMap<String, StructureVariant>,
}

/// One structure variant: path → field schema
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureVariant {
    /// Leaf path (dot separated) → schema of the value at that path
    pub paths: BTreeMap<String, FieldSchema>,
}

impl StructuredDef {
    /// Resolve the variant for a selector value (falls back to `"default"`)
    pub fn variant_for(&self, selector_value: Option<&str>) -> Option<&StructureVariant> {
        selector_value
            .and_then(|v| self.variants.get(v))
            .or_else(|| self.variants.get("default"))
    }
}

/// Kind of plain (non-relation) field content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FieldKind {
    /// Opaque scalar
    #[default]
    Plain,
    /// Free text that is scanned for embedded soft references
    Text,
}

/// Schema of one field
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    /// Relation configuration; None means "no relation config", which is
    /// distinct from a configured relation that resolves to nothing
    pub relation: Option<RelationTarget>,
    /// Content kind for non-relation purposes (soft-ref scanning)
    pub kind: FieldKind,
}

impl FieldSchema {
    /// Plain field with no relation config
    pub fn plain() -> Self {
        Self::default()
    }

    /// Text field scanned for soft references
    pub fn text() -> Self {
        Self {
            relation: None,
            kind: FieldKind::Text,
        }
    }

    /// Direct relation into the given tables
    pub fn direct(tables: &[&str]) -> Self {
        Self {
            relation: Some(RelationTarget::Direct {
                tables: tables.iter().map(|t| t.to_string()).collect(),
            }),
            kind: FieldKind::Plain,
        }
    }

    /// File relation
    pub fn file() -> Self {
        Self {
            relation: Some(RelationTarget::File),
            kind: FieldKind::Plain,
        }
    }

    /// Structured relation
    pub fn structured(def: StructuredDef) -> Self {
        Self {
            relation: Some(RelationTarget::Structured(def)),
            kind: FieldKind::Plain,
        }
    }
}

/// Schema of one table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name
    pub name: String,
    /// Field holding the human-readable record title
    pub label_field: String,
    /// Field flagging a record disabled, if the type has an enablement rule
    pub disabled_field: Option<String>,
    /// Field carrying manual sibling ordering, if any
    pub sort_field: Option<String>,
    /// Static reference data: never exported/imported, only referenced
    pub is_static: bool,
    /// Records cannot be written on the target
    pub read_only: bool,
    /// Records writable only with elevated permission
    pub admin_only: bool,
    /// Placement constraint
    pub root_level: RootLevel,
    /// Functional role
    pub role: TableRole,
    /// Per-field schemas; unlisted fields are plain
    pub fields: BTreeMap<String, FieldSchema>,
}

impl TableSchema {
    /// Create a content table schema with defaults
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label_field: "title".to_string(),
            disabled_field: None,
            sort_field: None,
            is_static: false,
            read_only: false,
            admin_only: false,
            root_level: RootLevel::PagesOnly,
            role: TableRole::Content,
            fields: BTreeMap::new(),
        }
    }

    /// Builder: set the label field
    pub fn label(mut self, field: impl Into<String>) -> Self {
        self.label_field = field.into();
        self
    }

    /// Builder: set the disabled-flag field
    pub fn disabled_by(mut self, field: impl Into<String>) -> Self {
        self.disabled_field = Some(field.into());
        self
    }

    /// Builder: set the sort field
    pub fn sorted_by(mut self, field: impl Into<String>) -> Self {
        self.sort_field = Some(field.into());
        self
    }

    /// Builder: mark static
    pub fn static_table(mut self) -> Self {
        self.is_static = true;
        self
    }

    /// Builder: mark read-only
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Builder: mark admin-only
    pub fn admin_only(mut self) -> Self {
        self.admin_only = true;
        self
    }

    /// Builder: set placement constraint
    pub fn root_level(mut self, level: RootLevel) -> Self {
        self.root_level = level;
        self
    }

    /// Builder: set role
    pub fn role(mut self, role: TableRole) -> Self {
        self.role = role;
        self
    }

    /// Builder: add a field schema
    pub fn field(mut self, name: impl Into<String>, schema: FieldSchema) -> Self {
        self.fields.insert(name.into(), schema);
        self
    }

    /// Field schema lookup
    pub fn field_schema(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.get(name)
    }

    /// True if the row is flagged disabled by this table's enablement rule
    pub fn is_disabled(&self, row: &crate::value::RecordData) -> bool {
        match &self.disabled_field {
            Some(f) => row.int(f).unwrap_or(0) != 0,
            None => false,
        }
    }
}

/// Complete schema: all tables plus the page-table designation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    page_table: String,
    tables: BTreeMap<String, TableSchema>,
}

impl Schema {
    /// Create a schema with the given page table already registered
    pub fn new(page_table: TableSchema) -> Self {
        let name = page_table.name.clone();
        let mut tables = BTreeMap::new();
        tables.insert(name.clone(), page_table.role(TableRole::Page));
        Self {
            page_table: name,
            tables,
        }
    }

    /// Register a table
    pub fn add(mut self, table: TableSchema) -> Self {
        self.tables.insert(table.name.clone(), table);
        self
    }

    /// Name of the page-tree table
    pub fn page_table(&self) -> &str {
        &self.page_table
    }

    /// Table schema lookup
    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.get(name)
    }

    /// All table names in deterministic order
    pub fn table_names(&self) -> impl Iterator<Item = &String> {
        self.tables.keys()
    }

    /// True if the table exists and is static reference data
    pub fn is_static(&self, table: &str) -> bool {
        self.tables.get(table).map(|t| t.is_static).unwrap_or(false)
    }

    /// First table registered with the given role, if any
    pub fn table_with_role(&self, role: TableRole) -> Option<&TableSchema> {
        self.tables.values().find(|t| t.role == role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::RecordData;

    fn sample() -> Schema {
        Schema::new(
            TableSchema::new("pages")
                .disabled_by("hidden")
                .sorted_by("sorting")
                .root_level(RootLevel::Anywhere),
        )
        .add(
            TableSchema::new("content")
                .label("header")
                .field("records", FieldSchema::direct(&["content", "pages"]))
                .field("assets", FieldSchema::file()),
        )
        .add(TableSchema::new("languages").static_table())
    }

    #[test]
    fn test_page_table_gets_page_role() {
        let s = sample();
        assert_eq!(s.page_table(), "pages");
        assert_eq!(s.table("pages").unwrap().role, TableRole::Page);
    }

    #[test]
    fn test_static_lookup() {
        let s = sample();
        assert!(s.is_static("languages"));
        assert!(!s.is_static("content"));
        assert!(!s.is_static("unknown"));
    }

    #[test]
    fn test_field_relation_config() {
        let s = sample();
        let t = s.table("content").unwrap();
        assert!(matches!(
            t.field_schema("records").unwrap().relation,
            Some(RelationTarget::Direct { .. })
        ));
        assert!(matches!(
            t.field_schema("assets").unwrap().relation,
            Some(RelationTarget::File)
        ));
        assert!(t.field_schema("header").is_none());
    }

    #[test]
    fn test_disabled_rule() {
        let s = sample();
        let pages = s.table("pages").unwrap();
        let hidden = RecordData::new().with("hidden", 1);
        let visible = RecordData::new().with("hidden", 0);
        let unset = RecordData::new();
        assert!(pages.is_disabled(&hidden));
        assert!(!pages.is_disabled(&visible));
        assert!(!pages.is_disabled(&unset));

        // content has no enablement rule at all
        let content = s.table("content").unwrap();
        assert!(!content.is_disabled(&hidden));
    }

    #[test]
    fn test_structured_variant_selection() {
        let def = StructuredDef {
            selector: Some("layout".to_string()),
            variants: BTreeMap::from([
                (
                    "default".to_string(),
                    StructureVariant {
                        paths: BTreeMap::from([(
                            "link".to_string(),
                            FieldSchema::direct(&["pages"]),
                        )]),
                    },
                ),
                (
                    "gallery".to_string(),
                    StructureVariant {
                        paths: BTreeMap::from([("images".to_string(), FieldSchema::file())]),
                    },
                ),
            ]),
        };

        assert!(def
            .variant_for(Some("gallery"))
            .unwrap()
            .paths
            .contains_key("images"));
        // Unknown selector falls back to default
        assert!(def
            .variant_for(Some("unknown"))
            .unwrap()
            .paths
            .contains_key("link"));
        assert!(def.variant_for(None).unwrap().paths.contains_key("link"));
    }
}
