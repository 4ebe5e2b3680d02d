//! Built-in default schema
//!
//! A compact CMS schema covering every table role the archiver knows:
//! the page tree, ordinary content with all three relation kinds plus
//! soft-reference text, a plain relation-target table (categories), static
//! reference data (languages), and the file triple (storages, file records,
//! file references).

use sitepack_core::{
    FieldSchema, RootLevel, Schema, StructureVariant, StructuredDef, TableRole, TableSchema,
};
use std::collections::BTreeMap;

/// Build the built-in default schema
pub fn builtin_schema() -> Schema {
    let content_settings = StructuredDef {
        selector: Some("layout".to_string()),
        variants: BTreeMap::from([
            (
                "default".to_string(),
                StructureVariant {
                    paths: BTreeMap::from([
                        ("link".to_string(), FieldSchema::direct(&["pages"])),
                        ("caption".to_string(), FieldSchema::text()),
                    ]),
                },
            ),
            (
                "gallery".to_string(),
                StructureVariant {
                    paths: BTreeMap::from([
                        ("images".to_string(), FieldSchema::file()),
                        ("caption".to_string(), FieldSchema::text()),
                    ]),
                },
            ),
        ]),
    };

    Schema::new(
        TableSchema::new("pages")
            .disabled_by("hidden")
            .sorted_by("sorting")
            .root_level(RootLevel::Anywhere)
            .field("media", FieldSchema::file()),
    )
    .add(
        TableSchema::new("content")
            .label("header")
            .disabled_by("hidden")
            .sorted_by("sorting")
            .field("bodytext", FieldSchema::text())
            .field("related_page", FieldSchema::direct(&["pages"]))
            .field("records", FieldSchema::direct(&["content", "pages"]))
            .field("categories", FieldSchema::direct(&["categories"]))
            .field("asset", FieldSchema::direct(&["files"]))
            .field("assets", FieldSchema::file())
            .field("file_refs", FieldSchema::direct(&["file_references"]))
            .field("settings", FieldSchema::structured(content_settings)),
    )
    .add(
        TableSchema::new("categories")
            .root_level(RootLevel::Anywhere)
            .field("parent", FieldSchema::direct(&["categories"])),
    )
    .add(
        TableSchema::new("languages")
            .static_table()
            .root_level(RootLevel::RootOnly),
    )
    .add(
        TableSchema::new("file_storages")
            .label("name")
            .root_level(RootLevel::RootOnly)
            .role(TableRole::FileStorage),
    )
    .add(
        TableSchema::new("files")
            .label("name")
            .root_level(RootLevel::RootOnly)
            .role(TableRole::FileRecord)
            .field("storage", FieldSchema::direct(&["file_storages"])),
    )
    .add(
        TableSchema::new("file_references")
            .label("name")
            .role(TableRole::FileReference)
            .field("file", FieldSchema::direct(&["files"])),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_roles() {
        let schema = builtin_schema();
        assert_eq!(schema.page_table(), "pages");
        assert_eq!(
            schema.table_with_role(TableRole::FileStorage).unwrap().name,
            "file_storages"
        );
        assert_eq!(
            schema.table_with_role(TableRole::FileRecord).unwrap().name,
            "files"
        );
        assert_eq!(
            schema
                .table_with_role(TableRole::FileReference)
                .unwrap()
                .name,
            "file_references"
        );
    }

    #[test]
    fn test_builtin_static_tables() {
        let schema = builtin_schema();
        assert!(schema.is_static("languages"));
        assert!(!schema.is_static("categories"));
    }

    #[test]
    fn test_file_reference_pointer_field() {
        let schema = builtin_schema();
        let t = schema.table("file_references").unwrap();
        assert!(t.field_schema(sitepack_core::schema::fields::FILE).is_some());
    }
}
