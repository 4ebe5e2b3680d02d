//! Preview/diff renderer
//!
//! Pure read-side traversal of a Document: produces a flattened list of
//! display lines mirroring the export traversal order — the page tree
//! first with records grouped under their pages, then every remaining
//! record. Optionally renders a field-level difference view between an
//! archive record and its current target-side counterpart. Never mutates
//! the Document.

use sitepack_core::{RecordData, RecordId};
use sitepack_model::Document;
use std::collections::BTreeSet;

/// One rendered preview line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewLine {
    /// Tree indentation level
    pub indent: usize,
    /// Record the line is about
    pub id: RecordId,
    /// Record title from the header index
    pub title: String,
    /// True for page-tree lines
    pub is_page: bool,
    /// Closure discovery depth (0 for seeded records)
    pub relation_level: u32,
    /// Inline warnings (e.g. indexed but not present in the body)
    pub warnings: Vec<String>,
}

/// Render the archive preview
///
/// `page_table` names the page-tree table in the archive's schema.
pub fn render_preview(doc: &Document, page_table: &str) -> Vec<PreviewLine> {
    let mut lines = Vec::new();
    let mut listed: BTreeSet<RecordId> = BTreeSet::new();

    for node in &doc.header.page_tree {
        render_page(doc, page_table, node, 0, &mut lines, &mut listed);
    }

    // Remaining records, in discovery order, not yet listed under a page.
    for id in &doc.order {
        if listed.contains(id) {
            continue;
        }
        lines.push(make_line(doc, id, 0, id.table == page_table));
        listed.insert(id.clone());
    }

    // Indexed records missing from the body (pruned for preview).
    for (table, by_uid) in &doc.header.record_index {
        for uid in by_uid.keys() {
            let id = RecordId::new(table.clone(), *uid);
            if !listed.contains(&id) && !doc.contains(&id) {
                let mut line = make_line(doc, &id, 0, table == page_table);
                line.warnings
                    .push("indexed but not included in the archive body".to_string());
                lines.push(line);
            }
        }
    }

    lines
}

fn render_page(
    doc: &Document,
    page_table: &str,
    node: &sitepack_model::PageTreeNode,
    indent: usize,
    lines: &mut Vec<PreviewLine>,
    listed: &mut BTreeSet<RecordId>,
) {
    let page_id = RecordId::new(page_table, node.uid);
    lines.push(make_line(doc, &page_id, indent, true));
    listed.insert(page_id);

    // Records located at this page, per the header's pid index.
    if let Some(by_table) = doc.header.pid_index.get(&node.uid) {
        for (table, uids) in by_table {
            if table == page_table {
                continue;
            }
            for uid in uids {
                let id = RecordId::new(table.clone(), *uid);
                if listed.contains(&id) {
                    continue;
                }
                lines.push(make_line(doc, &id, indent + 1, false));
                listed.insert(id);
            }
        }
    }

    for child in &node.children {
        render_page(doc, page_table, child, indent + 1, lines, listed);
    }
}

fn make_line(doc: &Document, id: &RecordId, indent: usize, is_page: bool) -> PreviewLine {
    let summary = doc.header.summary(id);
    let mut warnings = Vec::new();
    if summary.is_none() {
        warnings.push("record is not indexed in the archive header".to_string());
    }
    PreviewLine {
        indent,
        id: id.clone(),
        title: summary.map(|s| s.title.clone()).unwrap_or_default(),
        is_page,
        relation_level: summary.map(|s| s.relation_level).unwrap_or(0),
        warnings,
    }
}

/// One field-level difference between archive and live record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDiff {
    /// Field name
    pub field: String,
    /// Value in the archive
    pub archive_value: String,
    /// Value on the target, empty if the field is absent
    pub live_value: String,
}

/// Field-level difference view between an archive record and its live
/// target-side counterpart
pub fn diff_record(archive: &RecordData, live: &RecordData) -> Vec<FieldDiff> {
    let mut fields: BTreeSet<&String> = archive.field_names().collect();
    fields.extend(live.field_names());

    fields
        .into_iter()
        .filter_map(|field| {
            let archive_value = archive
                .get(field)
                .map(|v| v.to_field_string())
                .unwrap_or_default();
            let live_value = live
                .get(field)
                .map(|v| v.to_field_string())
                .unwrap_or_default();
            if archive_value == live_value {
                None
            } else {
                Some(FieldDiff {
                    field: field.clone(),
                    archive_value,
                    live_value,
                })
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitepack_core::{RunReport, Value};
    use sitepack_model::{ArchiveMeta, PageTreeNode, RecordEntry, RecordSummary};

    fn doc_with_tree() -> Document {
        let mut doc = Document::new(ArchiveMeta::default());
        doc.header.page_tree = vec![PageTreeNode {
            uid: 1,
            children: vec![PageTreeNode::leaf(2)],
        }];

        let mut report = RunReport::new();
        for (uid, pid, title) in [(1, 0, "Home"), (2, 1, "About")] {
            let id = RecordId::new("pages", uid);
            doc.header.index_record(
                &id,
                RecordSummary {
                    title: title.to_string(),
                    pid,
                    ..Default::default()
                },
            );
            doc.add_record(
                id,
                RecordEntry {
                    data: RecordData::new().with("uid", uid).with("title", title),
                    ..Default::default()
                },
                &mut report,
            );
        }

        let content_id = RecordId::new("content", 10);
        doc.header.index_record(
            &content_id,
            RecordSummary {
                title: "Block".to_string(),
                pid: 1,
                relation_level: 0,
                ..Default::default()
            },
        );
        doc.add_record(
            content_id,
            RecordEntry {
                data: RecordData::new().with("uid", 10).with("pid", 1),
                ..Default::default()
            },
            &mut report,
        );

        // A closure-discovered record on no walked page.
        let far_id = RecordId::new("content", 11);
        doc.header.index_record(
            &far_id,
            RecordSummary {
                title: "Far".to_string(),
                pid: 99,
                relation_level: 1,
                ..Default::default()
            },
        );
        doc.add_record(
            far_id,
            RecordEntry {
                data: RecordData::new().with("uid", 11).with("pid", 99),
                ..Default::default()
            },
            &mut report,
        );

        doc
    }

    #[test]
    fn test_preview_order_mirrors_tree_then_rest() {
        let doc = doc_with_tree();
        let lines = render_preview(&doc, "pages");

        let ids: Vec<String> = lines.iter().map(|l| l.id.to_string()).collect();
        assert_eq!(ids, vec!["pages:1", "content:10", "pages:2", "content:11"]);
    }

    #[test]
    fn test_preview_indentation() {
        let doc = doc_with_tree();
        let lines = render_preview(&doc, "pages");

        assert_eq!(lines[0].indent, 0); // pages:1
        assert_eq!(lines[1].indent, 1); // content:10 under page 1
        assert_eq!(lines[2].indent, 1); // pages:2 child of page 1
        assert_eq!(lines[3].indent, 0); // content:11 outside the tree
        assert!(lines[0].is_page);
        assert!(!lines[1].is_page);
    }

    #[test]
    fn test_preview_titles_and_levels() {
        let doc = doc_with_tree();
        let lines = render_preview(&doc, "pages");
        assert_eq!(lines[0].title, "Home");
        assert_eq!(lines[3].relation_level, 1);
    }

    #[test]
    fn test_indexed_but_pruned_record_warns() {
        let mut doc = doc_with_tree();
        doc.header.index_record(
            &RecordId::new("content", 50),
            RecordSummary {
                title: "Pruned".to_string(),
                pid: 1,
                ..Default::default()
            },
        );

        let lines = render_preview(&doc, "pages");
        let pruned = lines
            .iter()
            .find(|l| l.id == RecordId::new("content", 50))
            .unwrap();
        assert!(!pruned.warnings.is_empty());
    }

    #[test]
    fn test_preview_does_not_mutate() {
        let doc = doc_with_tree();
        let before = format!("{doc:?}");
        let _ = render_preview(&doc, "pages");
        assert_eq!(before, format!("{doc:?}"));
    }

    #[test]
    fn test_diff_record() {
        let archive = RecordData::new()
            .with("title", "new title")
            .with("shared", "same")
            .with("gone", Value::Null);
        let live = RecordData::new()
            .with("title", "old title")
            .with("shared", "same")
            .with("extra", 5);

        let diffs = diff_record(&archive, &live);
        let fields: Vec<&str> = diffs.iter().map(|d| d.field.as_str()).collect();
        assert_eq!(fields, vec!["extra", "title"]);

        let title = diffs.iter().find(|d| d.field == "title").unwrap();
        assert_eq!(title.archive_value, "new title");
        assert_eq!(title.live_value, "old title");
    }

    #[test]
    fn test_diff_identical_records_empty() {
        let row = RecordData::new().with("a", 1);
        assert!(diff_record(&row, &row.clone()).is_empty());
    }
}
