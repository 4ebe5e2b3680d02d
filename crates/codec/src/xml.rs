//! XML archive form
//!
//! A structurally-equivalent serialization of the Document: fixed root tag
//! `sitepack`, UTF-8 prolog, and deterministic child-tag naming so parsers
//! can rely on tag names rather than positions. Plural containers get their
//! child tags from the fixed remap table below — `records` holds `record`
//! elements, `files` holds `file` elements, and so on.
//!
//! Reading builds a small element tree first and converts it afterwards;
//! malformed input fails the whole load.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use sitepack_core::{Error, RecordData, RecordId, Result, SoftRefMode, Value};
use sitepack_model::{
    ArchiveMeta, Document, FileEntry, Header, PageTreeNode, RecordEntry, RecordSummary,
    RelationConfig, RelationEntry, RelationKind, SoftRef, Substitution,
};
use std::collections::BTreeMap;

/// Root tag of the XML form
pub const ROOT_TAG: &str = "sitepack";

/// Fixed container→child tag remap table
///
/// Containers not listed here use `item` children.
pub const TAG_REMAP: [(&str, &str); 8] = [
    ("records", "record"),
    ("files", "file"),
    ("managed_files", "file"),
    ("static_tables", "table"),
    ("excluded", "record"),
    ("softref_modes", "softref"),
    ("extension_dependencies", "extension"),
    ("page_tree", "node"),
];

/// Child tag for a container per the remap table
pub fn child_tag(container: &str) -> &'static str {
    TAG_REMAP
        .iter()
        .find(|(c, _)| *c == container)
        .map(|(_, child)| *child)
        .unwrap_or("item")
}

fn ser<T>(result: std::result::Result<T, impl std::fmt::Display>) -> Result<T> {
    result.map_err(|e| Error::serialization(format!("xml: {e}")))
}

// =============================================================================
// Writing
// =============================================================================

type XmlWriter = Writer<Vec<u8>>;

fn start_with<'a>(tag: &'a str, attrs: &[(&str, String)]) -> BytesStart<'a> {
    let mut start = BytesStart::new(tag);
    for (key, value) in attrs {
        start.push_attribute((*key, value.as_str()));
    }
    start
}

fn write_open(w: &mut XmlWriter, tag: &str, attrs: &[(&str, String)]) -> Result<()> {
    ser(w.write_event(Event::Start(start_with(tag, attrs))))
}

fn write_close(w: &mut XmlWriter, tag: &str) -> Result<()> {
    ser(w.write_event(Event::End(BytesEnd::new(tag))))
}

fn write_empty(w: &mut XmlWriter, tag: &str, attrs: &[(&str, String)]) -> Result<()> {
    ser(w.write_event(Event::Empty(start_with(tag, attrs))))
}

fn write_text_element(w: &mut XmlWriter, tag: &str, text: &str) -> Result<()> {
    write_open(w, tag, &[])?;
    ser(w.write_event(Event::Text(BytesText::new(text))))?;
    write_close(w, tag)
}

fn value_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Int(_) => "int",
        Value::Text(_) => "text",
    }
}

fn write_soft_ref(w: &mut XmlWriter, soft: &SoftRef) -> Result<()> {
    let mut attrs = vec![("token", soft.token_id.clone())];
    match &soft.substitution {
        Substitution::Record(id) => {
            attrs.push(("kind", "record".to_string()));
            attrs.push(("table", id.table.clone()));
            attrs.push(("uid", id.uid.to_string()));
        }
        Substitution::File(digest) => {
            attrs.push(("kind", "file".to_string()));
            attrs.push(("file", digest.clone()));
        }
        Substitution::Literal(value) => {
            attrs.push(("kind", "literal".to_string()));
            attrs.push(("value", value.clone()));
        }
    }
    write_open(w, "softref", &attrs)?;
    ser(w.write_event(Event::Text(BytesText::new(&soft.matched))))?;
    write_close(w, "softref")
}

fn relation_kind_name(entry: &RelationEntry) -> &'static str {
    match entry.kind {
        RelationKind::Direct { .. } => "direct",
        RelationKind::File { .. } => "file",
        RelationKind::Structured { .. } => "structured",
    }
}

fn write_relation_body(w: &mut XmlWriter, entry: &RelationEntry) -> Result<()> {
    match &entry.kind {
        RelationKind::Direct { items } => {
            for id in items {
                write_empty(
                    w,
                    "item",
                    &[("table", id.table.clone()), ("uid", id.uid.to_string())],
                )?;
            }
        }
        RelationKind::File { items } => {
            for digest in items {
                write_empty(w, "item", &[("file", digest.clone())])?;
            }
        }
        RelationKind::Structured {
            child_relations,
            child_soft_refs,
        } => {
            for (path, child) in child_relations {
                write_open(
                    w,
                    "child",
                    &[
                        ("path", path.clone()),
                        ("kind", relation_kind_name(child).to_string()),
                    ],
                )?;
                write_relation_body(w, child)?;
                write_close(w, "child")?;
            }
            for (path, refs) in child_soft_refs {
                write_open(w, "child_softrefs", &[("path", path.clone())])?;
                for soft in refs {
                    write_soft_ref(w, soft)?;
                }
                write_close(w, "child_softrefs")?;
            }
        }
    }
    for soft in &entry.soft_refs {
        write_soft_ref(w, soft)?;
    }
    Ok(())
}

fn write_record(w: &mut XmlWriter, id: &RecordId, entry: &RecordEntry) -> Result<()> {
    write_open(
        w,
        child_tag("records"),
        &[("table", id.table.clone()), ("uid", id.uid.to_string())],
    )?;

    write_open(w, "data", &[])?;
    for (name, value) in entry.data.iter() {
        let attrs = [
            ("name", name.clone()),
            ("type", value_type(value).to_string()),
        ];
        match value {
            Value::Null => write_empty(w, "field", &attrs)?,
            other => {
                write_open(w, "field", &attrs)?;
                ser(w.write_event(Event::Text(BytesText::new(&other.to_field_string()))))?;
                write_close(w, "field")?;
            }
        }
    }
    write_close(w, "data")?;

    write_open(w, "relations", &[])?;
    for (field, relation) in &entry.relations {
        write_open(
            w,
            "field",
            &[
                ("name", field.clone()),
                ("kind", relation_kind_name(relation).to_string()),
            ],
        )?;
        write_relation_body(w, relation)?;
        write_close(w, "field")?;
    }
    write_close(w, "relations")?;

    write_close(w, child_tag("records"))
}

fn write_file(w: &mut XmlWriter, container: &str, id: &str, entry: &FileEntry) -> Result<()> {
    write_open(w, child_tag(container), &[("id", id.to_string())])?;
    write_text_element(w, "filename", &entry.filename)?;
    write_text_element(w, "mtime", &entry.mtime.to_string())?;
    if let Some(content) = &entry.content {
        write_open(w, "content", &[("encoding", "base64".to_string())])?;
        ser(w.write_event(Event::Text(BytesText::new(&BASE64.encode(content)))))?;
        write_close(w, "content")?;
    }
    if let Some(external) = &entry.external_ref {
        write_text_element(w, "external_ref", external)?;
    }
    if let Some((record, field)) = &entry.record_ref {
        write_empty(
            w,
            "record_ref",
            &[
                ("table", record.table.clone()),
                ("uid", record.uid.to_string()),
                ("field", field.clone()),
            ],
        )?;
    }
    for resource in &entry.external_resources {
        write_text_element(w, "resource", resource)?;
    }
    write_close(w, child_tag(container))
}

fn write_tree_node(w: &mut XmlWriter, node: &PageTreeNode) -> Result<()> {
    let attrs = [("uid", node.uid.to_string())];
    if node.children.is_empty() {
        return write_empty(w, child_tag("page_tree"), &attrs);
    }
    write_open(w, child_tag("page_tree"), &attrs)?;
    for child in &node.children {
        write_tree_node(w, child)?;
    }
    write_close(w, child_tag("page_tree"))
}

fn write_header(w: &mut XmlWriter, header: &Header) -> Result<()> {
    write_open(w, "header", &[])?;

    write_open(w, "meta", &[])?;
    let meta = &header.meta;
    write_text_element(w, "title", &meta.title)?;
    write_text_element(w, "description", &meta.description)?;
    write_text_element(w, "notes", &meta.notes)?;
    write_text_element(w, "author", &meta.author)?;
    write_text_element(w, "generator_version", &meta.generator_version)?;
    write_text_element(w, "created_at", &meta.created_at)?;
    write_close(w, "meta")?;

    let config = &header.relation_config;
    write_open(w, "relation_config", &[])?;
    write_open(w, "static_tables", &[])?;
    for table in &config.static_tables {
        write_text_element(w, child_tag("static_tables"), table)?;
    }
    write_close(w, "static_tables")?;
    write_open(w, "excluded", &[])?;
    for id in &config.excluded {
        write_empty(
            w,
            child_tag("excluded"),
            &[("table", id.table.clone()), ("uid", id.uid.to_string())],
        )?;
    }
    write_close(w, "excluded")?;
    write_open(w, "softref_modes", &[])?;
    for (token, mode) in &config.softref_modes {
        let mode = match mode {
            SoftRefMode::Exclude => "exclude",
            SoftRefMode::Editable => "editable",
            SoftRefMode::Default => "default",
        };
        write_empty(
            w,
            child_tag("softref_modes"),
            &[("token", token.clone()), ("mode", mode.to_string())],
        )?;
    }
    write_close(w, "softref_modes")?;
    write_open(w, "extension_dependencies", &[])?;
    for ext in &config.extension_dependencies {
        write_text_element(w, child_tag("extension_dependencies"), ext)?;
    }
    write_close(w, "extension_dependencies")?;
    write_close(w, "relation_config")?;

    write_open(w, "page_tree", &[])?;
    for node in &header.page_tree {
        write_tree_node(w, node)?;
    }
    write_close(w, "page_tree")?;

    write_open(w, "record_index", &[])?;
    for (table, by_uid) in &header.record_index {
        write_open(w, "table", &[("name", table.clone())])?;
        for (uid, summary) in by_uid {
            write_open(
                w,
                "record",
                &[
                    ("uid", uid.to_string()),
                    ("pid", summary.pid.to_string()),
                    ("title", summary.title.clone()),
                    ("relation_fields", summary.relation_fields.to_string()),
                    ("soft_refs", summary.soft_refs.to_string()),
                    ("relation_level", summary.relation_level.to_string()),
                ],
            )?;
            for file_ref in &summary.file_refs {
                write_text_element(w, "file_ref", file_ref)?;
            }
            write_close(w, "record")?;
        }
        write_close(w, "table")?;
    }
    write_close(w, "record_index")?;

    write_open(w, "pid_index", &[])?;
    for (pid, by_table) in &header.pid_index {
        write_open(w, "pid", &[("id", pid.to_string())])?;
        for (table, uids) in by_table {
            write_open(w, "table", &[("name", table.clone())])?;
            for uid in uids {
                write_text_element(w, "uid", &uid.to_string())?;
            }
            write_close(w, "table")?;
        }
        write_close(w, "pid")?;
    }
    write_close(w, "pid_index")?;

    write_close(w, "header")
}

/// Serialize a Document into XML bytes
///
/// Output is unindented: element text must round-trip exactly, and
/// indentation whitespace inside mixed content would not.
pub fn write_document_xml(doc: &Document) -> Result<Vec<u8>> {
    let mut w = Writer::new(Vec::new());
    ser(w.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None))))?;

    write_open(
        &mut w,
        ROOT_TAG,
        &[("format_version", doc.header.format_version.to_string())],
    )?;

    write_header(&mut w, &doc.header)?;

    // Records are written in insertion (discovery) order; the reader
    // reconstructs the order list from element sequence.
    write_open(&mut w, "records", &[])?;
    for id in &doc.order {
        if let Some(entry) = doc.records.get(id) {
            write_record(&mut w, id, entry)?;
        }
    }
    write_close(&mut w, "records")?;

    write_open(&mut w, "files", &[])?;
    for (id, entry) in &doc.files {
        write_file(&mut w, "files", id, entry)?;
    }
    write_close(&mut w, "files")?;

    write_open(&mut w, "managed_files", &[])?;
    for (id, entry) in &doc.managed_files {
        write_file(&mut w, "managed_files", id, entry)?;
    }
    write_close(&mut w, "managed_files")?;

    write_close(&mut w, ROOT_TAG)?;
    Ok(w.into_inner())
}

// =============================================================================
// Reading
// =============================================================================

/// Parsed XML element
#[derive(Debug, Default)]
struct Elem {
    name: String,
    attrs: BTreeMap<String, String>,
    text: String,
    children: Vec<Elem>,
}

impl Elem {
    fn attr(&self, name: &str) -> Result<&str> {
        self.attrs
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| {
                Error::invalid_archive(format!("<{}> missing attribute '{name}'", self.name))
            })
    }

    fn attr_i64(&self, name: &str) -> Result<i64> {
        self.attr(name)?
            .parse()
            .map_err(|_| Error::invalid_archive(format!("<{}> bad integer '{name}'", self.name)))
    }

    fn child(&self, name: &str) -> Option<&Elem> {
        self.children.iter().find(|c| c.name == name)
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Elem> {
        self.children.iter().filter(move |c| c.name == name)
    }

    fn child_text(&self, name: &str) -> String {
        self.child(name).map(|c| c.text.clone()).unwrap_or_default()
    }
}

fn parse_tree(input: &str) -> Result<Elem> {
    // Leaf text must round-trip exactly, so no whitespace trimming here;
    // indentation whitespace only ever lands on container elements, whose
    // text is never read.
    let mut reader = Reader::from_str(input);

    let mut stack: Vec<Elem> = Vec::new();
    let mut root: Option<Elem> = None;

    let read_elem = |start: &BytesStart| -> Result<Elem> {
        let mut elem = Elem {
            name: String::from_utf8_lossy(start.name().as_ref()).to_string(),
            ..Default::default()
        };
        for attr in start.attributes() {
            let attr = ser(attr)?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
            let value = ser(attr.unescape_value())?.to_string();
            elem.attrs.insert(key, value);
        }
        Ok(elem)
    };

    loop {
        match ser(reader.read_event())? {
            Event::Start(start) => stack.push(read_elem(&start)?),
            Event::Empty(start) => {
                let elem = read_elem(&start)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(elem),
                    None => root = Some(elem),
                }
            }
            Event::Text(text) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&ser(text.unescape())?);
                }
            }
            Event::End(_) => {
                let done = stack
                    .pop()
                    .ok_or_else(|| Error::invalid_archive("xml: unbalanced end tag"))?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(done),
                    None => root = Some(done),
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    root.ok_or_else(|| Error::invalid_archive("xml: no root element"))
}

fn parse_soft_ref(elem: &Elem) -> Result<SoftRef> {
    let substitution = match elem.attr("kind")? {
        "record" => Substitution::Record(RecordId::new(
            elem.attr("table")?,
            elem.attr_i64("uid")?,
        )),
        "file" => Substitution::File(elem.attr("file")?.to_string()),
        "literal" => Substitution::Literal(elem.attr("value")?.to_string()),
        other => {
            return Err(Error::invalid_archive(format!(
                "unknown softref kind '{other}'"
            )))
        }
    };
    Ok(SoftRef {
        token_id: elem.attr("token")?.to_string(),
        matched: elem.text.clone(),
        substitution,
    })
}

fn parse_relation_entry(elem: &Elem) -> Result<RelationEntry> {
    let kind = match elem.attr("kind")? {
        "direct" => RelationKind::Direct {
            items: elem
                .children_named("item")
                .map(|item| Ok(RecordId::new(item.attr("table")?, item.attr_i64("uid")?)))
                .collect::<Result<Vec<_>>>()?,
        },
        "file" => RelationKind::File {
            items: elem
                .children_named("item")
                .map(|item| Ok(item.attr("file")?.to_string()))
                .collect::<Result<Vec<_>>>()?,
        },
        "structured" => {
            let mut child_relations = BTreeMap::new();
            for child in elem.children_named("child") {
                child_relations.insert(child.attr("path")?.to_string(), parse_relation_entry(child)?);
            }
            let mut child_soft_refs = BTreeMap::new();
            for child in elem.children_named("child_softrefs") {
                let refs = child
                    .children_named("softref")
                    .map(parse_soft_ref)
                    .collect::<Result<Vec<_>>>()?;
                child_soft_refs.insert(child.attr("path")?.to_string(), refs);
            }
            RelationKind::Structured {
                child_relations,
                child_soft_refs,
            }
        }
        other => {
            return Err(Error::invalid_archive(format!(
                "unknown relation kind '{other}'"
            )))
        }
    };

    let soft_refs = elem
        .children_named("softref")
        .map(parse_soft_ref)
        .collect::<Result<Vec<_>>>()?;

    Ok(RelationEntry { kind, soft_refs })
}

fn parse_record(elem: &Elem) -> Result<(RecordId, RecordEntry)> {
    let id = RecordId::new(elem.attr("table")?, elem.attr_i64("uid")?);

    let mut data = RecordData::new();
    if let Some(data_elem) = elem.child("data") {
        for field in data_elem.children_named("field") {
            let name = field.attr("name")?.to_string();
            let value = match field.attr("type")? {
                "null" => Value::Null,
                "bool" => Value::Bool(field.text.trim() == "1"),
                "int" => Value::Int(field.text.trim().parse().map_err(|_| {
                    Error::invalid_archive(format!("bad int field '{name}'"))
                })?),
                "text" => Value::Text(field.text.clone()),
                other => {
                    return Err(Error::invalid_archive(format!(
                        "unknown field type '{other}'"
                    )))
                }
            };
            data.set(name, value);
        }
    }

    let mut relations = BTreeMap::new();
    if let Some(relations_elem) = elem.child("relations") {
        for field in relations_elem.children_named("field") {
            relations.insert(field.attr("name")?.to_string(), parse_relation_entry(field)?);
        }
    }

    Ok((
        id,
        RecordEntry {
            data,
            relations,
            has_been_mapped: false,
        },
    ))
}

fn parse_file(elem: &Elem) -> Result<(String, FileEntry)> {
    let id = elem.attr("id")?.to_string();
    let content = match elem.child("content") {
        Some(content) => Some(
            BASE64
                .decode(content.text.trim())
                .map_err(|e| Error::invalid_archive(format!("bad base64 content: {e}")))?,
        ),
        None => None,
    };
    let record_ref = match elem.child("record_ref") {
        Some(r) => Some((
            RecordId::new(r.attr("table")?, r.attr_i64("uid")?),
            r.attr("field")?.to_string(),
        )),
        None => None,
    };
    Ok((
        id.clone(),
        FileEntry {
            filename: elem.child_text("filename"),
            mtime: elem.child_text("mtime").trim().parse().unwrap_or(0),
            content,
            external_ref: elem.child("external_ref").map(|c| c.text.clone()),
            content_hash: id,
            record_ref,
            external_resources: elem
                .children_named("resource")
                .map(|r| r.text.clone())
                .collect(),
        },
    ))
}

fn parse_tree_node(elem: &Elem) -> Result<PageTreeNode> {
    Ok(PageTreeNode {
        uid: elem.attr_i64("uid")?,
        children: elem
            .children_named(child_tag("page_tree"))
            .map(parse_tree_node)
            .collect::<Result<Vec<_>>>()?,
    })
}

fn parse_header(elem: &Elem) -> Result<Header> {
    let meta_elem = elem
        .child("meta")
        .ok_or_else(|| Error::invalid_archive("header missing <meta>"))?;
    let meta = ArchiveMeta {
        title: meta_elem.child_text("title"),
        description: meta_elem.child_text("description"),
        notes: meta_elem.child_text("notes"),
        author: meta_elem.child_text("author"),
        generator_version: meta_elem.child_text("generator_version"),
        created_at: meta_elem.child_text("created_at"),
    };

    let mut config = RelationConfig::default();
    if let Some(config_elem) = elem.child("relation_config") {
        if let Some(tables) = config_elem.child("static_tables") {
            for table in tables.children_named(child_tag("static_tables")) {
                config.static_tables.insert(table.text.clone());
            }
        }
        if let Some(excluded) = config_elem.child("excluded") {
            for record in excluded.children_named(child_tag("excluded")) {
                config
                    .excluded
                    .insert(RecordId::new(record.attr("table")?, record.attr_i64("uid")?));
            }
        }
        if let Some(modes) = config_elem.child("softref_modes") {
            for soft in modes.children_named(child_tag("softref_modes")) {
                let mode = match soft.attr("mode")? {
                    "exclude" => SoftRefMode::Exclude,
                    "editable" => SoftRefMode::Editable,
                    "default" => SoftRefMode::Default,
                    other => {
                        return Err(Error::invalid_archive(format!(
                            "unknown softref mode '{other}'"
                        )))
                    }
                };
                config.softref_modes.insert(soft.attr("token")?.to_string(), mode);
            }
        }
        if let Some(deps) = config_elem.child("extension_dependencies") {
            for ext in deps.children_named(child_tag("extension_dependencies")) {
                config.extension_dependencies.push(ext.text.clone());
            }
        }
    }

    let mut page_tree = Vec::new();
    if let Some(tree_elem) = elem.child("page_tree") {
        for node in tree_elem.children_named(child_tag("page_tree")) {
            page_tree.push(parse_tree_node(node)?);
        }
    }

    let mut record_index = BTreeMap::new();
    if let Some(index_elem) = elem.child("record_index") {
        for table in index_elem.children_named("table") {
            let mut by_uid = BTreeMap::new();
            for record in table.children_named("record") {
                by_uid.insert(
                    record.attr_i64("uid")?,
                    RecordSummary {
                        title: record.attr("title")?.to_string(),
                        pid: record.attr_i64("pid")?,
                        relation_fields: record.attr_i64("relation_fields")? as u32,
                        file_refs: record
                            .children_named("file_ref")
                            .map(|f| f.text.clone())
                            .collect(),
                        soft_refs: record.attr_i64("soft_refs")? as u32,
                        relation_level: record.attr_i64("relation_level")? as u32,
                    },
                );
            }
            record_index.insert(table.attr("name")?.to_string(), by_uid);
        }
    }

    let mut pid_index = BTreeMap::new();
    if let Some(index_elem) = elem.child("pid_index") {
        for pid in index_elem.children_named("pid") {
            let mut by_table = BTreeMap::new();
            for table in pid.children_named("table") {
                let uids = table
                    .children_named("uid")
                    .map(|u| {
                        u.text.trim().parse::<i64>().map_err(|_| {
                            Error::invalid_archive("pid_index: bad uid".to_string())
                        })
                    })
                    .collect::<Result<std::collections::BTreeSet<i64>>>()?;
                by_table.insert(table.attr("name")?.to_string(), uids);
            }
            pid_index.insert(pid.attr_i64("id")?, by_table);
        }
    }

    Ok(Header {
        format_version: 0, // set by the caller from the root attribute
        meta,
        relation_config: config,
        page_tree,
        record_index,
        pid_index,
    })
}

/// Load only the header from XML bytes (lightweight preview)
pub fn read_header_xml(bytes: &[u8]) -> Result<Header> {
    let input = std::str::from_utf8(bytes)
        .map_err(|_| Error::invalid_archive("xml: input is not UTF-8"))?;
    let root = parse_tree(input)?;
    if root.name != ROOT_TAG {
        return Err(Error::invalid_archive(format!(
            "unexpected root tag <{}>",
            root.name
        )));
    }
    let header_elem = root
        .child("header")
        .ok_or_else(|| Error::invalid_archive("missing <header>"))?;
    let mut header = parse_header(header_elem)?;
    header.format_version = root.attr_i64("format_version")? as u32;
    Ok(header)
}

/// Deserialize a Document from XML bytes
pub fn read_document_xml(bytes: &[u8]) -> Result<Document> {
    let input = std::str::from_utf8(bytes)
        .map_err(|_| Error::invalid_archive("xml: input is not UTF-8"))?;
    let root = parse_tree(input)?;
    if root.name != ROOT_TAG {
        return Err(Error::invalid_archive(format!(
            "unexpected root tag <{}>",
            root.name
        )));
    }
    let format_version = root.attr_i64("format_version")? as u32;

    let header_elem = root
        .child("header")
        .ok_or_else(|| Error::invalid_archive("missing <header>"))?;
    let mut header = parse_header(header_elem)?;
    header.format_version = format_version;

    let mut order = Vec::new();
    let mut records = BTreeMap::new();
    if let Some(records_elem) = root.child("records") {
        for record in records_elem.children_named(child_tag("records")) {
            let (id, entry) = parse_record(record)?;
            order.push(id.clone());
            records.insert(id, entry);
        }
    }

    let mut files = BTreeMap::new();
    if let Some(files_elem) = root.child("files") {
        for file in files_elem.children_named(child_tag("files")) {
            let (id, entry) = parse_file(file)?;
            files.insert(id, entry);
        }
    }

    let mut managed_files = BTreeMap::new();
    if let Some(managed_elem) = root.child("managed_files") {
        for file in managed_elem.children_named(child_tag("managed_files")) {
            let (id, entry) = parse_file(file)?;
            managed_files.insert(id, entry);
        }
    }

    Ok(Document {
        header,
        order,
        records,
        files,
        managed_files,
    })
}
