//! Segmented-binary archive form
//!
//! A `.sitepack` archive is four consecutive frames in fixed order:
//! header, records, files, managed_files. Each payload is the bincode
//! serialization of the corresponding Document part. The header segment is
//! self-sufficient, so previews can load it without touching the three
//! (potentially large) body segments.
//!
//! Writing to a path is atomic: the archive is assembled into a temp file
//! and renamed into place, so a failed export never leaves a half-written
//! archive behind.

use sitepack_core::{Error, RecordId, Result};
use sitepack_model::{Document, FileEntry, Header, RecordEntry};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::frame::{FrameReader, FrameWriter};

/// Segment names in wire order, used in error messages
const SEGMENTS: [&str; 4] = ["header", "records", "files", "managed_files"];

fn serialize<T: serde::Serialize>(segment: &str, value: &T) -> Result<Vec<u8>> {
    bincode::serialize(value)
        .map_err(|e| Error::serialization(format!("segment '{segment}': {e}")))
}

fn deserialize<T: serde::de::DeserializeOwned>(segment: &str, bytes: &[u8]) -> Result<T> {
    bincode::deserialize(bytes)
        .map_err(|e| Error::serialization(format!("segment '{segment}': {e}")))
}

/// Serialize a Document into segmented-binary bytes
pub fn write_document(doc: &Document, compress: bool) -> Result<Vec<u8>> {
    let mut writer = FrameWriter::new();
    writer.write_segment(&serialize(SEGMENTS[0], &doc.header)?, compress)?;
    writer.write_segment(
        &serialize(SEGMENTS[1], &(&doc.order, &doc.records))?,
        compress,
    )?;
    writer.write_segment(&serialize(SEGMENTS[2], &doc.files)?, compress)?;
    writer.write_segment(&serialize(SEGMENTS[3], &doc.managed_files)?, compress)?;
    Ok(writer.into_bytes())
}

/// Write a Document to a path, atomically
pub fn write_document_to_path(doc: &Document, path: &Path, compress: bool) -> Result<()> {
    let bytes = write_document(doc, compress)?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    let temp = path.with_extension("tmp");
    match fs::write(&temp, &bytes).and_then(|_| fs::rename(&temp, path)) {
        Ok(()) => Ok(()),
        Err(e) => {
            let _ = fs::remove_file(&temp);
            Err(e.into())
        }
    }
}

/// Deserialize a complete Document, verifying every segment
///
/// Any frame violation or checksum mismatch fails the whole load; no
/// partial Document is returned.
pub fn read_document(bytes: &[u8]) -> Result<Document> {
    let mut reader = FrameReader::new(bytes);
    let header: Header = deserialize(SEGMENTS[0], &reader.read_segment(SEGMENTS[0])?)?;
    let (order, records): (Vec<RecordId>, BTreeMap<RecordId, RecordEntry>) =
        deserialize(SEGMENTS[1], &reader.read_segment(SEGMENTS[1])?)?;
    let files: BTreeMap<String, FileEntry> =
        deserialize(SEGMENTS[2], &reader.read_segment(SEGMENTS[2])?)?;
    let managed_files: BTreeMap<String, FileEntry> =
        deserialize(SEGMENTS[3], &reader.read_segment(SEGMENTS[3])?)?;
    if !reader.is_at_end() {
        return Err(Error::invalid_archive("trailing bytes after last segment"));
    }
    Ok(Document {
        header,
        order,
        records,
        files,
        managed_files,
    })
}

/// Read a Document from a path
pub fn read_document_from_path(path: &Path) -> Result<Document> {
    read_document(&fs::read(path)?)
}

/// Load only the header segment (lightweight preview)
pub fn read_header(bytes: &[u8]) -> Result<Header> {
    let mut reader = FrameReader::new(bytes);
    deserialize(SEGMENTS[0], &reader.read_segment(SEGMENTS[0])?)
}
