//! Archive codec
//!
//! Two wire forms of the same logical Document:
//!
//! - **Segmented binary** (`.sitepack`): four consecutive checksummed
//!   frames — header, records, files, managed_files — each independently
//!   bincode-serialized and optionally zstd-compressed.
//! - **XML**: a fully self-describing tree serialization with a UTF-8
//!   prolog and a fixed plural→singular tag remap table.
//!
//! Both forms round-trip; the binary form is bit-exact, the XML form is
//! structurally equal. Corrupt input fails the whole load: no partial
//! Document is ever returned.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod binary;
pub mod frame;
pub mod xml;

pub use binary::{
    read_document, read_document_from_path, read_header, write_document, write_document_to_path,
};
pub use frame::{FrameReader, FrameWriter};
pub use xml::{read_document_xml, read_header_xml, write_document_xml};

/// Archive wire form
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// Segmented-binary `.sitepack`
    Binary,
    /// XML serialization
    Xml,
}

impl ArchiveFormat {
    /// Guess the format from a file name
    pub fn from_path(path: &std::path::Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("xml") => ArchiveFormat::Xml,
            _ => ArchiveFormat::Binary,
        }
    }

    /// Canonical file extension
    pub fn extension(&self) -> &'static str {
        match self {
            ArchiveFormat::Binary => sitepack_model::header::BINARY_EXTENSION,
            ArchiveFormat::Xml => sitepack_model::header::XML_EXTENSION,
        }
    }
}
