//! Error types for sitepack
//!
//! This module defines the hard-failure error hierarchy. Hard failures are
//! the ones that abort an operation outright: unreadable archives, integrity
//! violations, missing prerequisites. Per-record semantic problems are NOT
//! errors in this sense; they accumulate in a [`crate::report::RunReport`]
//! and the run continues.
//!
//! We use `thiserror` for automatic `Display` and `Error` implementations.

use std::io;
use thiserror::Error;

/// Result type alias for sitepack operations
pub type Result<T> = std::result::Result<T, Error>;

/// Hard-failure errors
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (file operations)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Archive frame is structurally invalid
    #[error("Invalid archive: {0}")]
    InvalidArchive(String),

    /// Segment checksum verification failed
    #[error("Checksum mismatch in segment '{segment}': expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Segment that failed verification
        segment: String,
        /// Digest recorded in the frame
        expected: String,
        /// Digest computed over the payload
        actual: String,
    },

    /// Archive segment is compressed but this build cannot decompress
    #[error("Segment '{0}' is compressed but decompression support is not available")]
    CompressionUnavailable(String),

    /// Compression/decompression failed
    #[error("Compression error: {0}")]
    Compression(String),

    /// Archive declares an extension dependency the target lacks
    #[error("Missing required extension dependency: {0}")]
    MissingDependency(String),

    /// Declared storage path is unreachable or not writable
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Record store operation failed
    #[error("Store error: {0}")]
    Store(String),

    /// Invalid operation or state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

impl Error {
    /// Create a serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create an invalid-archive error
    pub fn invalid_archive(msg: impl Into<String>) -> Self {
        Self::InvalidArchive(msg.into())
    }

    /// Create a compression error
    pub fn compression(msg: impl Into<String>) -> Self {
        Self::Compression(msg.into())
    }

    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create an invalid-operation error
    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        Self::InvalidOperation(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_checksum() {
        let err = Error::ChecksumMismatch {
            segment: "records".to_string(),
            expected: "aa".to_string(),
            actual: "bb".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("records"));
        assert!(msg.contains("aa"));
        assert!(msg.contains("bb"));
    }

    #[test]
    fn test_error_display_compression_unavailable() {
        let err = Error::CompressionUnavailable("header".to_string());
        assert!(err.to_string().contains("header"));
        assert!(err.to_string().contains("decompression"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "missing");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_error_constructors() {
        assert!(matches!(
            Error::invalid_archive("bad"),
            Error::InvalidArchive(_)
        ));
        assert!(matches!(Error::store("down"), Error::Store(_)));
    }
}
