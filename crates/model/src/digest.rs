//! Content digests
//!
//! File identity inside a Document is the xxh3-128 digest of the blob's
//! bytes, rendered as 32 lowercase hex characters. Identity by content (not
//! filename) is what lets identical bytes referenced from multiple records
//! collapse to one stored blob. The same digest doubles as the archive
//! segment checksum in the codec.

/// Content-derived file identity: 32 lowercase hex characters
pub type FileId = String;

/// Compute the xxh3-128 digest of data as a 32-hex-char string
pub fn content_digest(data: &[u8]) -> FileId {
    use xxhash_rust::xxh3::xxh3_128;
    format!("{:032x}", xxh3_128(data))
}
