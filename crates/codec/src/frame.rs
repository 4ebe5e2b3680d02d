//! Segment framing
//!
//! Every archive segment is framed as:
//!
//! ```text
//! <32-hex content checksum>:<1-char compressed flag>:<10-digit zero-padded length>:<payload>:
//! ```
//!
//! The checksum is the xxh3-128 digest of the payload *as stored* (still
//! compressed when the flag is `1`), so corruption is detected before any
//! decompression is attempted. The length counts the stored payload bytes.
//! Any frame violation — short input, bad separators, non-hex checksum,
//! checksum mismatch, or a compressed flag without decompression support —
//! fails the decode.

use sitepack_core::{Error, Result};
use sitepack_model::content_digest;

/// Byte length of the checksum field
const CHECKSUM_LEN: usize = 32;

/// Byte length of the length field
const LENGTH_LEN: usize = 10;

/// Total fixed-width prefix: checksum + ':' + flag + ':' + length + ':'
const PREFIX_LEN: usize = CHECKSUM_LEN + 1 + 1 + 1 + LENGTH_LEN + 1;

#[cfg(feature = "compression")]
fn compress(data: &[u8]) -> Result<Vec<u8>> {
    zstd::encode_all(data, 3).map_err(|e| Error::compression(format!("zstd encode: {e}")))
}

#[cfg(feature = "compression")]
fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    zstd::decode_all(data).map_err(|e| Error::compression(format!("zstd decode: {e}")))
}

/// Writer appending frames to a byte buffer
#[derive(Debug, Default)]
pub struct FrameWriter {
    out: Vec<u8>,
}

impl FrameWriter {
    /// Create an empty writer
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one segment
    ///
    /// With `compress` set (and the `compression` feature built in) the
    /// payload is stored zstd-compressed; otherwise it is stored verbatim.
    pub fn write_segment(&mut self, payload: &[u8], compress_segment: bool) -> Result<()> {
        #[cfg(feature = "compression")]
        let (stored, flag) = if compress_segment {
            (compress(payload)?, b'1')
        } else {
            (payload.to_vec(), b'0')
        };
        #[cfg(not(feature = "compression"))]
        let (stored, flag) = {
            let _ = compress_segment;
            (payload.to_vec(), b'0')
        };

        let digest = content_digest(&stored);
        self.out.extend_from_slice(digest.as_bytes());
        self.out.push(b':');
        self.out.push(flag);
        self.out.push(b':');
        self.out
            .extend_from_slice(format!("{:010}", stored.len()).as_bytes());
        self.out.push(b':');
        self.out.extend_from_slice(&stored);
        self.out.push(b':');
        Ok(())
    }

    /// Finish, returning the framed bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.out
    }
}

/// Reader consuming consecutive frames from a byte slice
#[derive(Debug)]
pub struct FrameReader<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> FrameReader<'a> {
    /// Create a reader over the full input
    pub fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    /// True if all input was consumed
    pub fn is_at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    /// Decode the next segment, verifying its checksum
    ///
    /// `segment` names the segment in error messages.
    pub fn read_segment(&mut self, segment: &str) -> Result<Vec<u8>> {
        let rest = &self.input[self.pos..];
        if rest.len() < PREFIX_LEN {
            return Err(Error::invalid_archive(format!(
                "segment '{segment}': truncated frame prefix"
            )));
        }

        let checksum = std::str::from_utf8(&rest[..CHECKSUM_LEN])
            .map_err(|_| Error::invalid_archive(format!("segment '{segment}': bad checksum")))?;
        if !checksum.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::invalid_archive(format!(
                "segment '{segment}': checksum is not hex"
            )));
        }

        let flag = rest[CHECKSUM_LEN + 1];
        let compressed = match flag {
            b'0' => false,
            b'1' => true,
            other => {
                return Err(Error::invalid_archive(format!(
                    "segment '{segment}': bad compression flag {other:#04x}"
                )))
            }
        };

        let len_field = &rest[CHECKSUM_LEN + 3..CHECKSUM_LEN + 3 + LENGTH_LEN];
        let length: usize = std::str::from_utf8(len_field)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| {
                Error::invalid_archive(format!("segment '{segment}': bad length field"))
            })?;

        for (idx, name) in [(CHECKSUM_LEN, "checksum"), (CHECKSUM_LEN + 2, "flag"), (PREFIX_LEN - 1, "length")] {
            if rest[idx] != b':' {
                return Err(Error::invalid_archive(format!(
                    "segment '{segment}': missing separator after {name}"
                )));
            }
        }

        let payload_start = PREFIX_LEN;
        let payload_end = payload_start + length;
        if rest.len() < payload_end + 1 {
            return Err(Error::invalid_archive(format!(
                "segment '{segment}': truncated payload (expected {length} bytes)"
            )));
        }
        if rest[payload_end] != b':' {
            return Err(Error::invalid_archive(format!(
                "segment '{segment}': missing payload terminator"
            )));
        }

        let stored = &rest[payload_start..payload_end];
        let actual = content_digest(stored);
        if actual != checksum {
            return Err(Error::ChecksumMismatch {
                segment: segment.to_string(),
                expected: checksum.to_string(),
                actual,
            });
        }

        self.pos += payload_end + 1;

        if compressed {
            #[cfg(feature = "compression")]
            {
                decompress(stored)
            }
            #[cfg(not(feature = "compression"))]
            {
                Err(Error::CompressionUnavailable(segment.to_string()))
            }
        } else {
            Ok(stored.to_vec())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(payload: &[u8], compress: bool) -> Vec<u8> {
        let mut writer = FrameWriter::new();
        writer.write_segment(payload, compress).unwrap();
        writer.into_bytes()
    }

    #[test]
    fn test_roundtrip_uncompressed() {
        let bytes = encode(b"hello frame", false);
        let mut reader = FrameReader::new(&bytes);
        assert_eq!(reader.read_segment("test").unwrap(), b"hello frame");
        assert!(reader.is_at_end());
    }

    #[test]
    fn test_frame_layout() {
        let bytes = encode(b"abc", false);
        // 32 hex + ':' + flag + ':' + 10 digits + ':' + payload + ':'
        assert_eq!(bytes.len(), 46 + 3 + 1);
        assert_eq!(bytes[32], b':');
        assert_eq!(bytes[33], b'0');
        assert_eq!(bytes[34], b':');
        assert_eq!(&bytes[35..45], b"0000000003");
        assert_eq!(bytes[45], b':');
        assert_eq!(&bytes[46..49], b"abc");
        assert_eq!(bytes[49], b':');
    }

    #[test]
    fn test_empty_payload() {
        let bytes = encode(b"", false);
        let mut reader = FrameReader::new(&bytes);
        assert_eq!(reader.read_segment("empty").unwrap(), b"");
    }

    #[test]
    fn test_multiple_segments() {
        let mut writer = FrameWriter::new();
        writer.write_segment(b"one", false).unwrap();
        writer.write_segment(b"two", false).unwrap();
        let bytes = writer.into_bytes();

        let mut reader = FrameReader::new(&bytes);
        assert_eq!(reader.read_segment("a").unwrap(), b"one");
        assert_eq!(reader.read_segment("b").unwrap(), b"two");
        assert!(reader.is_at_end());
    }

    #[test]
    fn test_corrupted_payload_byte_is_checksum_error() {
        let mut bytes = encode(b"payload bytes", false);
        // Flip one payload byte
        let idx = bytes.len() - 2;
        bytes[idx] ^= 0xff;

        let mut reader = FrameReader::new(&bytes);
        match reader.read_segment("records") {
            Err(Error::ChecksumMismatch { segment, .. }) => assert_eq!(segment, "records"),
            other => panic!("expected checksum mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_truncated_input() {
        let bytes = encode(b"payload", false);
        let mut reader = FrameReader::new(&bytes[..bytes.len() - 3]);
        assert!(matches!(
            reader.read_segment("x"),
            Err(Error::InvalidArchive(_))
        ));
    }

    #[test]
    fn test_bad_flag_rejected() {
        let mut bytes = encode(b"p", false);
        bytes[33] = b'7';
        let mut reader = FrameReader::new(&bytes);
        assert!(matches!(
            reader.read_segment("x"),
            Err(Error::InvalidArchive(_))
        ));
    }

    #[cfg(feature = "compression")]
    #[test]
    fn test_roundtrip_compressed() {
        let payload = b"compressible compressible compressible".repeat(10);
        let bytes = encode(&payload, true);
        let mut reader = FrameReader::new(&bytes);
        assert_eq!(reader.read_segment("c").unwrap(), payload);
    }

    #[cfg(feature = "compression")]
    #[test]
    fn test_checksum_covers_stored_bytes() {
        let payload = b"compressible compressible compressible".repeat(10);
        let mut bytes = encode(&payload, true);
        // Corrupt one byte inside the compressed payload: must fail as a
        // checksum mismatch, not a zstd error.
        bytes[50] ^= 0x01;
        let mut reader = FrameReader::new(&bytes);
        assert!(matches!(
            reader.read_segment("c"),
            Err(Error::ChecksumMismatch { .. })
        ));
    }
}
