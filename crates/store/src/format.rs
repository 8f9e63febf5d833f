//! On-disk framing for the WAL: a small file header followed by a sequence
//! of self-delimiting, checksummed records.
//!
//! ```text
//! File:   [ header (16 bytes) ][ record ][ record ]...
//! Record: [ len: u32 LE ][ seq: u64 LE ][ timestamp: i64 LE ][ payload ][ crc32: u32 LE ]
//! ```
//!
//! `len` covers everything between it and the checksum (seq + timestamp +
//! payload). The checksum covers the same span, so a torn write at the tail
//! is detected and dropped rather than misread as a shorter valid record.

use crc32fast::Hasher;

/// Magic bytes identifying a StackMemory WAL file.
pub const WAL_MAGIC: [u8; 4] = *b"SMWL";
/// Current WAL file format version.
pub const WAL_FORMAT_VERSION: u32 = 1;
/// Size of the file header in bytes.
pub const WAL_HEADER_SIZE: usize = 16;

/// One committed transaction's worth of WAL data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalRecord {
    /// Monotonic transaction sequence number.
    pub seq: u64,
    /// Commit time, unix milliseconds.
    pub timestamp: i64,
    /// Bincode-encoded `Vec<crate::txn::WriteOp>`.
    pub payload: Vec<u8>,
}

/// Errors parsing a record out of a byte buffer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    /// Fewer bytes remain than the record framing requires.
    #[error("truncated record")]
    Truncated,
    /// The stored checksum doesn't match the computed one.
    #[error("checksum mismatch: stored {stored:08x}, computed {computed:08x}")]
    ChecksumMismatch {
        /// Checksum read from the record.
        stored: u32,
        /// Checksum computed over the record's bytes.
        computed: u32,
    },
}

impl WalRecord {
    /// Encode the file header.
    pub fn encode_header() -> [u8; WAL_HEADER_SIZE] {
        let mut buf = [0u8; WAL_HEADER_SIZE];
        buf[0..4].copy_from_slice(&WAL_MAGIC);
        buf[4..8].copy_from_slice(&WAL_FORMAT_VERSION.to_le_bytes());
        buf
    }

    /// Validate a file header, returning `true` if the magic and version match.
    pub fn is_valid_header(buf: &[u8]) -> bool {
        buf.len() >= WAL_HEADER_SIZE
            && buf[0..4] == WAL_MAGIC
            && u32::from_le_bytes(buf[4..8].try_into().unwrap()) == WAL_FORMAT_VERSION
    }

    /// Serialize this record to its on-disk framing.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(16 + self.payload.len());
        body.extend_from_slice(&self.seq.to_le_bytes());
        body.extend_from_slice(&self.timestamp.to_le_bytes());
        body.extend_from_slice(&self.payload);

        let crc = Self::crc(&body);
        let mut out = Vec::with_capacity(4 + body.len() + 4);
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        out.extend_from_slice(&body);
        out.extend_from_slice(&crc.to_le_bytes());
        out
    }

    /// Parse one record from the front of `buf`. Returns the record and the
    /// number of bytes consumed.
    pub fn from_bytes(buf: &[u8]) -> Result<(Self, usize), RecordError> {
        if buf.len() < 4 {
            return Err(RecordError::Truncated);
        }
        let body_len = u32::from_le_bytes(buf[0..4].try_into().unwrap()) as usize;
        if buf.len() < 4 + body_len + 4 {
            return Err(RecordError::Truncated);
        }
        let body = &buf[4..4 + body_len];
        let stored_crc = u32::from_le_bytes(buf[4 + body_len..4 + body_len + 4].try_into().unwrap());
        let computed_crc = Self::crc(body);
        if stored_crc != computed_crc {
            return Err(RecordError::ChecksumMismatch {
                stored: stored_crc,
                computed: computed_crc,
            });
        }
        if body.len() < 16 {
            return Err(RecordError::Truncated);
        }
        let seq = u64::from_le_bytes(body[0..8].try_into().unwrap());
        let timestamp = i64::from_le_bytes(body[8..16].try_into().unwrap());
        let payload = body[16..].to_vec();

        Ok((
            WalRecord {
                seq,
                timestamp,
                payload,
            },
            4 + body_len + 4,
        ))
    }

    fn crc(data: &[u8]) -> u32 {
        let mut hasher = Hasher::new();
        hasher.update(data);
        hasher.finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_roundtrips() {
        let rec = WalRecord {
            seq: 7,
            timestamp: 1_700_000_000_000,
            payload: vec![1, 2, 3, 4, 5],
        };
        let bytes = rec.to_bytes();
        let (parsed, consumed) = WalRecord::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, rec);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn header_roundtrips() {
        let header = WalRecord::encode_header();
        assert!(WalRecord::is_valid_header(&header));
    }

    #[test]
    fn corrupted_record_fails_checksum() {
        let rec = WalRecord {
            seq: 1,
            timestamp: 0,
            payload: vec![9, 9, 9],
        };
        let mut bytes = rec.to_bytes();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(matches!(
            WalRecord::from_bytes(&bytes),
            Err(RecordError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn truncated_tail_is_detected() {
        let rec = WalRecord {
            seq: 1,
            timestamp: 0,
            payload: vec![9, 9, 9, 9, 9, 9, 9, 9],
        };
        let bytes = rec.to_bytes();
        let torn = &bytes[..bytes.len() - 3];
        assert!(matches!(
            WalRecord::from_bytes(torn),
            Err(RecordError::Truncated)
        ));
    }
}
