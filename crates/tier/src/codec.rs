//! Compression codecs for tiered storage payloads.
//!
//! Mirrors the teacher's narrow, single-purpose codec trait rather than a
//! heavyweight transform pipeline: `encode`/`decode` plus an id for the
//! envelope. `select_for_tier` never fails — it falls back to gzip, and
//! gzip itself never falls back to anything, since it is always available.

use stackmemory_core::{Compression, Error, Result};
use std::io::{Read, Write};

/// A single compression codec.
pub trait CompressionCodec: Send + Sync {
    /// Compress `data`.
    fn encode(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Decompress `data`. Returns `Error::Corrupt` if the bytes don't match
    /// this codec's framing.
    fn decode(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// The `Compression` variant this codec implements.
    fn kind(&self) -> Compression;
}

/// No compression; `encode`/`decode` are identity.
pub struct NoneCodec;

impl CompressionCodec for NoneCodec {
    fn encode(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decode(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn kind(&self) -> Compression {
        Compression::None
    }
}

/// LZ4 with a prepended size header (mature tier default).
pub struct Lz4Codec;

impl CompressionCodec for Lz4Codec {
    fn encode(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(lz4_flex::compress_prepend_size(data))
    }

    fn decode(&self, data: &[u8]) -> Result<Vec<u8>> {
        lz4_flex::decompress_size_prepended(data)
            .map_err(|e| Error::Corrupt(format!("lz4 decode failed: {e}")))
    }

    fn kind(&self) -> Compression {
        Compression::Lz4
    }
}

/// Zstandard at the library default level (old tier default).
pub struct ZstdCodec;

impl CompressionCodec for ZstdCodec {
    fn encode(&self, data: &[u8]) -> Result<Vec<u8>> {
        zstd::encode_all(data, 0).map_err(|e| Error::Corrupt(format!("zstd encode failed: {e}")))
    }

    fn decode(&self, data: &[u8]) -> Result<Vec<u8>> {
        zstd::decode_all(data).map_err(|e| Error::Corrupt(format!("zstd decode failed: {e}")))
    }

    fn kind(&self) -> Compression {
        Compression::Zstd
    }
}

/// Gzip, the universal fallback used for the remote tier and for any tier
/// whose preferred codec is unavailable.
pub struct GzipCodec;

impl CompressionCodec for GzipCodec {
    fn encode(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder
            .write_all(data)
            .map_err(|e| Error::Corrupt(format!("gzip encode failed: {e}")))?;
        encoder
            .finish()
            .map_err(|e| Error::Corrupt(format!("gzip encode failed: {e}")))
    }

    fn decode(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = flate2::read::GzDecoder::new(data);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| Error::Corrupt(format!("gzip decode failed: {e}")))?;
        Ok(out)
    }

    fn kind(&self) -> Compression {
        Compression::Gzip
    }
}

/// Resolve the codec implementation for a `Compression` discriminant.
pub fn codec_for(compression: Compression) -> Box<dyn CompressionCodec> {
    match compression {
        Compression::None => Box::new(NoneCodec),
        Compression::Lz4 => Box::new(Lz4Codec),
        Compression::Zstd => Box::new(ZstdCodec),
        Compression::Gzip => Box::new(GzipCodec),
    }
}

/// The codec a tier prefers by default.
pub fn preferred_for_tier(tier: stackmemory_core::Tier) -> Compression {
    use stackmemory_core::Tier;
    match tier {
        Tier::Young => Compression::None,
        Tier::Mature => Compression::Lz4,
        Tier::Old => Compression::Zstd,
        Tier::Remote => Compression::Gzip,
    }
}

/// Compress `data` for `tier`, falling back to gzip if the preferred codec
/// errors. Returns the codec actually used alongside the encoded bytes.
pub fn compress_for_tier(data: &[u8], tier: stackmemory_core::Tier) -> (Compression, Vec<u8>) {
    let preferred = preferred_for_tier(tier);
    match codec_for(preferred).encode(data) {
        Ok(bytes) => (preferred, bytes),
        Err(e) => {
            tracing::warn!(
                tier = tier.as_str(),
                codec = preferred.as_str(),
                error = %e,
                "preferred codec unavailable, falling back to gzip"
            );
            let bytes = codec_for(Compression::Gzip)
                .encode(data)
                .expect("gzip encode should never fail");
            (Compression::Gzip, bytes)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_codec_is_identity() {
        let data = b"hello world";
        let codec = NoneCodec;
        assert_eq!(codec.decode(&codec.encode(data).unwrap()).unwrap(), data);
    }

    #[test]
    fn lz4_round_trips() {
        let data = b"the quick brown fox jumps over the lazy dog".repeat(20);
        let codec = Lz4Codec;
        let encoded = codec.encode(&data).unwrap();
        assert_eq!(codec.decode(&encoded).unwrap(), data);
    }

    #[test]
    fn zstd_round_trips() {
        let data = b"the quick brown fox jumps over the lazy dog".repeat(20);
        let codec = ZstdCodec;
        let encoded = codec.encode(&data).unwrap();
        assert_eq!(codec.decode(&encoded).unwrap(), data);
    }

    #[test]
    fn gzip_round_trips() {
        let data = b"the quick brown fox jumps over the lazy dog".repeat(20);
        let codec = GzipCodec;
        let encoded = codec.encode(&data).unwrap();
        assert_eq!(codec.decode(&encoded).unwrap(), data);
    }

    #[test]
    fn corrupt_lz4_bytes_yield_corrupt_error() {
        let codec = Lz4Codec;
        let err = codec.decode(&[0xff, 0xff, 0xff]).unwrap_err();
        assert!(matches!(err, Error::Corrupt(_)));
    }

    #[test]
    fn preferred_codec_matches_tier_defaults() {
        assert_eq!(preferred_for_tier(stackmemory_core::Tier::Young), Compression::None);
        assert_eq!(preferred_for_tier(stackmemory_core::Tier::Mature), Compression::Lz4);
        assert_eq!(preferred_for_tier(stackmemory_core::Tier::Old), Compression::Zstd);
        assert_eq!(preferred_for_tier(stackmemory_core::Tier::Remote), Compression::Gzip);
    }
}
