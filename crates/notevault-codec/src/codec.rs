//! The uniform codec contract and the shipped codec implementations.
//!
//! Every codec exposes the same compress/uncompress pair. Compression levels
//! are per-instance state so that concurrent sessions with different tuning
//! never interfere with each other.

use std::io::{Read, Write};

use async_trait::async_trait;

use crate::content::RawContent;
use crate::error::{CodecError, Result};

/// Ceiling on decompressed output, guarding against decompression bombs.
pub const MAX_DECOMPRESSED_SIZE: usize = 64 * 1024 * 1024;

/// A named compression codec.
///
/// Implementations must be deterministic for a given (input, level) pair and
/// must round-trip: `uncompress(compress(b)) == b` for all byte inputs.
#[async_trait]
pub trait Codec: Send + Sync {
    /// Registry name of this codec (recorded in payload metadata).
    fn name(&self) -> &'static str;

    /// Whether the codec accepts raw byte input.
    ///
    /// String-only codecs return `false` and are skipped by auto-selection
    /// when the payload is not text.
    fn accepts_bytes(&self) -> bool {
        true
    }

    /// Compress the payload. Text input is encoded as UTF-8 first.
    async fn compress(&self, input: &RawContent) -> Result<Vec<u8>>;

    /// Reverse [`Codec::compress`].
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Decompress`] if the input is corrupt or was not
    /// produced by this codec, and [`CodecError::OutputTooLarge`] if the
    /// output would exceed [`MAX_DECOMPRESSED_SIZE`].
    async fn uncompress(&self, input: &[u8]) -> Result<Vec<u8>>;
}

fn check_output_size(len: usize) -> Result<()> {
    if len > MAX_DECOMPRESSED_SIZE {
        return Err(CodecError::OutputTooLarge {
            size: len,
            max: MAX_DECOMPRESSED_SIZE,
        });
    }
    Ok(())
}

// ============================================================================
// none
// ============================================================================

/// Identity codec: strings become UTF-8, byte buffers pass through.
#[derive(Debug, Default, Clone)]
pub struct NoneCodec;

#[async_trait]
impl Codec for NoneCodec {
    fn name(&self) -> &'static str {
        "none"
    }

    async fn compress(&self, input: &RawContent) -> Result<Vec<u8>> {
        Ok(input.as_bytes().to_vec())
    }

    async fn uncompress(&self, input: &[u8]) -> Result<Vec<u8>> {
        Ok(input.to_vec())
    }
}

// ============================================================================
// gzip
// ============================================================================

/// Gzip via flate2.
#[derive(Debug, Clone)]
pub struct GzipCodec {
    level: u32,
}

impl GzipCodec {
    /// Default compression level (flate2 "6").
    pub const DEFAULT_LEVEL: u32 = 6;

    /// Create a gzip codec at the default level.
    pub fn new() -> Self {
        Self::with_level(Self::DEFAULT_LEVEL as i32)
    }

    /// Create a gzip codec with an explicit level (clamped to 0..=9).
    pub fn with_level(level: i32) -> Self {
        Self {
            level: level.clamp(0, 9) as u32,
        }
    }
}

impl Default for GzipCodec {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Codec for GzipCodec {
    fn name(&self) -> &'static str {
        "gzip"
    }

    async fn compress(&self, input: &RawContent) -> Result<Vec<u8>> {
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::new(self.level));
        encoder
            .write_all(input.as_bytes())
            .map_err(|e| CodecError::Compress {
                codec: "gzip",
                reason: e.to_string(),
            })?;
        encoder.finish().map_err(|e| CodecError::Compress {
            codec: "gzip",
            reason: e.to_string(),
        })
    }

    async fn uncompress(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = flate2::read::GzDecoder::new(input);
        let mut out = Vec::new();
        decoder
            .by_ref()
            .take(MAX_DECOMPRESSED_SIZE as u64 + 1)
            .read_to_end(&mut out)
            .map_err(|e| CodecError::Decompress {
                codec: "gzip",
                reason: e.to_string(),
            })?;
        check_output_size(out.len())?;
        Ok(out)
    }
}

// ============================================================================
// zstd
// ============================================================================

/// Zstandard.
#[derive(Debug, Clone)]
pub struct ZstdCodec {
    level: i32,
}

impl ZstdCodec {
    /// Default compression level (balanced).
    pub const DEFAULT_LEVEL: i32 = 3;

    /// Create a zstd codec at the default level.
    pub fn new() -> Self {
        Self::with_level(Self::DEFAULT_LEVEL)
    }

    /// Create a zstd codec with an explicit level (clamped to 1..=22).
    pub fn with_level(level: i32) -> Self {
        Self {
            level: level.clamp(1, 22),
        }
    }
}

impl Default for ZstdCodec {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Codec for ZstdCodec {
    fn name(&self) -> &'static str {
        "zstd"
    }

    async fn compress(&self, input: &RawContent) -> Result<Vec<u8>> {
        zstd::encode_all(input.as_bytes(), self.level).map_err(|e| CodecError::Compress {
            codec: "zstd",
            reason: e.to_string(),
        })
    }

    async fn uncompress(&self, input: &[u8]) -> Result<Vec<u8>> {
        let out = zstd::decode_all(input).map_err(|e| CodecError::Decompress {
            codec: "zstd",
            reason: e.to_string(),
        })?;
        check_output_size(out.len())?;
        Ok(out)
    }
}

// ============================================================================
// brotli
// ============================================================================

/// Brotli.
#[derive(Debug, Clone)]
pub struct BrotliCodec {
    quality: u32,
}

impl BrotliCodec {
    /// Default quality.
    pub const DEFAULT_QUALITY: u32 = 9;
    const LG_WINDOW: u32 = 22;
    const BUFFER: usize = 4096;

    /// Create a brotli codec at the default quality.
    pub fn new() -> Self {
        Self::with_level(Self::DEFAULT_QUALITY as i32)
    }

    /// Create a brotli codec with an explicit quality (clamped to 0..=11).
    pub fn with_level(level: i32) -> Self {
        Self {
            quality: level.clamp(0, 11) as u32,
        }
    }
}

impl Default for BrotliCodec {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Codec for BrotliCodec {
    fn name(&self) -> &'static str {
        "brotli"
    }

    async fn compress(&self, input: &RawContent) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        {
            let mut writer = brotli::CompressorWriter::new(
                &mut out,
                Self::BUFFER,
                self.quality,
                Self::LG_WINDOW,
            );
            writer
                .write_all(input.as_bytes())
                .map_err(|e| CodecError::Compress {
                    codec: "brotli",
                    reason: e.to_string(),
                })?;
            writer.flush().map_err(|e| CodecError::Compress {
                codec: "brotli",
                reason: e.to_string(),
            })?;
        }
        Ok(out)
    }

    async fn uncompress(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut decoder = brotli::Decompressor::new(input, Self::BUFFER);
        decoder
            .by_ref()
            .take(MAX_DECOMPRESSED_SIZE as u64 + 1)
            .read_to_end(&mut out)
            .map_err(|e| CodecError::Decompress {
                codec: "brotli",
                reason: e.to_string(),
            })?;
        check_output_size(out.len())?;
        Ok(out)
    }
}

// ============================================================================
// lz4
// ============================================================================

/// LZ4 with a length prefix so decompression knows the output size.
#[derive(Debug, Default, Clone)]
pub struct Lz4Codec;

#[async_trait]
impl Codec for Lz4Codec {
    fn name(&self) -> &'static str {
        "lz4"
    }

    async fn compress(&self, input: &RawContent) -> Result<Vec<u8>> {
        Ok(lz4_flex::compress_prepend_size(input.as_bytes()))
    }

    async fn uncompress(&self, input: &[u8]) -> Result<Vec<u8>> {
        // The declared size is validated before allocation.
        if input.len() >= 4 {
            let declared = u32::from_le_bytes([input[0], input[1], input[2], input[3]]) as usize;
            check_output_size(declared)?;
        }
        lz4_flex::decompress_size_prepended(input).map_err(|e| CodecError::Decompress {
            codec: "lz4",
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_codecs() -> Vec<Box<dyn Codec>> {
        vec![
            Box::new(NoneCodec),
            Box::new(GzipCodec::new()),
            Box::new(ZstdCodec::new()),
            Box::new(BrotliCodec::new()),
            Box::new(Lz4Codec),
        ]
    }

    #[tokio::test]
    async fn test_none_identity_on_bytes() {
        let codec = NoneCodec;
        let data = RawContent::from(vec![1u8, 2, 3, 255]);
        let compressed = codec.compress(&data).await.unwrap();
        assert_eq!(compressed, vec![1, 2, 3, 255]);
        assert_eq!(codec.uncompress(&compressed).await.unwrap(), vec![1, 2, 3, 255]);
    }

    #[tokio::test]
    async fn test_none_encodes_text_as_utf8() {
        let codec = NoneCodec;
        let compressed = codec.compress(&RawContent::from("hé")).await.unwrap();
        assert_eq!(compressed, "hé".as_bytes());
    }

    #[tokio::test]
    async fn test_all_codecs_roundtrip() {
        let data: Vec<u8> = (0..5000).map(|i| (i % 251) as u8).collect();
        for codec in all_codecs() {
            let compressed = codec.compress(&RawContent::from(data.clone())).await.unwrap();
            let restored = codec.uncompress(&compressed).await.unwrap();
            assert_eq!(restored, data, "codec {} failed round-trip", codec.name());
        }
    }

    #[tokio::test]
    async fn test_all_codecs_roundtrip_empty() {
        for codec in all_codecs() {
            let compressed = codec.compress(&RawContent::from(Vec::new())).await.unwrap();
            let restored = codec.uncompress(&compressed).await.unwrap();
            assert!(restored.is_empty(), "codec {} failed on empty", codec.name());
        }
    }

    #[tokio::test]
    async fn test_compressible_input_shrinks() {
        let data = vec![b'a'; 10_000];
        for codec in all_codecs() {
            if codec.name() == "none" {
                continue;
            }
            let compressed = codec.compress(&RawContent::from(data.clone())).await.unwrap();
            assert!(
                compressed.len() < data.len(),
                "codec {} did not shrink repetitive input",
                codec.name()
            );
        }
    }

    #[tokio::test]
    async fn test_gzip_rejects_garbage() {
        let codec = GzipCodec::new();
        assert!(codec.uncompress(&[1, 2, 3, 4, 5]).await.is_err());
    }

    #[tokio::test]
    async fn test_zstd_rejects_garbage() {
        let codec = ZstdCodec::new();
        assert!(codec.uncompress(&[9, 9, 9, 9]).await.is_err());
    }

    #[tokio::test]
    async fn test_lz4_rejects_oversized_declared_length() {
        let codec = Lz4Codec;
        let mut forged = ((MAX_DECOMPRESSED_SIZE + 1) as u32).to_le_bytes().to_vec();
        forged.extend_from_slice(&[0u8; 16]);
        assert!(matches!(
            codec.uncompress(&forged).await,
            Err(CodecError::OutputTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn test_level_clamping() {
        let gzip = GzipCodec::with_level(99);
        assert_eq!(gzip.level, 9);
        let zstd = ZstdCodec::with_level(-4);
        assert_eq!(zstd.level, 1);
        let brotli = BrotliCodec::with_level(50);
        assert_eq!(brotli.quality, 11);
    }
}
