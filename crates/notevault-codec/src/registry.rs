//! Codec registry and writer-side codec selection.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::codec::{BrotliCodec, Codec, GzipCodec, Lz4Codec, NoneCodec, ZstdCodec};
use crate::content::RawContent;
use crate::error::{CodecError, Result};

/// How a writer chooses its codec.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionChoice {
    /// Compress with every registered codec and keep the smallest output.
    #[default]
    Best,
    /// Compress with every registered codec and keep the quickest one.
    Fast,
    /// A codec by name, at its default level.
    Named(String),
    /// A codec by name with an explicit compression level.
    NamedWithLevel {
        /// Codec name.
        name: String,
        /// Codec-specific compression level.
        level: i32,
    },
}

impl CompressionChoice {
    /// Shorthand for an explicit codec name.
    pub fn named(name: impl Into<String>) -> Self {
        CompressionChoice::Named(name.into())
    }
}

/// Output of a codec selection pass.
#[derive(Debug)]
pub struct CompressedPayload {
    /// Name of the codec that produced the output.
    pub codec: &'static str,
    /// Compressed bytes.
    pub data: Vec<u8>,
}

/// Registry of the codecs shipped with this crate.
///
/// Instantiation is cheap; writers create one per session so that explicit
/// levels never leak across sessions.
pub struct CodecRegistry;

/// Names of every registered codec, in registration order.
pub const CODEC_NAMES: &[&str] = &["none", "gzip", "zstd", "brotli", "lz4"];

impl CodecRegistry {
    /// Instantiate a codec by name at its default level.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnknownCodec`] for unregistered names.
    pub fn create(name: &str) -> Result<Box<dyn Codec>> {
        Self::create_with_level(name, None)
    }

    /// Instantiate a codec by name with an optional explicit level.
    pub fn create_with_level(name: &str, level: Option<i32>) -> Result<Box<dyn Codec>> {
        match name {
            "none" => Ok(Box::new(NoneCodec)),
            "gzip" => Ok(Box::new(match level {
                Some(l) => GzipCodec::with_level(l),
                None => GzipCodec::new(),
            })),
            "zstd" => Ok(Box::new(match level {
                Some(l) => ZstdCodec::with_level(l),
                None => ZstdCodec::new(),
            })),
            "brotli" => Ok(Box::new(match level {
                Some(l) => BrotliCodec::with_level(l),
                None => BrotliCodec::new(),
            })),
            "lz4" => Ok(Box::new(Lz4Codec)),
            other => Err(CodecError::UnknownCodec(other.to_string())),
        }
    }

    /// Instantiate every registered codec at default levels.
    pub fn all() -> Vec<Box<dyn Codec>> {
        CODEC_NAMES
            .iter()
            .map(|name| Self::create(name).expect("registered codec"))
            .collect()
    }

    /// Compress `input` according to `choice`.
    ///
    /// `Best` keeps the smallest output across all codecs, `Fast` the one
    /// with the shortest wall-clock. Codecs that reject byte input are
    /// skipped during auto-selection when the payload is not text.
    pub async fn select_and_compress(
        choice: &CompressionChoice,
        input: &RawContent,
    ) -> Result<CompressedPayload> {
        match choice {
            CompressionChoice::Named(name) => {
                let codec = Self::create(name)?;
                Self::compress_with(codec.as_ref(), input).await
            }
            CompressionChoice::NamedWithLevel { name, level } => {
                let codec = Self::create_with_level(name, Some(*level))?;
                Self::compress_with(codec.as_ref(), input).await
            }
            CompressionChoice::Best => {
                let mut best: Option<CompressedPayload> = None;
                for codec in Self::auto_candidates(input) {
                    let out = Self::compress_with(codec.as_ref(), input).await?;
                    let better = best
                        .as_ref()
                        .map(|b| out.data.len() < b.data.len())
                        .unwrap_or(true);
                    if better {
                        best = Some(out);
                    }
                }
                best.ok_or_else(|| CodecError::UnknownCodec("<empty registry>".to_string()))
            }
            CompressionChoice::Fast => {
                let mut fastest: Option<(std::time::Duration, CompressedPayload)> = None;
                for codec in Self::auto_candidates(input) {
                    let started = Instant::now();
                    let out = Self::compress_with(codec.as_ref(), input).await?;
                    let elapsed = started.elapsed();
                    let better = fastest
                        .as_ref()
                        .map(|(t, _)| elapsed < *t)
                        .unwrap_or(true);
                    if better {
                        fastest = Some((elapsed, out));
                    }
                }
                fastest
                    .map(|(_, out)| out)
                    .ok_or_else(|| CodecError::UnknownCodec("<empty registry>".to_string()))
            }
        }
    }

    async fn compress_with(codec: &dyn Codec, input: &RawContent) -> Result<CompressedPayload> {
        if !input.is_text() && !codec.accepts_bytes() {
            return Err(CodecError::BytesNotAccepted(codec.name()));
        }
        let data = codec.compress(input).await?;
        Ok(CompressedPayload {
            codec: codec.name(),
            data,
        })
    }

    fn auto_candidates(input: &RawContent) -> Vec<Box<dyn Codec>> {
        Self::all()
            .into_iter()
            .filter(|c| input.is_text() || c.accepts_bytes())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_by_name() {
        for name in CODEC_NAMES {
            assert_eq!(CodecRegistry::create(name).unwrap().name(), *name);
        }
    }

    #[test]
    fn test_create_unknown() {
        assert!(matches!(
            CodecRegistry::create("lzma-9000"),
            Err(CodecError::UnknownCodec(_))
        ));
    }

    #[tokio::test]
    async fn test_explicit_selection() {
        let out = CodecRegistry::select_and_compress(
            &CompressionChoice::named("gzip"),
            &RawContent::from("hello hello hello hello"),
        )
        .await
        .unwrap();
        assert_eq!(out.codec, "gzip");
    }

    #[tokio::test]
    async fn test_explicit_level_selection() {
        let choice = CompressionChoice::NamedWithLevel {
            name: "zstd".to_string(),
            level: 19,
        };
        let out = CodecRegistry::select_and_compress(&choice, &RawContent::from(vec![7u8; 4096]))
            .await
            .unwrap();
        assert_eq!(out.codec, "zstd");
        let restored = CodecRegistry::create("zstd")
            .unwrap()
            .uncompress(&out.data)
            .await
            .unwrap();
        assert_eq!(restored, vec![7u8; 4096]);
    }

    #[tokio::test]
    async fn test_best_picks_smallest() {
        let input = RawContent::from(vec![b'x'; 20_000]);
        let out = CodecRegistry::select_and_compress(&CompressionChoice::Best, &input)
            .await
            .unwrap();
        // Highly repetitive input: every real codec beats identity, so the
        // winner cannot be `none` and must round-trip.
        assert_ne!(out.codec, "none");
        assert!(out.data.len() < 20_000);
        let restored = CodecRegistry::create(out.codec)
            .unwrap()
            .uncompress(&out.data)
            .await
            .unwrap();
        assert_eq!(restored.len(), 20_000);
    }

    #[tokio::test]
    async fn test_fast_returns_valid_output() {
        let input = RawContent::from(vec![3u8; 2048]);
        let out = CodecRegistry::select_and_compress(&CompressionChoice::Fast, &input)
            .await
            .unwrap();
        let restored = CodecRegistry::create(out.codec)
            .unwrap()
            .uncompress(&out.data)
            .await
            .unwrap();
        assert_eq!(restored, vec![3u8; 2048]);
    }
}
