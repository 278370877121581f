//! Error types for codec operations.

use thiserror::Error;

/// Errors that can occur while compressing or decompressing payloads.
#[derive(Error, Debug)]
pub enum CodecError {
    /// No codec is registered under the requested name.
    #[error("Unknown codec: {0}")]
    UnknownCodec(String),

    /// Compression failed.
    #[error("Compression failed ({codec}): {reason}")]
    Compress {
        /// Name of the codec that failed.
        codec: &'static str,
        /// Underlying failure description.
        reason: String,
    },

    /// Decompression failed (corrupt or foreign input).
    #[error("Decompression failed ({codec}): {reason}")]
    Decompress {
        /// Name of the codec that failed.
        codec: &'static str,
        /// Underlying failure description.
        reason: String,
    },

    /// Decompressed output would exceed the configured ceiling.
    #[error("Decompressed output too large: {size} bytes (max {max})")]
    OutputTooLarge {
        /// Observed (or declared) output size.
        size: usize,
        /// Maximum allowed output size.
        max: usize,
    },

    /// The codec only accepts string input and the payload is raw bytes.
    #[error("Codec {0} only accepts string input")]
    BytesNotAccepted(&'static str),
}

/// Result type for codec operations.
pub type Result<T> = std::result::Result<T, CodecError>;
