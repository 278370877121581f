//! Compression codecs for notevault payloads.
//!
//! Chunks stored in ledger notes are compressed before encryption so that
//! each 1024-byte note carries as much payload as possible. This crate
//! provides the uniform codec contract, the shipped codecs (`none`, `gzip`,
//! `zstd`, `brotli`, `lz4`) and the writer-side selection logic (`best`
//! picks the smallest output, `fast` the quickest codec).

pub mod codec;
pub mod content;
pub mod error;
pub mod registry;

pub use codec::{Codec, MAX_DECOMPRESSED_SIZE};
pub use content::RawContent;
pub use error::{CodecError, Result};
pub use registry::{CodecRegistry, CompressedPayload, CompressionChoice, CODEC_NAMES};
