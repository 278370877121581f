//! Error types for the payload transport.

use thiserror::Error;

/// Errors that can occur while writing or reading payloads.
#[derive(Error, Debug)]
pub enum CoreError {
    /// The metadata JSON would not fit in a single note.
    #[error("Payload metadata too large: {size} bytes (max {max})")]
    PayloadTooLarge {
        /// Serialized metadata size.
        size: usize,
        /// Maximum note size.
        max: usize,
    },

    /// No sender account was supplied.
    #[error("Missing sender account")]
    MissingSender,

    /// The payload is encrypted with a raw key and none was supplied.
    #[error("Payload is encrypted: an AES key is required")]
    MissingKey,

    /// The payload is password-encrypted and no password was supplied.
    #[error("Payload is password-encrypted: a password is required")]
    MissingPassword,

    /// Revising a payload that belongs to a different sender.
    #[error("Cannot revise a payload owned by another sender")]
    RevisionOwnershipMismatch,

    /// The requested revision index does not exist.
    #[error("Invalid revision number {requested}: payload has {available} revisions")]
    InvalidRevisionNumber {
        /// 1-based revision index asked for.
        requested: usize,
        /// Number of revisions that exist.
        available: usize,
    },

    /// The metadata note failed to parse.
    #[error("Malformed payload metadata: {0}")]
    MalformedMetadata(String),

    /// A data note is too short to carry a counter.
    #[error("Malformed data note: {0}")]
    MalformedDataNote(String),

    /// Two data notes carry the same counter.
    #[error("Duplicate chunk counter {0}")]
    DuplicateChunk(u32),

    /// A counter in the dense range is missing.
    #[error("Missing chunk counter {0}")]
    MissingChunk(u32),

    /// Writing to a streamnote session that has already been stopped.
    #[error("Stream session is finalized")]
    StreamFinalized,

    /// The payload id does not name a streamnote session.
    #[error("Not a stream payload: {0}")]
    NotAStream(String),

    /// Ledger failure.
    #[error(transparent)]
    Ledger(#[from] notevault_ledger::LedgerError),

    /// Cryptographic failure (decrypt errors surface here).
    #[error(transparent)]
    Crypto(#[from] notevault_crypto::CryptoError),

    /// Codec failure (decompress errors surface here).
    #[error(transparent)]
    Codec(#[from] notevault_codec::CodecError),
}

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, CoreError>;
