//! Error types for cryptographic operations.

use thiserror::Error;

/// Errors that can occur during cryptographic operations.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Encryption failed.
    #[error("Encryption failed: {0}")]
    Encryption(String),

    /// Decryption failed (tag mismatch, wrong key, or malformed ciphertext).
    #[error("Decryption failed: invalid ciphertext or key")]
    Decryption,

    /// Invalid key length.
    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected key length.
        expected: usize,
        /// Actual key length.
        actual: usize,
    },

    /// Invalid nonce length.
    #[error("Invalid nonce length: expected {expected}, got {actual}")]
    InvalidNonceLength {
        /// Expected nonce length.
        expected: usize,
        /// Actual nonce length.
        actual: usize,
    },

    /// Invalid tag length.
    #[error("Invalid tag length: expected {expected}, got {actual}")]
    InvalidTagLength {
        /// Expected tag length.
        expected: usize,
        /// Actual tag length.
        actual: usize,
    },

    /// Invalid salt length.
    #[error("Invalid salt length: expected {expected}, got {actual}")]
    InvalidSaltLength {
        /// Expected salt length.
        expected: usize,
        /// Actual salt length.
        actual: usize,
    },

    /// A base64 or hex wire field failed to decode.
    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),
}

/// Result type for cryptographic operations.
pub type Result<T> = std::result::Result<T, CryptoError>;
