//! Error types for the upload manager.

use thiserror::Error;

/// Errors that can occur in the bootstrap upload flow.
#[derive(Error, Debug)]
pub enum ManagerError {
    /// The supplied bootstrap key does not match the funding note.
    #[error("Invalid bootstrap key")]
    InvalidBootstrapKey,

    /// The transaction's note is not a bootstrap note of this deployment.
    #[error("Not a bootstrap transaction: {0}")]
    NotABootstrap(String),

    /// Encryption options are not accepted at prepare time.
    #[error("Encryption options must not be sent to the server; supply them when running the upload")]
    EncryptionNotAllowed,

    /// No persisted upload exists for the funding transaction.
    #[error("No pending upload for transaction {0}")]
    MissingRecord(String),

    /// Local persistence failure.
    #[error("Store error: {0}")]
    Store(String),

    /// A persisted record failed to encode or decode.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid manager configuration.
    #[error("Invalid manager configuration: {0}")]
    Config(String),

    /// Transport failure.
    #[error(transparent)]
    Core(#[from] notevault_core::CoreError),

    /// Ledger failure.
    #[error(transparent)]
    Ledger(#[from] notevault_ledger::LedgerError),

    /// Cryptographic failure.
    #[error(transparent)]
    Crypto(#[from] notevault_crypto::CryptoError),
}

impl From<sled::Error> for ManagerError {
    fn from(e: sled::Error) -> Self {
        ManagerError::Store(e.to_string())
    }
}

/// Result type for manager operations.
pub type Result<T> = std::result::Result<T, ManagerError>;
