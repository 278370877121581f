//! Error types for ledger operations.

use thiserror::Error;

/// The shape of a failed transaction submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitErrorKind {
    /// The current round moved past the transaction's last-valid round.
    Expired,
    /// The node's transaction pool rejected the transaction.
    PoolError(String),
    /// The submission failed before reaching the node.
    TransientNetwork(String),
}

impl std::fmt::Display for SubmitErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubmitErrorKind::Expired => write!(f, "transaction expired"),
            SubmitErrorKind::PoolError(msg) => write!(f, "pool error: {msg}"),
            SubmitErrorKind::TransientNetwork(msg) => write!(f, "network error: {msg}"),
        }
    }
}

/// Errors that can occur talking to the ledger.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// HTTP transport failure.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The node or indexer answered with an error status.
    #[error("API error (status {status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error body returned by the service.
        message: String,
    },

    /// Transaction submission failed.
    #[error("Submit failed: {0}")]
    SubmitFailed(SubmitErrorKind),

    /// No transaction with the given id exists.
    #[error("Transaction not found: {0}")]
    NotFound(String),

    /// An address string failed to parse.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// An account seed failed to parse.
    #[error("Invalid account seed: {0}")]
    InvalidSeed(String),

    /// A response body could not be decoded.
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// Invalid client configuration.
    #[error("Invalid ledger configuration: {0}")]
    Config(String),
}

impl LedgerError {
    /// Whether this error is the idempotent-resubmit signal.
    ///
    /// A node that already holds the transaction answers
    /// "transaction already in ledger"; callers treat that as success.
    pub fn is_already_in_ledger(&self) -> bool {
        let message = match self {
            LedgerError::Api { message, .. } => message,
            LedgerError::SubmitFailed(SubmitErrorKind::PoolError(msg)) => msg,
            _ => return false,
        };
        message.contains("transaction already in ledger")
    }
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_in_ledger_detection() {
        let err = LedgerError::Api {
            status: 400,
            message: "TransactionPool.Remember: transaction already in ledger".to_string(),
        };
        assert!(err.is_already_in_ledger());

        let err = LedgerError::Api {
            status: 400,
            message: "overspend".to_string(),
        };
        assert!(!err.is_already_in_ledger());

        let err = LedgerError::NotFound("x".to_string());
        assert!(!err.is_already_in_ledger());
    }

    #[test]
    fn test_submit_error_display() {
        assert_eq!(
            SubmitErrorKind::Expired.to_string(),
            "transaction expired"
        );
    }
}
