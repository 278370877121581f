//! Ledger adapter for notevault.
//!
//! Everything above this crate talks to the chain through the [`Ledger`]
//! trait: suggested params, payment submission, confirmation polling, id
//! lookups and paginated indexer searches. Two implementations ship:
//!
//! - [`HttpLedger`]: node + indexer REST clients for real networks
//! - [`MemoryLedger`]: in-process backend for tests and fee simulation
//!
//! Accounts are ed25519 keypairs with base32-checksummed addresses; session
//! receivers are derived hierarchically from the sender seed so they stay
//! recoverable from the `(accid, addid)` indices stored on-chain.

pub mod account;
pub mod config;
pub mod error;
pub mod http;
pub mod ledger;
pub mod memory;
pub mod transaction;

pub use account::{Account, Address, ADDRESS_LEN};
pub use config::LedgerConfig;
pub use error::{LedgerError, Result, SubmitErrorKind};
pub use http::{AlgodClient, HttpLedger, IndexerClient};
pub use ledger::{search_all, wait_for_confirmation, Ledger, PAGINATION_DELAY_MS};
pub use memory::MemoryLedger;
pub use transaction::{
    AddressRole, PaymentTransaction, PendingInfo, SignedTransaction, SuggestedParams,
    TransactionPage, TransactionQuery, TransactionRecord, MAX_NOTE_SIZE, TXID_LEN,
};
