//! Payment transactions, signing and transaction ids.

use data_encoding::BASE32_NOPAD;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512_256};

use crate::account::{Account, Address};
use crate::error::{LedgerError, Result};

/// Maximum note size in bytes.
pub const MAX_NOTE_SIZE: usize = 1024;

/// Length of an encoded transaction id.
pub const TXID_LEN: usize = 52;

/// Domain tag mixed into the id digest.
const TXID_DOMAIN: &[u8] = b"TX";

/// Network parameters suggested by the node for new transactions.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SuggestedParams {
    /// Flat fee per transaction in micro-units.
    pub fee: u64,
    /// Minimum accepted fee in micro-units.
    pub min_fee: u64,
    /// First round the transaction is valid in.
    pub first_valid: u64,
    /// Last round the transaction is valid in.
    pub last_valid: u64,
    /// Genesis id of the network.
    pub genesis_id: String,
}

/// An unsigned payment transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentTransaction {
    /// Paying account.
    pub sender: Address,
    /// Receiving account.
    pub receiver: Address,
    /// Amount in micro-units.
    pub amount: u64,
    /// Note payload, at most [`MAX_NOTE_SIZE`] bytes.
    pub note: Vec<u8>,
    /// When set, the remainder of the sender account is swept to this
    /// address and the sender account is closed.
    pub close_remainder_to: Option<Address>,
    /// Fee in micro-units.
    pub fee: u64,
    /// First valid round.
    pub first_valid: u64,
    /// Last valid round.
    pub last_valid: u64,
    /// Genesis id this transaction is bound to.
    pub genesis_id: String,
}

impl PaymentTransaction {
    /// Build a payment from suggested params.
    pub fn build(
        sender: Address,
        receiver: Address,
        amount: u64,
        note: Vec<u8>,
        close_remainder_to: Option<Address>,
        params: &SuggestedParams,
    ) -> Self {
        Self {
            sender,
            receiver,
            amount,
            note,
            close_remainder_to,
            fee: params.fee.max(params.min_fee),
            first_valid: params.first_valid,
            last_valid: params.last_valid,
            genesis_id: params.genesis_id.clone(),
        }
    }

    /// Canonical byte encoding used for signing and id computation.
    ///
    /// Fixed field order with length prefixes for the variable parts, so the
    /// encoding is injective.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(128 + self.note.len());
        out.extend_from_slice(self.sender.as_bytes());
        out.extend_from_slice(self.receiver.as_bytes());
        out.extend_from_slice(&self.amount.to_be_bytes());
        out.extend_from_slice(&self.fee.to_be_bytes());
        out.extend_from_slice(&self.first_valid.to_be_bytes());
        out.extend_from_slice(&self.last_valid.to_be_bytes());
        out.extend_from_slice(&(self.genesis_id.len() as u32).to_be_bytes());
        out.extend_from_slice(self.genesis_id.as_bytes());
        out.extend_from_slice(&(self.note.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.note);
        match &self.close_remainder_to {
            Some(addr) => {
                out.push(1);
                out.extend_from_slice(addr.as_bytes());
            }
            None => out.push(0),
        }
        out
    }

    /// The transaction id: 52-character base32 of the SHA-512/256 digest of
    /// the domain-tagged canonical encoding.
    pub fn id(&self) -> String {
        let mut hasher = Sha512_256::new();
        hasher.update(TXID_DOMAIN);
        hasher.update(self.canonical_bytes());
        let digest = hasher.finalize();
        BASE32_NOPAD.encode(&digest)
    }

    /// Sign with the sender's account, producing a submittable transaction.
    pub fn sign(self, account: &Account) -> SignedTransaction {
        let id = self.id();
        let signature = account.sign(&self.canonical_bytes());
        SignedTransaction {
            id,
            signature: signature.to_bytes().to_vec(),
            transaction: self,
        }
    }
}

/// A signed transaction ready for submission.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignedTransaction {
    /// Transaction id (52 characters).
    pub id: String,
    /// ed25519 signature over the canonical encoding.
    pub signature: Vec<u8>,
    /// The signed transaction.
    pub transaction: PaymentTransaction,
}

impl SignedTransaction {
    /// Fee this transaction pays.
    pub fn fee(&self) -> u64 {
        self.transaction.fee
    }

    /// Serialize for wire submission.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Decode`] if serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| LedgerError::Decode(e.to_string()))
    }

    /// Decode a wire-form signed transaction, recovering its id and
    /// validity window.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| LedgerError::Decode(e.to_string()))
    }
}

/// A confirmed transaction as returned by lookups and searches.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Transaction id.
    pub id: String,
    /// Paying account.
    pub sender: Address,
    /// Receiving account.
    pub receiver: Address,
    /// Amount in micro-units.
    pub amount: u64,
    /// Note payload.
    pub note: Vec<u8>,
    /// Close-remainder target, if the sender account was closed.
    pub close_remainder_to: Option<Address>,
    /// Round the transaction was confirmed in.
    pub confirmed_round: u64,
    /// Position within the confirmed round.
    pub intra_round_offset: u64,
}

/// Pending-transaction status from the node.
#[derive(Clone, Debug, Default)]
pub struct PendingInfo {
    /// Round the transaction was confirmed in, when confirmed.
    pub confirmed_round: Option<u64>,
    /// Pool rejection reason; empty while the transaction is healthy.
    pub pool_error: String,
}

/// Which side of a payment an address filter applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddressRole {
    /// Match the paying account.
    Sender,
    /// Match the receiving account.
    Receiver,
}

/// An indexer search over payment transactions.
#[derive(Clone, Debug, Default)]
pub struct TransactionQuery {
    /// Address to filter on.
    pub address: Option<Address>,
    /// Which role the address must have.
    pub address_role: Option<AddressRole>,
    /// Only transactions confirmed at or after this round.
    pub min_round: Option<u64>,
    /// Page token from a previous [`TransactionPage`].
    pub next: Option<String>,
    /// Page size; 0 means the backend default.
    pub limit: usize,
}

/// One page of search results, chronologically ordered.
#[derive(Clone, Debug, Default)]
pub struct TransactionPage {
    /// The matching transactions.
    pub transactions: Vec<TransactionRecord>,
    /// Token for the next page; `None` when exhausted.
    pub next: Option<String>,
}
