//! The ledger abstraction and the confirmation loop.

use async_trait::async_trait;
use tracing::debug;

use crate::error::{LedgerError, Result, SubmitErrorKind};
use crate::transaction::{
    PendingInfo, SignedTransaction, SuggestedParams, TransactionPage, TransactionQuery,
    TransactionRecord,
};

/// Milliseconds to sleep between indexer pages to stay under rate limits.
pub const PAGINATION_DELAY_MS: u64 = 200;

/// Access to a ledger node and its indexer.
///
/// Implementations must be safe to share across tasks. Higher layers only
/// see this trait; the concrete backend is either the HTTP pair
/// ([`crate::http::HttpLedger`]) or the in-process
/// [`crate::memory::MemoryLedger`].
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Fetch suggested parameters for new transactions.
    async fn suggested_params(&self) -> Result<SuggestedParams>;

    /// Submit a signed transaction to the pool.
    ///
    /// # Errors
    ///
    /// Implementations surface pool rejections as [`LedgerError::Api`] with
    /// the node's message, including "transaction already in ledger" which
    /// callers treat as success.
    async fn submit(&self, signed: &SignedTransaction) -> Result<()>;

    /// Status of a pending transaction.
    async fn pending_info(&self, txid: &str) -> Result<PendingInfo>;

    /// The current round.
    async fn current_round(&self) -> Result<u64>;

    /// Block until a round later than `round` exists; returns the new round.
    async fn wait_for_round_after(&self, round: u64) -> Result<u64>;

    /// Look up a confirmed transaction by id.
    async fn lookup_by_id(&self, txid: &str) -> Result<TransactionRecord>;

    /// One page of an indexer search.
    async fn search(&self, query: &TransactionQuery) -> Result<TransactionPage>;
}

/// Wait until `signed` is confirmed, returning the confirmation round.
///
/// Polls pending status, advancing one round at a time. Returns the pool
/// error if the node reports one, and `transaction expired` once the current
/// round passes the transaction's last-valid round.
///
/// # Errors
///
/// [`LedgerError::SubmitFailed`] with [`SubmitErrorKind::PoolError`] or
/// [`SubmitErrorKind::Expired`].
pub async fn wait_for_confirmation(
    ledger: &dyn Ledger,
    signed: &SignedTransaction,
) -> Result<u64> {
    let tx_id = signed.id.as_str();
    let last_valid = signed.transaction.last_valid;
    let mut round = ledger.current_round().await?;

    loop {
        let info = ledger.pending_info(tx_id).await?;
        if let Some(confirmed) = info.confirmed_round {
            if confirmed > 0 {
                debug!(txid = tx_id, round = confirmed, "transaction executed");
                return Ok(confirmed);
            }
        }
        if !info.pool_error.is_empty() {
            return Err(LedgerError::SubmitFailed(SubmitErrorKind::PoolError(
                info.pool_error,
            )));
        }
        if round > last_valid {
            return Err(LedgerError::SubmitFailed(SubmitErrorKind::Expired));
        }
        round = ledger.wait_for_round_after(round).await?;
    }
}

/// Drain every page of `query`, sleeping between pages.
///
/// Returns all matching transactions in chronological order.
pub async fn search_all(
    ledger: &dyn Ledger,
    mut query: TransactionQuery,
) -> Result<Vec<TransactionRecord>> {
    let mut out = Vec::new();
    loop {
        let page = ledger.search(&query).await?;
        out.extend(page.transactions);
        match page.next {
            Some(token) => {
                query.next = Some(token);
                tokio::time::sleep(std::time::Duration::from_millis(PAGINATION_DELAY_MS)).await;
            }
            None => break,
        }
    }
    Ok(out)
}
