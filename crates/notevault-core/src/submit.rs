//! Bounded-retry transaction submission with rebuild.
//!
//! Each note payment retries independently. "transaction already in ledger"
//! counts as success (idempotent resubmit). After
//! [`SubmitPolicy::retries_before_rebuild`] consecutive failures the
//! transaction is rebuilt against fresh suggested params (a new validity
//! window) and the retry counter resets. A reported expiry is terminal for
//! that transaction only.

use std::time::Duration;

use tracing::{debug, warn};

use notevault_ledger::{
    Account, Address, Ledger, LedgerError, PaymentTransaction, SignedTransaction,
    SubmitErrorKind,
};

use crate::error::Result;

/// Retry and pacing configuration for submissions.
#[derive(Clone, Debug)]
pub struct SubmitPolicy {
    /// Consecutive failures before the transaction is rebuilt.
    pub retries_before_rebuild: usize,
    /// Sleep between retry rounds.
    pub retry_delay: Duration,
    /// Sleep between submissions of different transactions.
    pub inter_submit_delay: Duration,
}

impl Default for SubmitPolicy {
    fn default() -> Self {
        Self {
            retries_before_rebuild: 25,
            retry_delay: Duration::from_secs(6),
            inter_submit_delay: Duration::from_millis(50),
        }
    }
}

impl SubmitPolicy {
    /// A policy with no sleeps, for tests.
    pub fn immediate() -> Self {
        Self {
            retries_before_rebuild: 25,
            retry_delay: Duration::ZERO,
            inter_submit_delay: Duration::ZERO,
        }
    }
}

/// The ledger-independent description of one note payment.
#[derive(Clone, Debug)]
pub struct NotePayment {
    /// Receiving address.
    pub receiver: Address,
    /// Amount in micro-units.
    pub amount: u64,
    /// Note bytes.
    pub note: Vec<u8>,
    /// Close-remainder target; the signer's account is closed when set.
    pub close_remainder_to: Option<Address>,
}

async fn build_and_sign(
    ledger: &dyn Ledger,
    signer: &Account,
    payment: &NotePayment,
) -> Result<SignedTransaction> {
    let params = ledger.suggested_params().await?;
    let txn = PaymentTransaction::build(
        signer.address(),
        payment.receiver,
        payment.amount,
        payment.note.clone(),
        payment.close_remainder_to,
        &params,
    );
    Ok(txn.sign(signer))
}

/// Submit one note payment with the retry-and-rebuild policy.
///
/// Returns the signed transaction that finally landed (or was already in
/// the ledger).
///
/// # Errors
///
/// A reported [`SubmitErrorKind::Expired`] is surfaced without rebuilding;
/// other errors retry indefinitely with periodic rebuilds.
pub async fn submit_with_retry(
    ledger: &dyn Ledger,
    signer: &Account,
    payment: &NotePayment,
    policy: &SubmitPolicy,
) -> Result<SignedTransaction> {
    let mut signed = build_and_sign(ledger, signer, payment).await?;
    let mut attempts: usize = 0;

    loop {
        match ledger.submit(&signed).await {
            Ok(()) => return Ok(signed),
            Err(err) if err.is_already_in_ledger() => {
                debug!(txid = %signed.id, "already in ledger, treating as success");
                return Ok(signed);
            }
            Err(LedgerError::SubmitFailed(SubmitErrorKind::Expired)) => {
                return Err(LedgerError::SubmitFailed(SubmitErrorKind::Expired).into());
            }
            Err(err) => {
                attempts += 1;
                warn!(txid = %signed.id, attempts, error = %err, "submit failed, retrying");
                if attempts >= policy.retries_before_rebuild {
                    signed = build_and_sign(ledger, signer, payment).await?;
                    attempts = 0;
                    debug!(txid = %signed.id, "rebuilt transaction with fresh params");
                }
                if !policy.retry_delay.is_zero() {
                    tokio::time::sleep(policy.retry_delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notevault_ledger::MemoryLedger;

    fn payment(receiver: &Account) -> NotePayment {
        NotePayment {
            receiver: receiver.address(),
            amount: 0,
            note: b"payload".to_vec(),
            close_remainder_to: None,
        }
    }

    #[tokio::test]
    async fn test_clean_submit() {
        let ledger = MemoryLedger::new();
        let sender = Account::from_seed(&[1; 32]);
        let receiver = Account::from_seed(&[2; 32]);

        let signed = submit_with_retry(
            &ledger,
            &sender,
            &payment(&receiver),
            &SubmitPolicy::immediate(),
        )
        .await
        .unwrap();
        assert_eq!(ledger.lookup_by_id(&signed.id).await.unwrap().note, b"payload");
    }

    #[tokio::test]
    async fn test_retries_through_transient_faults() {
        let ledger = MemoryLedger::new();
        let sender = Account::from_seed(&[1; 32]);
        let receiver = Account::from_seed(&[2; 32]);

        for _ in 0..3 {
            ledger.inject_submit_fault("connection reset by peer");
        }
        submit_with_retry(
            &ledger,
            &sender,
            &payment(&receiver),
            &SubmitPolicy::immediate(),
        )
        .await
        .unwrap();
        assert_eq!(ledger.len(), 1);
    }

    #[tokio::test]
    async fn test_already_in_ledger_is_success() {
        let ledger = MemoryLedger::new();
        let sender = Account::from_seed(&[1; 32]);
        let receiver = Account::from_seed(&[2; 32]);

        // The client retried after a response was lost: the fault reports
        // the transaction as already present.
        ledger.inject_submit_fault("TransactionPool.Remember: transaction already in ledger");
        let signed = submit_with_retry(
            &ledger,
            &sender,
            &payment(&receiver),
            &SubmitPolicy::immediate(),
        )
        .await
        .unwrap();

        // Treated as success without a rebuild: nothing landed beyond the
        // fault, and the id is the originally built one.
        assert_eq!(ledger.len(), 0);
        assert!(!signed.id.is_empty());
    }

    #[tokio::test]
    async fn test_rebuild_after_threshold() {
        let ledger = MemoryLedger::new();
        let sender = Account::from_seed(&[1; 32]);
        let receiver = Account::from_seed(&[2; 32]);

        let policy = SubmitPolicy {
            retries_before_rebuild: 2,
            retry_delay: Duration::ZERO,
            inter_submit_delay: Duration::ZERO,
        };
        for _ in 0..5 {
            ledger.inject_submit_fault("transient");
        }
        let signed = submit_with_retry(&ledger, &sender, &payment(&receiver), &policy)
            .await
            .unwrap();
        assert_eq!(ledger.lookup_by_id(&signed.id).await.unwrap().note, b"payload");
    }
}
