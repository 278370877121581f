//! In-process ledger for tests and fee simulation.
//!
//! Implements the full [`Ledger`] contract against a vector of confirmed
//! transactions. Each submission confirms in the next round. Submit faults
//! can be injected to exercise retry paths.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{LedgerError, Result};
use crate::ledger::Ledger;
use crate::transaction::{
    AddressRole, PendingInfo, SignedTransaction, SuggestedParams, TransactionPage,
    TransactionQuery, TransactionRecord,
};

/// Default flat fee in micro-units.
pub const DEFAULT_MIN_FEE: u64 = 1000;

/// Default search page size.
const DEFAULT_PAGE_SIZE: usize = 100;

/// Validity window handed out by `suggested_params`.
const VALIDITY_WINDOW: u64 = 1000;

#[derive(Default)]
struct MemState {
    round: u64,
    log: Vec<TransactionRecord>,
    by_id: HashMap<String, usize>,
    submit_faults: VecDeque<String>,
}

/// An in-memory ledger.
pub struct MemoryLedger {
    min_fee: u64,
    genesis_id: String,
    state: Mutex<MemState>,
}

impl MemoryLedger {
    /// Create an empty ledger at round 1.
    pub fn new() -> Self {
        Self {
            min_fee: DEFAULT_MIN_FEE,
            genesis_id: "memnet-v1".to_string(),
            state: Mutex::new(MemState {
                round: 1,
                ..MemState::default()
            }),
        }
    }

    /// Queue an error message to be returned by the next submission.
    ///
    /// Faults are consumed in order, one per `submit` call.
    pub fn inject_submit_fault(&self, message: impl Into<String>) {
        self.state
            .lock()
            .unwrap()
            .submit_faults
            .push_back(message.into());
    }

    /// Snapshot of every confirmed transaction, chronological.
    pub fn records(&self) -> Vec<TransactionRecord> {
        self.state.lock().unwrap().log.clone()
    }

    /// Number of confirmed transactions.
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().log.len()
    }

    /// Whether no transaction has been confirmed yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn suggested_params(&self) -> Result<SuggestedParams> {
        let state = self.state.lock().unwrap();
        Ok(SuggestedParams {
            fee: self.min_fee,
            min_fee: self.min_fee,
            first_valid: state.round,
            last_valid: state.round + VALIDITY_WINDOW,
            genesis_id: self.genesis_id.clone(),
        })
    }

    async fn submit(&self, signed: &SignedTransaction) -> Result<()> {
        let mut state = self.state.lock().unwrap();

        if let Some(message) = state.submit_faults.pop_front() {
            return Err(LedgerError::Api {
                status: 400,
                message,
            });
        }

        if state.by_id.contains_key(&signed.id) {
            return Err(LedgerError::Api {
                status: 400,
                message: "TransactionPool.Remember: transaction already in ledger".to_string(),
            });
        }

        state.round += 1;
        let confirmed_round = state.round;
        let intra = state
            .log
            .iter()
            .rev()
            .take_while(|t| t.confirmed_round == confirmed_round)
            .count() as u64;
        let record = TransactionRecord {
            id: signed.id.clone(),
            sender: signed.transaction.sender,
            receiver: signed.transaction.receiver,
            amount: signed.transaction.amount,
            note: signed.transaction.note.clone(),
            close_remainder_to: signed.transaction.close_remainder_to,
            confirmed_round,
            intra_round_offset: intra,
        };
        state.log.push(record);
        let index = state.log.len() - 1;
        state.by_id.insert(signed.id.clone(), index);
        Ok(())
    }

    async fn pending_info(&self, txid: &str) -> Result<PendingInfo> {
        let state = self.state.lock().unwrap();
        match state.by_id.get(txid) {
            Some(&index) => Ok(PendingInfo {
                confirmed_round: Some(state.log[index].confirmed_round),
                pool_error: String::new(),
            }),
            None => Ok(PendingInfo::default()),
        }
    }

    async fn current_round(&self) -> Result<u64> {
        Ok(self.state.lock().unwrap().round)
    }

    async fn wait_for_round_after(&self, round: u64) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        if state.round <= round {
            state.round = round + 1;
        }
        Ok(state.round)
    }

    async fn lookup_by_id(&self, txid: &str) -> Result<TransactionRecord> {
        let state = self.state.lock().unwrap();
        state
            .by_id
            .get(txid)
            .map(|&index| state.log[index].clone())
            .ok_or_else(|| LedgerError::NotFound(txid.to_string()))
    }

    async fn search(&self, query: &TransactionQuery) -> Result<TransactionPage> {
        let state = self.state.lock().unwrap();

        let matches: Vec<&TransactionRecord> = state
            .log
            .iter()
            .filter(|t| match (query.address, query.address_role) {
                (Some(addr), Some(AddressRole::Sender)) => t.sender == addr,
                (Some(addr), Some(AddressRole::Receiver)) => {
                    t.receiver == addr || t.close_remainder_to == Some(addr)
                }
                (Some(addr), None) => {
                    t.sender == addr
                        || t.receiver == addr
                        || t.close_remainder_to == Some(addr)
                }
                (None, _) => true,
            })
            .filter(|t| query.min_round.map_or(true, |m| t.confirmed_round >= m))
            .collect();

        let offset: usize = query
            .next
            .as_deref()
            .map(|t| t.parse().map_err(|_| LedgerError::Decode(t.to_string())))
            .transpose()?
            .unwrap_or(0);
        let limit = if query.limit == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            query.limit
        };

        let page: Vec<TransactionRecord> = matches
            .iter()
            .skip(offset)
            .take(limit)
            .map(|t| (*t).clone())
            .collect();
        let consumed = offset + page.len();
        let next = (consumed < matches.len()).then(|| consumed.to_string());

        Ok(TransactionPage {
            transactions: page,
            next,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::Account;
    use crate::ledger::{search_all, wait_for_confirmation};
    use crate::transaction::PaymentTransaction;

    async fn submit_payment(
        ledger: &MemoryLedger,
        sender: &Account,
        receiver: &Account,
        note: &[u8],
    ) -> SignedTransaction {
        let params = ledger.suggested_params().await.unwrap();
        let txn = PaymentTransaction::build(
            sender.address(),
            receiver.address(),
            0,
            note.to_vec(),
            None,
            &params,
        );
        let signed = txn.sign(sender);
        ledger.submit(&signed).await.unwrap();
        signed
    }

    #[tokio::test]
    async fn test_submit_and_lookup() {
        let ledger = MemoryLedger::new();
        let sender = Account::from_seed(&[1; 32]);
        let receiver = Account::from_seed(&[2; 32]);

        let signed = submit_payment(&ledger, &sender, &receiver, b"hello").await;
        let record = ledger.lookup_by_id(&signed.id).await.unwrap();
        assert_eq!(record.note, b"hello");
        assert_eq!(record.sender, sender.address());
    }

    #[tokio::test]
    async fn test_duplicate_submit_reports_already_in_ledger() {
        let ledger = MemoryLedger::new();
        let sender = Account::from_seed(&[1; 32]);
        let receiver = Account::from_seed(&[2; 32]);

        let signed = submit_payment(&ledger, &sender, &receiver, b"once").await;
        let err = ledger.submit(&signed).await.unwrap_err();
        assert!(err.is_already_in_ledger());
    }

    #[tokio::test]
    async fn test_injected_fault_then_success() {
        let ledger = MemoryLedger::new();
        let sender = Account::from_seed(&[1; 32]);
        let receiver = Account::from_seed(&[2; 32]);

        ledger.inject_submit_fault("connection reset");
        let params = ledger.suggested_params().await.unwrap();
        let signed = PaymentTransaction::build(
            sender.address(),
            receiver.address(),
            0,
            b"retry me".to_vec(),
            None,
            &params,
        )
        .sign(&sender);

        assert!(ledger.submit(&signed).await.is_err());
        ledger.submit(&signed).await.unwrap();
        assert_eq!(ledger.len(), 1);
    }

    #[tokio::test]
    async fn test_wait_for_confirmation_executes() {
        let ledger = MemoryLedger::new();
        let sender = Account::from_seed(&[1; 32]);
        let receiver = Account::from_seed(&[2; 32]);

        let signed = submit_payment(&ledger, &sender, &receiver, b"x").await;
        let round = wait_for_confirmation(&ledger, &signed).await.unwrap();
        assert!(round > 0);
    }

    #[tokio::test]
    async fn test_wait_for_confirmation_expires() {
        let ledger = MemoryLedger::new();
        let sender = Account::from_seed(&[1; 32]);
        let receiver = Account::from_seed(&[2; 32]);

        let params = ledger.suggested_params().await.unwrap();
        let signed = PaymentTransaction::build(
            sender.address(),
            receiver.address(),
            0,
            b"never submitted".to_vec(),
            None,
            &params,
        )
        .sign(&sender);

        let err = wait_for_confirmation(&ledger, &signed).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::SubmitFailed(crate::error::SubmitErrorKind::Expired)
        ));
    }

    #[tokio::test]
    async fn test_search_filters_by_receiver() {
        let ledger = MemoryLedger::new();
        let sender = Account::from_seed(&[1; 32]);
        let receiver_a = Account::from_seed(&[2; 32]);
        let receiver_b = Account::from_seed(&[3; 32]);

        submit_payment(&ledger, &sender, &receiver_a, b"a1").await;
        submit_payment(&ledger, &sender, &receiver_b, b"b1").await;
        submit_payment(&ledger, &sender, &receiver_a, b"a2").await;

        let results = search_all(
            &ledger,
            TransactionQuery {
                address: Some(receiver_a.address()),
                address_role: Some(AddressRole::Receiver),
                ..TransactionQuery::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].note, b"a1");
        assert_eq!(results[1].note, b"a2");
    }

    #[tokio::test]
    async fn test_search_min_round() {
        let ledger = MemoryLedger::new();
        let sender = Account::from_seed(&[1; 32]);
        let receiver = Account::from_seed(&[2; 32]);

        submit_payment(&ledger, &sender, &receiver, b"old").await;
        let cutoff = ledger.current_round().await.unwrap();
        submit_payment(&ledger, &sender, &receiver, b"new").await;

        let results = search_all(
            &ledger,
            TransactionQuery {
                address: Some(receiver.address()),
                address_role: Some(AddressRole::Receiver),
                min_round: Some(cutoff + 1),
                ..TransactionQuery::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].note, b"new");
    }

    #[tokio::test]
    async fn test_search_pagination() {
        let ledger = MemoryLedger::new();
        let sender = Account::from_seed(&[1; 32]);
        let receiver = Account::from_seed(&[2; 32]);

        for i in 0..7u8 {
            submit_payment(&ledger, &sender, &receiver, &[i]).await;
        }

        let query = TransactionQuery {
            address: Some(receiver.address()),
            address_role: Some(AddressRole::Receiver),
            limit: 3,
            ..TransactionQuery::default()
        };
        let first = ledger.search(&query).await.unwrap();
        assert_eq!(first.transactions.len(), 3);
        assert!(first.next.is_some());

        let all = search_all(&ledger, query).await.unwrap();
        assert_eq!(all.len(), 7);
        let notes: Vec<u8> = all.iter().map(|t| t.note[0]).collect();
        assert_eq!(notes, vec![0, 1, 2, 3, 4, 5, 6]);
    }
}
