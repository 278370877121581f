//! Chain queries built on the ledger adapter: received transactions,
//! revision discovery and stream-end detection.

use notevault_ledger::{
    search_all, AddressRole, Address, Ledger, TransactionQuery, TransactionRecord,
};

use crate::error::Result;

/// Note content of a stream-end transaction.
pub const STOP_NOTE: &[u8] = b"stop";

/// All payments received at `receiver`, excluding the payload transaction,
/// in chronological order.
pub async fn received_transactions(
    ledger: &dyn Ledger,
    receiver: Address,
    exclude_id: &str,
    min_round: Option<u64>,
) -> Result<Vec<TransactionRecord>> {
    let query = TransactionQuery {
        address: Some(receiver),
        address_role: Some(AddressRole::Receiver),
        min_round,
        ..TransactionQuery::default()
    };
    let mut records = search_all(ledger, query).await?;
    records.retain(|t| t.id != exclude_id);
    Ok(records)
}

/// The most recent payment received at `receiver`, if any.
pub async fn last_received(
    ledger: &dyn Ledger,
    receiver: Address,
    exclude_id: &str,
) -> Result<Option<TransactionRecord>> {
    Ok(received_transactions(ledger, receiver, exclude_id, None)
        .await?
        .pop())
}

/// Validate a note as a revision tag, returning the new payload id.
///
/// A revision tag is a JSON object with exactly one key, `revision`, whose
/// value is a 52-character string. Anything else (extra keys, wrong value
/// length, non-JSON bytes) is ignored so user payloads cannot impersonate
/// revisions.
pub fn parse_revision_note(note: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(note).ok()?;
    let object = value.as_object()?;
    if object.len() != 1 {
        return None;
    }
    let revision = object.get("revision")?.as_str()?;
    if revision.len() != 52 {
        return None;
    }
    Some(revision.to_string())
}

/// Serialize a revision tag note for `new_payload_id`.
pub fn revision_note(new_payload_id: &str) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({ "revision": new_payload_id }))
        .expect("revision note serializes")
}

/// Revision payload ids posted against `payload`, oldest first.
///
/// Tags are payments from the payload's sender to its receiver carrying a
/// valid revision note.
pub async fn revision_ids(
    ledger: &dyn Ledger,
    payload: &TransactionRecord,
) -> Result<Vec<String>> {
    let received = received_transactions(ledger, payload.receiver, &payload.id, None).await?;
    Ok(received
        .iter()
        .filter(|t| t.sender == payload.sender)
        .filter_map(|t| parse_revision_note(&t.note))
        .collect())
}

/// The full revision chain for a payload: itself, then each revision.
pub async fn revision_chain(
    ledger: &dyn Ledger,
    payload: &TransactionRecord,
) -> Result<Vec<String>> {
    let mut chain = vec![payload.id.clone()];
    chain.extend(revision_ids(ledger, payload).await?);
    Ok(chain)
}

/// Whether a streamnote session at `receiver` has been finalized.
///
/// The stop transaction is self-sent by the receiver with a note whose raw
/// bytes equal `stop`.
pub async fn stream_stopped(ledger: &dyn Ledger, receiver: Address) -> Result<bool> {
    let query = TransactionQuery {
        address: Some(receiver),
        address_role: Some(AddressRole::Receiver),
        ..TransactionQuery::default()
    };
    let records = search_all(ledger, query).await?;
    Ok(records
        .iter()
        .any(|t| t.sender == receiver && t.note == STOP_NOTE))
}
