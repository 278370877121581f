//! Blocknote writer: one-shot payload upload.
//!
//! A save produces one metadata transaction (its id names the payload), N
//! data transactions carrying counter-prefixed chunks, and, for revisions, a
//! revision-tag transaction plus a close for the tag address.
//!
//! Submission order is fixed: the metadata transaction is confirmed before
//! any data goes out, and the close record (the chunk with the largest
//! counter, self-sent by the receiver with close-remainder back to the
//! sender) is always the last transaction on-chain.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::Rng;
use tokio::sync::mpsc;
use tracing::{debug, info};

use notevault_codec::{CodecRegistry, RawContent};
use notevault_crypto::{
    derive_key, encrypt, generate_salt, salt_to_base64, SymmetricKey,
};
use notevault_ledger::{wait_for_confirmation, Account, Ledger};

use crate::chunk::frame_chunks;
use crate::error::{CoreError, Result};
use crate::events::{EventSender, NoteEvent};
use crate::metadata::{PayloadMetadata, TitleField};
use crate::options::SaveOptions;
use crate::search::revision_note;
use crate::submit::{submit_with_retry, NotePayment, SubmitPolicy};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

/// Micro-units sent with the metadata transaction so the receiver can pay
/// the close record's fee and its minimum balance.
pub const RECEIVER_FUNDING: u64 = 200_000;

/// HD indices are drawn from `[0, 2^31)`.
const HD_INDEX_RANGE: u32 = 1 << 31;

/// Outcome of a blocknote save.
#[derive(Clone, Debug)]
pub struct SaveResult {
    /// The payload transaction id; absent for simulations.
    pub payload_transaction_id: Option<String>,
    /// Total fees paid (or simulated) in micro-units.
    pub fees: u64,
    /// Codec that was used.
    pub compression: String,
    /// When the save started.
    pub start: DateTime<Utc>,
    /// When the save finished.
    pub end: DateTime<Utc>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: i64,
    /// Whether this was a simulation.
    pub simulation: bool,
    /// The metadata record that was (or would have been) stored.
    pub metadata: PayloadMetadata,
}

/// One-shot payload writer.
pub struct BlocknoteWriter {
    ledger: Arc<dyn Ledger>,
    policy: SubmitPolicy,
    events: EventSender,
    event_rx: Option<mpsc::Receiver<NoteEvent>>,
}

impl BlocknoteWriter {
    /// Create a writer over `ledger` with the default submit policy.
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self::with_policy(ledger, SubmitPolicy::default())
    }

    /// Create a writer with an explicit submit policy.
    pub fn with_policy(ledger: Arc<dyn Ledger>, policy: SubmitPolicy) -> Self {
        let (events, event_rx) = EventSender::channel();
        Self {
            ledger,
            policy,
            events,
            event_rx: Some(event_rx),
        }
    }

    /// Take the event receiver. Events are dropped once taken and unread.
    pub fn take_event_receiver(&mut self) -> Option<mpsc::Receiver<NoteEvent>> {
        self.event_rx.take()
    }

    /// Store `content` on-chain.
    ///
    /// # Errors
    ///
    /// Validation errors ([`CoreError::MissingSender`],
    /// [`CoreError::PayloadTooLarge`],
    /// [`CoreError::RevisionOwnershipMismatch`]) surface before anything is
    /// submitted. Submission errors are retried per the policy; an expired
    /// transaction is reported through the event channel and returned after
    /// the rest of the batch has been attempted.
    pub async fn save(
        &self,
        sender_seed: &str,
        content: RawContent,
        options: SaveOptions,
    ) -> Result<SaveResult> {
        let start = Utc::now();

        if sender_seed.trim().is_empty() {
            return Err(CoreError::MissingSender);
        }
        let sender = Account::from_seed_hex(sender_seed)?;

        // Revision target must exist and belong to this sender before any
        // work is done.
        let revision_target = match &options.revision_of {
            Some(original_id) => {
                let record = self.ledger.lookup_by_id(original_id).await?;
                if record.sender != sender.address() {
                    return Err(CoreError::RevisionOwnershipMismatch);
                }
                let original = PayloadMetadata::from_note_bytes(&record.note)?;
                Some(original)
            }
            None => None,
        };

        // Codec selection and compression.
        let compressed =
            CodecRegistry::select_and_compress(&options.compression, &content).await?;
        debug!(
            codec = compressed.codec,
            original = content.len(),
            compressed = compressed.data.len(),
            "codec selected"
        );

        // Fresh HD receiver for this session.
        let (accid, addid) = {
            let mut rng = rand::thread_rng();
            (
                rng.gen_range(0..HD_INDEX_RANGE),
                rng.gen_range(0..HD_INDEX_RANGE),
            )
        };
        let receiver = sender.derive_child(accid, addid);

        let title = options.title.clone().unwrap_or_default();
        let mut metadata = PayloadMetadata::new(
            TitleField::Plain(title.clone()),
            options.effective_mime(&content),
        );
        metadata.size = Some(content.len() as u64);
        metadata.addid = Some(addid);
        metadata.accid = Some(accid);
        if compressed.codec != "none" {
            metadata.compression = Some(compressed.codec.to_string());
        }

        // Key material: password derivation first, then AEAD over the
        // compressed bytes.
        let mut body = compressed.data;
        let mut aes_key: Option<SymmetricKey> = options.aes_key.clone();
        if let Some(password) = &options.password {
            let salt = generate_salt();
            metadata.salt = Some(salt_to_base64(&salt));
            aes_key = Some(derive_key(password, &salt));
        }
        if let Some(key) = &aes_key {
            let sealed = encrypt(key, &body)?;
            metadata.iv = Some(sealed.iv_base64());
            metadata.tag = Some(sealed.tag_base64());
            body = sealed.data;

            if options.effective_encrypt_title() {
                let sealed_title = encrypt(key, title.as_bytes())?;
                metadata.title = TitleField::Encrypted {
                    iv: sealed_title.iv_base64(),
                    tag: sealed_title.tag_base64(),
                    data: BASE64.encode(&sealed_title.data),
                };
            }
        }

        let chunks = frame_chunks(&body);
        metadata.txns = Some(chunks.len() as u32);
        let metadata_note = metadata.to_note_bytes()?;

        let result = if options.simulate {
            self.simulate(&chunks, revision_target.is_some()).await?
        } else {
            self.submit_session(
                &sender,
                &receiver,
                metadata_note,
                &chunks,
                revision_target.as_ref(),
            )
            .await?
        };

        let end = Utc::now();
        let save_result = SaveResult {
            payload_transaction_id: result.payload_id.clone(),
            fees: result.fees,
            compression: compressed.codec.to_string(),
            start,
            end,
            duration_ms: (end - start).num_milliseconds(),
            simulation: options.simulate,
            metadata,
        };

        self.events
            .emit(NoteEvent::Finish {
                payload_transaction_id: result.payload_id,
            })
            .await;

        match result.first_error {
            Some(err) => Err(err),
            None => Ok(save_result),
        }
    }
}

struct SessionOutcome {
    payload_id: Option<String>,
    fees: u64,
    first_error: Option<CoreError>,
}

impl BlocknoteWriter {
    async fn simulate(&self, chunks: &[Vec<u8>], is_revision: bool) -> Result<SessionOutcome> {
        let params = self.ledger.suggested_params().await?;
        // Metadata + every chunk, plus the tag pair for revisions.
        let mut count = 1 + chunks.len() as u64;
        if is_revision {
            count += 2;
        }
        Ok(SessionOutcome {
            payload_id: None,
            fees: count * params.min_fee,
            first_error: None,
        })
    }

    async fn submit_session(
        &self,
        sender: &Account,
        receiver: &Account,
        metadata_note: Vec<u8>,
        chunks: &[Vec<u8>],
        revision_target: Option<&PayloadMetadata>,
    ) -> Result<SessionOutcome> {
        let ledger = self.ledger.as_ref();
        let mut fees: u64 = 0;
        let mut first_error: Option<CoreError> = None;
        let total = chunks.len() as u32 + 1;

        // Metadata first; its id is the payload id, and it must be
        // confirmed before any data transaction goes out.
        let metadata_payment = NotePayment {
            receiver: receiver.address(),
            amount: RECEIVER_FUNDING,
            note: metadata_note,
            close_remainder_to: None,
        };
        let metadata_signed =
            submit_with_retry(ledger, sender, &metadata_payment, &self.policy).await?;
        wait_for_confirmation(ledger, &metadata_signed).await?;
        fees += metadata_signed.fee();
        let payload_id = metadata_signed.id.clone();
        info!(txid = %payload_id, chunks = chunks.len(), "payload transaction confirmed");
        self.events
            .emit(NoteEvent::PayloadTxId(payload_id.clone()))
            .await;
        self.events
            .emit_lossy(NoteEvent::Progress { current: 1, total });

        // All chunks but the last, sender to receiver.
        let (close_chunk, body_chunks) = chunks.split_last().expect("at least one chunk");
        for (index, chunk) in body_chunks.iter().enumerate() {
            let payment = NotePayment {
                receiver: receiver.address(),
                amount: 0,
                note: chunk.clone(),
                close_remainder_to: None,
            };
            match submit_with_retry(ledger, sender, &payment, &self.policy).await {
                Ok(signed) => fees += signed.fee(),
                Err(err) => {
                    // Terminal for this transaction only; the rest of the
                    // batch keeps going.
                    self.events.emit(NoteEvent::Error(err.to_string())).await;
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }
            self.events.emit_lossy(NoteEvent::Progress {
                current: index as u32 + 2,
                total,
            });
            if !self.policy.inter_submit_delay.is_zero() {
                tokio::time::sleep(self.policy.inter_submit_delay).await;
            }
        }

        // The close record goes last: self-sent by the receiver, closing its
        // remainder back to the sender.
        let close_payment = NotePayment {
            receiver: receiver.address(),
            amount: 0,
            note: close_chunk.clone(),
            close_remainder_to: Some(sender.address()),
        };
        match submit_with_retry(ledger, receiver, &close_payment, &self.policy).await {
            Ok(signed) => fees += signed.fee(),
            Err(err) => {
                self.events.emit(NoteEvent::Error(err.to_string())).await;
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
        self.events.emit_lossy(NoteEvent::Progress {
            current: total,
            total,
        });

        // Revision tag pair, linking the original payload to this one.
        if let Some(original) = revision_target {
            fees += self
                .submit_revision_tag(sender, original, &payload_id)
                .await?;
        }

        Ok(SessionOutcome {
            payload_id: Some(payload_id),
            fees,
            first_error,
        })
    }

    /// Post the revision tag on the original receiver, then close that
    /// address back down.
    async fn submit_revision_tag(
        &self,
        sender: &Account,
        original: &PayloadMetadata,
        new_payload_id: &str,
    ) -> Result<u64> {
        let (accid, addid) = match (original.accid, original.addid) {
            (Some(accid), Some(addid)) => (accid, addid),
            _ => {
                return Err(CoreError::MalformedMetadata(
                    "original payload has no receiver derivation indices".to_string(),
                ))
            }
        };
        let original_receiver = sender.derive_child(accid, addid);
        let ledger = self.ledger.as_ref();
        let mut fees = 0;

        let tag_payment = NotePayment {
            receiver: original_receiver.address(),
            amount: 0,
            note: revision_note(new_payload_id),
            close_remainder_to: None,
        };
        let signed = submit_with_retry(ledger, sender, &tag_payment, &self.policy).await?;
        fees += signed.fee();
        debug!(txid = %signed.id, revision = new_payload_id, "revision tag submitted");

        let close_payment = NotePayment {
            receiver: original_receiver.address(),
            amount: 0,
            note: Vec::new(),
            close_remainder_to: Some(sender.address()),
        };
        let signed =
            submit_with_retry(ledger, &original_receiver, &close_payment, &self.policy).await?;
        fees += signed.fee();

        Ok(fees)
    }
}
