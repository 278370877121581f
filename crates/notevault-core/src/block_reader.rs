//! Blocknote reader: whole-payload reconstruction.

use std::sync::Arc;

use tracing::debug;

use notevault_codec::{Codec as _, CodecRegistry};
use notevault_crypto::{decrypt, derive_key, salt_from_base64, SealedBox, SymmetricKey};
use notevault_ledger::{Ledger, TransactionRecord};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::chunk::pack_chunks;
use crate::error::{CoreError, Result};
use crate::metadata::{PayloadMetadata, TitleField};
use crate::options::ReadOptions;
use crate::search::{received_transactions, revision_ids};

/// Outcome of a blocknote read.
#[derive(Clone, Debug)]
pub struct ReadResult {
    /// The payload transaction id that was actually read (after revision
    /// resolution).
    pub payload_transaction_id: String,
    /// The payload metadata, title decrypted when possible.
    pub metadata: PayloadMetadata,
    /// The reconstructed payload bytes.
    pub content: Vec<u8>,
}

/// Whole-payload reader.
pub struct BlocknoteReader {
    ledger: Arc<dyn Ledger>,
}

impl BlocknoteReader {
    /// Create a reader over `ledger`.
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self { ledger }
    }

    /// Read the payload stored under `payload_id`.
    ///
    /// Revision resolution: an explicit 1-based `revision` index picks that
    /// revision; otherwise the most recent revision wins, falling back to
    /// the payload itself when none exist.
    ///
    /// # Errors
    ///
    /// [`CoreError::MissingKey`] / [`CoreError::MissingPassword`] when the
    /// payload is encrypted and no material was supplied;
    /// [`CoreError::InvalidRevisionNumber`] for out-of-range revision
    /// indices; decrypt and decompress failures propagate.
    pub async fn read(&self, payload_id: &str, options: ReadOptions) -> Result<ReadResult> {
        let ledger = self.ledger.as_ref();

        let mut record = ledger.lookup_by_id(payload_id).await?;
        let mut metadata = PayloadMetadata::from_note_bytes(&record.note)?;

        // Resolve the revision chain before touching any data.
        let revisions = revision_ids(ledger, &record).await?;
        let resolved_id = match options.revision {
            Some(requested) => {
                if requested == 0 || requested > revisions.len() {
                    return Err(CoreError::InvalidRevisionNumber {
                        requested,
                        available: revisions.len(),
                    });
                }
                Some(revisions[requested - 1].clone())
            }
            None => revisions.last().cloned(),
        };
        if let Some(resolved) = resolved_id {
            if resolved != record.id {
                debug!(original = payload_id, resolved = %resolved, "following revision");
                record = ledger.lookup_by_id(&resolved).await?;
                metadata = PayloadMetadata::from_note_bytes(&record.note)?;
            }
        }

        let txns = metadata.txns.ok_or_else(|| {
            CoreError::MalformedMetadata("metadata has no data transaction count".to_string())
        })? as usize;

        // Collect the session's data transactions: received at the payload
        // receiver, sent by the sender or by the receiver itself (the close
        // record is self-sent). The first `txns` in chronological order are
        // the data set; anything later (revision tags, reuse) is ignored.
        let received =
            received_transactions(ledger, record.receiver, &record.id, None).await?;
        let data_notes: Vec<&TransactionRecord> = received
            .iter()
            .filter(|t| t.sender == record.sender || t.sender == record.receiver)
            .take(txns)
            .collect();
        if data_notes.len() < txns {
            return Err(CoreError::MissingChunk(data_notes.len() as u32));
        }

        let mut packed = pack_chunks(data_notes.iter().map(|t| t.note.as_slice()))?;

        if !options.return_raw {
            let key = self.resolve_key(&metadata, &options)?;

            if let (Some(iv), Some(tag)) = (&metadata.iv, &metadata.tag) {
                let key = key.as_ref().ok_or(CoreError::MissingKey)?;
                let sealed = SealedBox::from_parts(iv, tag, packed)?;
                packed = decrypt(key, &sealed)?;
            }

            if let Some(codec) = &metadata.compression {
                packed = CodecRegistry::create(codec)?.uncompress(&packed).await?;
            }

            if let TitleField::Encrypted { iv, tag, data } = &metadata.title {
                if let Some(key) = &key {
                    let ciphertext = BASE64
                        .decode(data)
                        .map_err(|e| CoreError::MalformedMetadata(e.to_string()))?;
                    let sealed = SealedBox::from_parts(iv, tag, ciphertext)?;
                    let title = decrypt(key, &sealed)?;
                    metadata.title =
                        TitleField::Plain(String::from_utf8_lossy(&title).into_owned());
                }
            }
        }

        Ok(ReadResult {
            payload_transaction_id: record.id,
            metadata,
            content: packed,
        })
    }

    /// Resolve the decryption key from metadata and reader options.
    fn resolve_key(
        &self,
        metadata: &PayloadMetadata,
        options: &ReadOptions,
    ) -> Result<Option<SymmetricKey>> {
        if let Some(salt) = &metadata.salt {
            let password = options
                .password
                .as_ref()
                .ok_or(CoreError::MissingPassword)?;
            let salt = salt_from_base64(salt)?;
            return Ok(Some(derive_key(password, &salt)));
        }
        if metadata.iv.is_some() && metadata.tag.is_some() {
            return match &options.aes_key {
                Some(key) => Ok(Some(key.clone())),
                None => Err(CoreError::MissingKey),
            };
        }
        Ok(options.aes_key.clone())
    }
}
