//! Streamnote reader: historical replay plus continuous polling.
//!
//! Chunks may land on-chain (and come back from the indexer) out of order.
//! The reader holds them in a map keyed by counter and only emits the next
//! contiguous counter, so downstream consumers always see the stream in
//! order. Polling overlaps its round window to tolerate indexer lag, and a
//! session ends when the receiver's self-sent `stop` transaction appears.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info};

use notevault_codec::{Codec, CodecRegistry};
use notevault_crypto::{decrypt_with_derivation, derive_key, salt_from_base64, SymmetricKey};
use notevault_ledger::{Address, Ledger};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::chunk::split_counter;
use crate::error::{CoreError, Result};
use crate::events::{EventSender, NoteEvent};
use crate::metadata::PayloadMetadata;
use crate::options::ReadOptions;
use crate::search::{received_transactions, stream_stopped};

/// Timing knobs for the polling loop.
#[derive(Clone, Debug)]
pub struct StreamReadTuning {
    /// Delay between polls.
    pub poll_interval: Duration,
    /// Rounds of overlap when advancing the minimum-round window.
    pub round_overlap: u64,
}

impl Default for StreamReadTuning {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
            round_overlap: 10,
        }
    }
}

struct ReaderSession {
    sender: Address,
    receiver: Address,
    payload_id: String,
    codec: Box<dyn Codec>,
    key: Option<SymmetricKey>,
    seed: Vec<u8>,
    chunks: BTreeMap<u32, Vec<u8>>,
    seen: HashSet<String>,
    next_emit: u32,
    latest_round: u64,
}

/// Incremental payload reader.
pub struct StreamnoteReader {
    ledger: Arc<dyn Ledger>,
    options: ReadOptions,
    tuning: StreamReadTuning,
    events: EventSender,
    event_rx: Option<mpsc::Receiver<NoteEvent>>,
}

impl StreamnoteReader {
    /// Create a reader over `ledger`.
    pub fn new(ledger: Arc<dyn Ledger>, options: ReadOptions) -> Self {
        Self::with_tuning(ledger, options, StreamReadTuning::default())
    }

    /// Create a reader with explicit polling tuning.
    pub fn with_tuning(
        ledger: Arc<dyn Ledger>,
        options: ReadOptions,
        tuning: StreamReadTuning,
    ) -> Self {
        let (events, event_rx) = EventSender::channel();
        Self {
            ledger,
            options,
            tuning,
            events,
            event_rx: Some(event_rx),
        }
    }

    /// Take the event receiver; chunk bytes arrive as [`NoteEvent::Data`].
    pub fn take_event_receiver(&mut self) -> Option<mpsc::Receiver<NoteEvent>> {
        self.event_rx.take()
    }

    /// Follow the stream under `payload_id` until its stop transaction.
    ///
    /// Replays history first, then polls. Chunks are emitted in counter
    /// order through the event channel.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotAStream`] when the payload is not a stream session;
    /// key resolution and per-chunk decrypt/decompress failures propagate.
    pub async fn run(&self, payload_id: &str) -> Result<()> {
        let mut session = self.open_session(payload_id).await?;
        let ledger = self.ledger.as_ref();

        // Historical replay.
        let loaded = self.poll_once(&mut session, None).await?;
        self.consolidate(&mut session).await;

        // Nothing on-chain yet: wait for the first data transaction.
        if !loaded {
            loop {
                tokio::time::sleep(self.tuning.poll_interval).await;
                if self.poll_once(&mut session, None).await? {
                    self.consolidate(&mut session).await;
                    break;
                }
            }
        }

        // Continuous polling with a round-overlap window.
        loop {
            tokio::time::sleep(self.tuning.poll_interval).await;
            let min_round = session.latest_round.saturating_sub(self.tuning.round_overlap);
            let fresh = self.poll_once(&mut session, Some(min_round)).await?;
            self.consolidate(&mut session).await;

            if !fresh && stream_stopped(ledger, session.receiver).await? {
                // One last pass so nothing the final poll brought in is
                // left unemitted.
                self.consolidate(&mut session).await;
                info!(txid = %session.payload_id, "stream stop detected");
                self.events
                    .emit(NoteEvent::Finish {
                        payload_transaction_id: Some(session.payload_id.clone()),
                    })
                    .await;
                return Ok(());
            }
        }
    }

    /// Convenience: run the stream to completion and return the
    /// concatenation of every emitted chunk.
    pub async fn read_all(&mut self, payload_id: &str) -> Result<Vec<u8>> {
        let mut rx = self
            .take_event_receiver()
            .expect("event receiver already taken");
        let runner = self.run(payload_id);
        tokio::pin!(runner);

        let mut out = Vec::new();
        let mut done = false;
        loop {
            tokio::select! {
                result = &mut runner, if !done => {
                    result?;
                    done = true;
                }
                event = rx.recv() => match event {
                    Some(NoteEvent::Data { bytes, .. }) => out.extend_from_slice(&bytes),
                    Some(_) => {}
                    None => break,
                },
                else => break,
            }
            if done {
                // Drain whatever is still buffered in the channel.
                while let Ok(event) = rx.try_recv() {
                    if let NoteEvent::Data { bytes, .. } = event {
                        out.extend_from_slice(&bytes);
                    }
                }
                break;
            }
        }
        Ok(out)
    }

    async fn open_session(&self, payload_id: &str) -> Result<ReaderSession> {
        let record = self.ledger.lookup_by_id(payload_id).await?;
        let metadata = PayloadMetadata::from_note_bytes(&record.note)?;
        if !metadata.is_stream() {
            return Err(CoreError::NotAStream(payload_id.to_string()));
        }

        let codec =
            CodecRegistry::create(metadata.compression.as_deref().unwrap_or("none"))?;

        // Key and IV seed resolution mirrors the writer: the PBKDF2 salt is
        // the seed for password sessions, the recorded iv for raw keys.
        let (key, seed) = if let Some(salt_b64) = &metadata.salt {
            let password = self
                .options
                .password
                .as_ref()
                .ok_or(CoreError::MissingPassword)?;
            let salt = salt_from_base64(salt_b64)?;
            (Some(derive_key(password, &salt)), salt.to_vec())
        } else if let Some(iv_b64) = &metadata.iv {
            let key = self.options.aes_key.clone().ok_or(CoreError::MissingKey)?;
            let seed = BASE64
                .decode(iv_b64)
                .map_err(|e| CoreError::MalformedMetadata(e.to_string()))?;
            (Some(key), seed)
        } else {
            (None, Vec::new())
        };

        Ok(ReaderSession {
            sender: record.sender,
            receiver: record.receiver,
            payload_id: record.id,
            codec,
            key,
            seed,
            chunks: BTreeMap::new(),
            seen: HashSet::new(),
            next_emit: 0,
            latest_round: 0,
        })
    }

    /// Fold one query's worth of data transactions into the session.
    ///
    /// Returns whether any unseen data transaction arrived.
    async fn poll_once(
        &self,
        session: &mut ReaderSession,
        min_round: Option<u64>,
    ) -> Result<bool> {
        let received = received_transactions(
            self.ledger.as_ref(),
            session.receiver,
            &session.payload_id,
            min_round,
        )
        .await?;

        let mut fresh = false;
        for record in received {
            // Data transactions come from the session sender; the stop
            // transaction (self-sent) and foreign payments are not data.
            if record.sender != session.sender {
                continue;
            }
            if !session.seen.insert(record.id.clone()) {
                continue;
            }
            fresh = true;
            session.latest_round = session.latest_round.max(record.confirmed_round);

            let (counter, body) = split_counter(&record.note)?;
            let body = match &session.key {
                Some(key) => decrypt_with_derivation(key, body, counter, &session.seed)?,
                None => body.to_vec(),
            };
            let body = session.codec.uncompress(&body).await?;
            debug!(counter, size = body.len(), "chunk received");
            session.chunks.insert(counter, body);
        }
        Ok(fresh)
    }

    /// Emit every contiguous chunk starting at the seek pointer.
    async fn consolidate(&self, session: &mut ReaderSession) {
        while let Some(bytes) = session.chunks.remove(&session.next_emit) {
            let counter = session.next_emit;
            session.next_emit += 1;
            self.events.emit(NoteEvent::Data { counter, bytes }).await;
        }
    }
}
