//! Streamnote writer: incremental upload with adaptive chunk packing.
//!
//! Data arrives in arbitrarily small pieces. Two background tasks turn the
//! rolling buffer into data transactions:
//!
//! - the **processor** speculatively compresses and encrypts a prefix of the
//!   buffer every tick, growing its slice (`extra_padding`, +50 per
//!   under-full tick) until the candidate hugs the 1024-byte note ceiling,
//!   shrinking one byte at a time when it overshoots. A candidate whose hash
//!   has not changed for the stall timeout is flushed as-is so low-entropy
//!   input never starves the chain.
//! - the **submitter** snapshots the outbound queue every tick and submits
//!   each chunk. Once the session is stopped and drained it posts the final
//!   `stop` transaction, self-sent by the receiver with close-remainder back
//!   to the sender.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::OsRng;
use rand::RngCore;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use notevault_codec::{Codec, CodecRegistry, RawContent};
use notevault_crypto::{
    derive_key, encrypt_with_derivation, generate_salt, salt_to_base64, sha256_hex, SymmetricKey,
};
use notevault_ledger::{wait_for_confirmation, Account, Ledger};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::block_writer::RECEIVER_FUNDING;
use crate::chunk::{frame_chunk, MAX_CHUNK_BYTES};
use crate::error::{CoreError, Result};
use crate::events::{EventSender, NoteEvent};
use crate::metadata::{PayloadMetadata, TitleField, STREAM_KIND};
use crate::options::StreamOptions;
use crate::search::STOP_NOTE;
use crate::submit::{submit_with_retry, NotePayment, SubmitPolicy};

/// Timing knobs for the background loops.
#[derive(Clone, Debug)]
pub struct StreamTuning {
    /// Processor tick.
    pub processor_interval: Duration,
    /// Submitter tick.
    pub submitter_interval: Duration,
    /// Flush an unchanged under-full candidate after this long.
    pub stall_timeout: Duration,
    /// Padding growth per under-full tick.
    pub padding_grow: i32,
    /// Sleep between shrink-search attempts.
    pub padding_search_delay: Duration,
}

impl Default for StreamTuning {
    fn default() -> Self {
        Self {
            processor_interval: Duration::from_millis(100),
            submitter_interval: Duration::from_secs(1),
            stall_timeout: Duration::from_millis(15_000),
            padding_grow: 50,
            padding_search_delay: Duration::from_millis(10),
        }
    }
}

/// Adaptive padding state, threaded through the processor explicitly.
#[derive(Debug, Default)]
struct PaddingState {
    /// Extra bytes past the note limit included in the speculative slice.
    extra: i32,
    /// Hash of the most recent candidate.
    last_hash: Option<String>,
    /// When the hash first stopped changing.
    stable_since: Option<Instant>,
}

impl PaddingState {
    /// Track the new candidate hash; returns how long it has been stable.
    fn observe(&mut self, hash: String, now: Instant) -> Duration {
        if self.last_hash.as_deref() == Some(hash.as_str()) {
            let since = *self.stable_since.get_or_insert(now);
            now.duration_since(since)
        } else {
            self.last_hash = Some(hash);
            self.stable_since = Some(now);
            Duration::ZERO
        }
    }

    fn reset(&mut self) {
        self.extra = 0;
        self.last_hash = None;
        self.stable_since = None;
    }
}

struct StreamState {
    content: Vec<u8>,
    counter: u32,
    padding: PaddingState,
    stop_requested: bool,
    drained: bool,
}

struct QueuedChunk {
    counter: u32,
    note: Vec<u8>,
}

struct Shared {
    state: Mutex<StreamState>,
    queue: Mutex<Vec<QueuedChunk>>,
}

/// Compression + encryption pipeline for one session.
struct ChunkPipeline {
    codec: Box<dyn Codec>,
    key: Option<SymmetricKey>,
    seed: Vec<u8>,
}

impl ChunkPipeline {
    /// Build the full data note for `slice` at `counter`.
    async fn candidate(&self, counter: u32, slice: &[u8]) -> Result<Vec<u8>> {
        let compressed = self
            .codec
            .compress(&RawContent::Bytes(slice.to_vec()))
            .await?;
        let processed = match &self.key {
            Some(key) => encrypt_with_derivation(key, &compressed, counter, &self.seed)?,
            None => compressed,
        };
        Ok(frame_chunk(counter, &processed))
    }
}

fn slice_len(content_len: usize, extra: i32) -> usize {
    let target = (MAX_CHUNK_BYTES as i64 + extra as i64).max(1) as usize;
    target.min(content_len)
}

struct Session {
    shared: Arc<Shared>,
    processor: JoinHandle<()>,
    submitter: JoinHandle<()>,
}

/// Incremental payload writer.
pub struct StreamnoteWriter {
    ledger: Arc<dyn Ledger>,
    sender_seed: String,
    options: StreamOptions,
    tuning: StreamTuning,
    policy: SubmitPolicy,
    events: EventSender,
    event_rx: Option<mpsc::Receiver<NoteEvent>>,
    session: Option<Session>,
    payload_id: Option<String>,
    finalized: bool,
}

impl StreamnoteWriter {
    /// Create a stream writer; the session opens on the first `save`.
    pub fn new(ledger: Arc<dyn Ledger>, sender_seed: impl Into<String>, options: StreamOptions) -> Self {
        Self::with_tuning(
            ledger,
            sender_seed,
            options,
            StreamTuning::default(),
            SubmitPolicy::default(),
        )
    }

    /// Create a stream writer with explicit timing and submit policy.
    pub fn with_tuning(
        ledger: Arc<dyn Ledger>,
        sender_seed: impl Into<String>,
        options: StreamOptions,
        tuning: StreamTuning,
        policy: SubmitPolicy,
    ) -> Self {
        let (events, event_rx) = EventSender::channel();
        Self {
            ledger,
            sender_seed: sender_seed.into(),
            options,
            tuning,
            policy,
            events,
            event_rx: Some(event_rx),
            session: None,
            payload_id: None,
            finalized: false,
        }
    }

    /// Take the event receiver.
    pub fn take_event_receiver(&mut self) -> Option<mpsc::Receiver<NoteEvent>> {
        self.event_rx.take()
    }

    /// The session's payload transaction id, once the first save opened it.
    pub fn payload_transaction_id(&self) -> Option<&str> {
        self.payload_id.as_deref()
    }

    /// Append bytes to the stream.
    ///
    /// The first call opens the session: it submits the metadata
    /// transaction and starts the background loops. Writes after `stop` are
    /// discarded.
    ///
    /// # Errors
    ///
    /// Session-open failures (missing sender, unknown codec, metadata
    /// submission) surface here.
    pub async fn save(&mut self, data: &[u8]) -> Result<()> {
        if self.finalized {
            self.events
                .emit_lossy(NoteEvent::Log("write after stop discarded".to_string()));
            return Ok(());
        }
        if self.session.is_none() {
            self.open_session().await?;
        }
        let shared = &self.session.as_ref().expect("session open").shared;
        let mut state = shared.state.lock().await;
        if state.stop_requested {
            self.events
                .emit_lossy(NoteEvent::Log("write after stop discarded".to_string()));
            return Ok(());
        }
        state.content.extend_from_slice(data);
        Ok(())
    }

    /// Stop the stream: flush the buffer, drain the queue, post the final
    /// `stop` transaction, and wait for both loops to finish.
    pub async fn stop(&mut self) -> Result<()> {
        self.finalized = true;
        let Some(session) = self.session.take() else {
            return Ok(());
        };
        {
            let mut state = session.shared.state.lock().await;
            state.stop_requested = true;
        }
        let _ = session.processor.await;
        let _ = session.submitter.await;
        Ok(())
    }

    async fn open_session(&mut self) -> Result<()> {
        if self.sender_seed.trim().is_empty() {
            return Err(CoreError::MissingSender);
        }
        let sender = Account::from_seed_hex(&self.sender_seed)?;
        let receiver = Account::generate();

        let codec_name = self.options.effective_compression().to_string();
        let codec = CodecRegistry::create(&codec_name)?;

        let mut metadata = PayloadMetadata::new(
            TitleField::Plain(self.options.title.clone().unwrap_or_default()),
            self.options
                .mime
                .clone()
                .unwrap_or_else(|| "application/octet-stream".to_string()),
        );
        metadata.kind = Some(STREAM_KIND.to_string());
        if codec_name != "none" {
            metadata.compression = Some(codec_name.clone());
        }

        // Key material: the password salt doubles as the IV seed; a raw key
        // gets a fresh random seed recorded in the metadata.
        let (key, seed) = if let Some(password) = &self.options.password {
            let salt = generate_salt();
            metadata.salt = Some(salt_to_base64(&salt));
            (Some(derive_key(password, &salt)), salt.to_vec())
        } else if let Some(key) = &self.options.aes_key {
            let mut seed = [0u8; 16];
            OsRng.fill_bytes(&mut seed);
            metadata.iv = Some(BASE64.encode(seed));
            (Some(key.clone()), seed.to_vec())
        } else {
            (None, Vec::new())
        };

        // Metadata transaction opens the session; confirmed before any data.
        let metadata_payment = NotePayment {
            receiver: receiver.address(),
            amount: RECEIVER_FUNDING,
            note: metadata.to_note_bytes()?,
            close_remainder_to: None,
        };
        let ledger = self.ledger.as_ref();
        let signed = submit_with_retry(ledger, &sender, &metadata_payment, &self.policy).await?;
        wait_for_confirmation(ledger, &signed).await?;
        let payload_id = signed.id.clone();
        info!(txid = %payload_id, codec = %codec_name, "stream session opened");
        self.events
            .emit(NoteEvent::PayloadTxId(payload_id.clone()))
            .await;
        self.payload_id = Some(payload_id);

        let shared = Arc::new(Shared {
            state: Mutex::new(StreamState {
                content: Vec::new(),
                counter: 0,
                padding: PaddingState::default(),
                stop_requested: false,
                drained: false,
            }),
            queue: Mutex::new(Vec::new()),
        });
        let pipeline = ChunkPipeline { codec, key, seed };

        let processor = tokio::spawn(run_processor(
            shared.clone(),
            pipeline,
            self.tuning.clone(),
            self.events.clone(),
        ));
        let submitter = tokio::spawn(run_submitter(
            shared.clone(),
            self.ledger.clone(),
            sender,
            receiver,
            self.tuning.clone(),
            self.policy.clone(),
            self.events.clone(),
        ));

        self.session = Some(Session {
            shared,
            processor,
            submitter,
        });
        Ok(())
    }
}

/// The processor loop: speculative chunking with adaptive padding.
async fn run_processor(
    shared: Arc<Shared>,
    pipeline: ChunkPipeline,
    tuning: StreamTuning,
    events: EventSender,
) {
    let mut ticker = tokio::time::interval(tuning.processor_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        match processor_step(&shared, &pipeline, &tuning, &events).await {
            Ok(true) => break,
            Ok(false) => {}
            Err(err) => {
                warn!(error = %err, "stream processor failed");
                events.emit(NoteEvent::Error(err.to_string())).await;
                let mut state = shared.state.lock().await;
                state.drained = true;
                break;
            }
        }
    }
}

/// One processor tick. Returns `true` when the stream is drained.
async fn processor_step(
    shared: &Shared,
    pipeline: &ChunkPipeline,
    tuning: &StreamTuning,
    events: &EventSender,
) -> Result<bool> {
    // Snapshot the prefix; the processor is the only consumer, and saves
    // only append, so the prefix stays valid after unlock.
    let (counter, slice, buffered, stop_requested, extra) = {
        let mut state = shared.state.lock().await;
        if state.content.is_empty() {
            if state.stop_requested {
                state.drained = true;
                return Ok(true);
            }
            return Ok(false);
        }
        let len = slice_len(state.content.len(), state.padding.extra);
        (
            state.counter,
            state.content[..len].to_vec(),
            state.content.len(),
            state.stop_requested,
            state.padding.extra,
        )
    };

    let candidate = pipeline.candidate(counter, &slice).await?;
    let hash = sha256_hex(&candidate);
    let now = Instant::now();

    // Stopping and everything left fits: emit one final chunk.
    if stop_requested && slice.len() == buffered && candidate.len() <= MAX_CHUNK_BYTES {
        enqueue(shared, counter, candidate, slice.len()).await;
        return Ok(false);
    }

    if candidate.len() < MAX_CHUNK_BYTES {
        let mut state = shared.state.lock().await;
        let stable_for = state.padding.observe(hash, now);
        events.emit_lossy(NoteEvent::Log(format!(
            "chunk {counter}: candidate {} bytes, padding {extra}, stalled {} ms",
            candidate.len(),
            stable_for.as_millis()
        )));
        if stable_for >= tuning.stall_timeout {
            // No further gain is coming; flush what we have.
            debug!(counter, size = candidate.len(), "stall timeout, flushing candidate");
            drop(state);
            enqueue(shared, counter, candidate, slice.len()).await;
        } else {
            state.padding.extra += tuning.padding_grow;
        }
        return Ok(false);
    }

    if candidate.len() == MAX_CHUNK_BYTES {
        enqueue(shared, counter, candidate, slice.len()).await;
        return Ok(false);
    }

    // Overshot: shrink one byte at a time until the candidate fits.
    let mut extra = extra;
    let mut used;
    let mut candidate = candidate;
    loop {
        extra -= 1;
        used = slice_len(buffered, extra);
        candidate = pipeline.candidate(counter, &slice[..used.min(slice.len())]).await?;
        if candidate.len() <= MAX_CHUNK_BYTES {
            break;
        }
        if !tuning.padding_search_delay.is_zero() {
            tokio::time::sleep(tuning.padding_search_delay).await;
        }
    }
    debug!(counter, size = candidate.len(), used, "chunk packed");
    enqueue(shared, counter, candidate, used).await;
    Ok(false)
}

/// Consume `used` buffer bytes, queue the note, advance the counter and
/// reset the padding tracker.
async fn enqueue(shared: &Shared, counter: u32, note: Vec<u8>, used: usize) {
    {
        let mut state = shared.state.lock().await;
        let drain_len = used.min(state.content.len());
        state.content.drain(..drain_len);
        state.counter = counter + 1;
        state.padding.reset();
    }
    let mut queue = shared.queue.lock().await;
    queue.push(QueuedChunk { counter, note });
}

/// The submitter loop: snapshot, submit, finalize.
#[allow(clippy::too_many_arguments)]
async fn run_submitter(
    shared: Arc<Shared>,
    ledger: Arc<dyn Ledger>,
    sender: Account,
    receiver: Account,
    tuning: StreamTuning,
    policy: SubmitPolicy,
    events: EventSender,
) {
    let mut ticker = tokio::time::interval(tuning.submitter_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;

        let batch: Vec<QueuedChunk> = {
            let mut queue = shared.queue.lock().await;
            std::mem::take(&mut *queue)
        };
        for chunk in batch {
            let payment = NotePayment {
                receiver: receiver.address(),
                amount: 0,
                note: chunk.note,
                close_remainder_to: None,
            };
            match submit_with_retry(ledger.as_ref(), &sender, &payment, &policy).await {
                Ok(signed) => {
                    debug!(counter = chunk.counter, txid = %signed.id, "chunk submitted");
                }
                Err(err) => {
                    warn!(counter = chunk.counter, error = %err, "chunk submission failed");
                    events.emit(NoteEvent::Error(err.to_string())).await;
                }
            }
            if !policy.inter_submit_delay.is_zero() {
                tokio::time::sleep(policy.inter_submit_delay).await;
            }
        }

        let drained = shared.state.lock().await.drained;
        let queue_empty = shared.queue.lock().await.is_empty();
        if drained && queue_empty {
            // Finalize: the stop transaction, self-sent by the receiver,
            // closing its remainder back to the sender.
            let stop_payment = NotePayment {
                receiver: receiver.address(),
                amount: 0,
                note: STOP_NOTE.to_vec(),
                close_remainder_to: Some(sender.address()),
            };
            match submit_with_retry(ledger.as_ref(), &receiver, &stop_payment, &policy).await {
                Ok(signed) => {
                    info!(txid = %signed.id, "stream finalized");
                    events
                        .emit(NoteEvent::Finish {
                            payload_transaction_id: None,
                        })
                        .await;
                }
                Err(err) => {
                    events.emit(NoteEvent::Error(err.to_string())).await;
                }
            }
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_len_bounds() {
        assert_eq!(slice_len(5000, 0), MAX_CHUNK_BYTES);
        assert_eq!(slice_len(5000, 100), MAX_CHUNK_BYTES + 100);
        assert_eq!(slice_len(10, 0), 10);
        // Negative padding can push the slice below the note size but never
        // to zero.
        assert_eq!(slice_len(5000, -(MAX_CHUNK_BYTES as i32) - 50), 1);
    }

    #[test]
    fn test_padding_observe_tracks_stability() {
        let mut padding = PaddingState::default();
        let t0 = Instant::now();
        assert_eq!(padding.observe("h1".to_string(), t0), Duration::ZERO);
        let t1 = t0 + Duration::from_millis(100);
        assert_eq!(
            padding.observe("h1".to_string(), t1),
            Duration::from_millis(100)
        );
        // A different hash resets the tracker.
        let t2 = t1 + Duration::from_millis(100);
        assert_eq!(padding.observe("h2".to_string(), t2), Duration::ZERO);
    }

    #[test]
    fn test_padding_reset() {
        let mut padding = PaddingState {
            extra: 150,
            last_hash: Some("h".to_string()),
            stable_since: Some(Instant::now()),
        };
        padding.reset();
        assert_eq!(padding.extra, 0);
        assert!(padding.last_hash.is_none());
        assert!(padding.stable_since.is_none());
    }
}
