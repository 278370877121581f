//! Writer and reader event channel.
//!
//! Writers and readers report through a bounded channel with a fixed event
//! set instead of user-supplied callbacks, so consumer code can never run
//! inside the transport's loops. Progress and log events are lossy when the
//! consumer lags; semantic events (data, payload id, finish, error) always
//! wait for channel capacity.

use tokio::sync::mpsc;

/// Bounded capacity of an event channel.
pub const EVENT_CHANNEL_SIZE: usize = 64;

/// Everything a writer or reader reports while running.
#[derive(Clone, Debug)]
pub enum NoteEvent {
    /// Submission progress: transactions done out of total.
    Progress {
        /// Transactions submitted so far.
        current: u32,
        /// Total transactions in this session.
        total: u32,
    },
    /// Free-form diagnostic line.
    Log(String),
    /// The session's payload transaction id, once known.
    PayloadTxId(String),
    /// One reassembled chunk, emitted in counter order (readers).
    Data {
        /// Chunk counter.
        counter: u32,
        /// Decrypted, decompressed chunk bytes.
        bytes: Vec<u8>,
    },
    /// The session completed.
    Finish {
        /// Payload transaction id; absent for simulations.
        payload_transaction_id: Option<String>,
    },
    /// A terminal failure for one transaction or for the session.
    Error(String),
}

/// Sending half of an event channel.
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::Sender<NoteEvent>,
}

impl EventSender {
    /// Create a bounded event channel.
    pub fn channel() -> (Self, mpsc::Receiver<NoteEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
        (Self { tx }, rx)
    }

    /// Emit a semantic event, waiting for capacity.
    ///
    /// A dropped receiver is not an error; the event is discarded.
    pub async fn emit(&self, event: NoteEvent) {
        let _ = self.tx.send(event).await;
    }

    /// Emit a lossy event (progress, log); dropped when the channel is full.
    pub fn emit_lossy(&self, event: NoteEvent) {
        let _ = self.tx.try_send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_delivers() {
        let (tx, mut rx) = EventSender::channel();
        tx.emit(NoteEvent::PayloadTxId("ID".to_string())).await;
        match rx.recv().await.unwrap() {
            NoteEvent::PayloadTxId(id) => assert_eq!(id, "ID"),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_emit_lossy_drops_when_full() {
        let (tx, mut rx) = EventSender::channel();
        for i in 0..EVENT_CHANNEL_SIZE + 10 {
            tx.emit_lossy(NoteEvent::Log(format!("line {i}")));
        }
        let mut received = 0;
        while rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, EVENT_CHANNEL_SIZE);
    }

    #[tokio::test]
    async fn test_emit_survives_dropped_receiver() {
        let (tx, rx) = EventSender::channel();
        drop(rx);
        tx.emit(NoteEvent::Finish {
            payload_transaction_id: None,
        })
        .await;
    }
}
