//! The notevault payload transport.
//!
//! Arbitrary byte payloads are stored durably inside the note fields of
//! ordinary payment transactions: chunked under the 1024-byte note limit,
//! compressed, optionally encrypted, and reassembled by counter on read.
//!
//! Two write paths exist:
//!
//! - [`BlocknoteWriter`]: the whole payload is known up front and goes out
//!   as one metadata transaction plus a complete set of data transactions.
//! - [`StreamnoteWriter`]: data is produced incrementally; a processor
//!   loop packs the rolling buffer into note-sized chunks with adaptive
//!   padding, and a submitter loop ships them.
//!
//! Reading mirrors writing: [`BlocknoteReader`] collects exactly the
//! metadata-declared number of data transactions and reverses the pipeline;
//! [`StreamnoteReader`] replays history and polls, emitting chunks in
//! counter order until the stream's stop transaction appears.

pub mod block_reader;
pub mod block_writer;
pub mod chunk;
pub mod error;
pub mod events;
pub mod metadata;
pub mod options;
pub mod search;
pub mod stream_reader;
pub mod stream_writer;
pub mod submit;

pub use block_reader::{BlocknoteReader, ReadResult};
pub use block_writer::{BlocknoteWriter, SaveResult, RECEIVER_FUNDING};
pub use chunk::{
    frame_chunk, frame_chunks, pack_chunks, split_counter, COUNTER_SIZE, MAX_CHUNK_BYTES,
    MAX_CHUNK_PAYLOAD,
};
pub use error::{CoreError, Result};
pub use events::{EventSender, NoteEvent, EVENT_CHANNEL_SIZE};
pub use metadata::{PayloadMetadata, TitleField, FORMAT_VERSION, MAX_METADATA_SIZE, STREAM_KIND};
pub use options::{ReadOptions, SaveOptions, StreamOptions};
pub use search::{
    last_received, parse_revision_note, received_transactions, revision_chain, revision_ids,
    revision_note, stream_stopped, STOP_NOTE,
};
pub use stream_reader::{StreamReadTuning, StreamnoteReader};
pub use stream_writer::{StreamTuning, StreamnoteWriter};
pub use submit::{submit_with_retry, NotePayment, SubmitPolicy};
