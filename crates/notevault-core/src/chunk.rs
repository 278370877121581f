//! Data-note framing and reassembly.
//!
//! Every data note is `uint32_le(counter) || chunk bytes`, at most 1024
//! bytes in total, with counters dense and increasing from zero. The framing
//! loop prepends the counter first and then slices up to the note limit, so
//! each chunk carries at most 1020 payload bytes; readers rely on that
//! structure to find counter boundaries.

use std::collections::BTreeMap;

use crate::error::{CoreError, Result};

/// Size of the little-endian counter prefix.
pub const COUNTER_SIZE: usize = 4;

/// Maximum size of a whole data note.
pub const MAX_CHUNK_BYTES: usize = 1024;

/// Maximum payload bytes per chunk after the counter prefix.
pub const MAX_CHUNK_PAYLOAD: usize = MAX_CHUNK_BYTES - COUNTER_SIZE;

/// Frame a single chunk: counter prefix plus payload.
pub fn frame_chunk(counter: u32, payload: &[u8]) -> Vec<u8> {
    let mut note = Vec::with_capacity(COUNTER_SIZE + payload.len());
    note.extend_from_slice(&counter.to_le_bytes());
    note.extend_from_slice(payload);
    note
}

/// Split a data note into its counter and payload.
///
/// # Errors
///
/// Returns [`CoreError::MalformedDataNote`] if the note is shorter than the
/// counter prefix.
pub fn split_counter(note: &[u8]) -> Result<(u32, &[u8])> {
    if note.len() < COUNTER_SIZE {
        return Err(CoreError::MalformedDataNote(format!(
            "{} bytes, need at least {COUNTER_SIZE}",
            note.len()
        )));
    }
    let counter = u32::from_le_bytes([note[0], note[1], note[2], note[3]]);
    Ok((counter, &note[COUNTER_SIZE..]))
}

/// Frame a whole payload into data notes.
///
/// Repeatedly prepends the next counter and takes up to
/// [`MAX_CHUNK_BYTES`]; an empty payload still produces one (empty) chunk
/// so every session has a close record.
pub fn frame_chunks(data: &[u8]) -> Vec<Vec<u8>> {
    let mut notes = Vec::with_capacity(data.len() / MAX_CHUNK_PAYLOAD + 1);
    let mut rest = data;
    let mut counter: u32 = 0;
    loop {
        let take = rest.len().min(MAX_CHUNK_PAYLOAD);
        notes.push(frame_chunk(counter, &rest[..take]));
        rest = &rest[take..];
        counter += 1;
        if rest.is_empty() {
            break;
        }
    }
    notes
}

/// Reassemble data notes into the original byte sequence.
///
/// Notes may arrive in any order; counters must be exactly
/// `{0, 1, …, n-1}`.
///
/// # Errors
///
/// Returns [`CoreError::DuplicateChunk`] or [`CoreError::MissingChunk`] when
/// the counter set is not dense, and [`CoreError::MalformedDataNote`] for
/// notes without a counter.
pub fn pack_chunks<'a, I>(notes: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut by_counter: BTreeMap<u32, &[u8]> = BTreeMap::new();
    for note in notes {
        let (counter, payload) = split_counter(note)?;
        if by_counter.insert(counter, payload).is_some() {
            return Err(CoreError::DuplicateChunk(counter));
        }
    }

    let mut packed = Vec::with_capacity(by_counter.values().map(|p| p.len()).sum());
    for (expected, (counter, payload)) in by_counter.iter().enumerate() {
        if *counter != expected as u32 {
            return Err(CoreError::MissingChunk(expected as u32));
        }
        packed.extend_from_slice(payload);
    }
    Ok(packed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_single_small_chunk() {
        let notes = frame_chunks(b"hi");
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0], vec![0x00, 0x00, 0x00, 0x00, 0x68, 0x69]);
    }

    #[test]
    fn test_frame_empty_payload_yields_one_chunk() {
        let notes = frame_chunks(b"");
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0], vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_every_note_within_limit() {
        let data = vec![0xABu8; 5000];
        for note in frame_chunks(&data) {
            assert!(note.len() <= MAX_CHUNK_BYTES);
        }
    }

    #[test]
    fn test_chunk_count_matches_payload_budget() {
        let data = vec![1u8; 5000];
        let notes = frame_chunks(&data);
        assert_eq!(notes.len(), 5000_usize.div_ceil(MAX_CHUNK_PAYLOAD));
    }

    #[test]
    fn test_exact_boundary() {
        let data = vec![2u8; MAX_CHUNK_PAYLOAD];
        assert_eq!(frame_chunks(&data).len(), 1);

        let data = vec![2u8; MAX_CHUNK_PAYLOAD + 1];
        let notes = frame_chunks(&data);
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[1].len(), COUNTER_SIZE + 1);
    }

    #[test]
    fn test_counters_dense_from_zero() {
        let data = vec![3u8; 3000];
        for (i, note) in frame_chunks(&data).iter().enumerate() {
            let (counter, _) = split_counter(note).unwrap();
            assert_eq!(counter, i as u32);
        }
    }

    #[test]
    fn test_pack_reverses_frame() {
        let data: Vec<u8> = (0..4321).map(|i| (i % 256) as u8).collect();
        let notes = frame_chunks(&data);
        let packed = pack_chunks(notes.iter().map(|n| n.as_slice())).unwrap();
        assert_eq!(packed, data);
    }

    #[test]
    fn test_pack_out_of_order() {
        let data: Vec<u8> = (0..4096).map(|i| (i % 256) as u8).collect();
        let mut notes = frame_chunks(&data);
        notes.reverse();
        let packed = pack_chunks(notes.iter().map(|n| n.as_slice())).unwrap();
        assert_eq!(packed, data);
    }

    #[test]
    fn test_pack_detects_duplicate() {
        let notes = vec![frame_chunk(0, b"a"), frame_chunk(0, b"b")];
        assert!(matches!(
            pack_chunks(notes.iter().map(|n| n.as_slice())),
            Err(CoreError::DuplicateChunk(0))
        ));
    }

    #[test]
    fn test_pack_detects_gap() {
        let notes = vec![frame_chunk(0, b"a"), frame_chunk(2, b"c")];
        assert!(matches!(
            pack_chunks(notes.iter().map(|n| n.as_slice())),
            Err(CoreError::MissingChunk(1))
        ));
    }

    #[test]
    fn test_split_rejects_short_note() {
        assert!(matches!(
            split_counter(&[1, 2]),
            Err(CoreError::MalformedDataNote(_))
        ));
    }
}
