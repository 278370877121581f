//! Fuzz target for data-note reassembly.
//!
//! Splits arbitrary bytes into pseudo-notes and feeds them to the packer;
//! framing real data must always round-trip, and malformed note sets must
//! error instead of panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;
use notevault_core::{frame_chunks, pack_chunks, split_counter};

fuzz_target!(|data: &[u8]| {
    // Framing arbitrary payloads always round-trips.
    let notes = frame_chunks(data);
    let packed = pack_chunks(notes.iter().map(|n| n.as_slice())).unwrap();
    assert_eq!(packed, data);

    // Arbitrary byte windows as notes: parse or reject, never panic.
    let pseudo_notes: Vec<&[u8]> = data.chunks(16).collect();
    for note in &pseudo_notes {
        let _ = split_counter(note);
    }
    let _ = pack_chunks(pseudo_notes.into_iter());
});
