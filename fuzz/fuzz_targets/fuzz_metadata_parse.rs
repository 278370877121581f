//! Fuzz target for payload-metadata parsing.
//!
//! Arbitrary note bytes must either parse into a metadata record that
//! re-serializes, or be rejected, never panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use notevault_core::PayloadMetadata;

fuzz_target!(|data: &[u8]| {
    if let Ok(metadata) = PayloadMetadata::from_note_bytes(data) {
        // Whatever parsed must serialize again (or be oversized).
        let _ = metadata.to_note_bytes();
        let _ = metadata.is_stream();
        let _ = metadata.is_encrypted();
    }
});
