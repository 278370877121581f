//! Fuzz target for codec decompression.
//!
//! Every registered codec must reject or decode arbitrary input without
//! panicking, and without allocating past the output ceiling.

#![no_main]

use libfuzzer_sys::fuzz_target;
use notevault_codec::{Codec as _, CodecRegistry, CODEC_NAMES};

fuzz_target!(|data: &[u8]| {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime");
    runtime.block_on(async {
        for name in CODEC_NAMES {
            let codec = CodecRegistry::create(name).expect("registered codec");
            let _ = codec.uncompress(data).await;
        }
    });
});
