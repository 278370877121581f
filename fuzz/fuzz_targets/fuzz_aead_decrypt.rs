//! Fuzz target for AEAD decryption.
//!
//! Arbitrary ciphertext under a random key must be rejected gracefully,
//! never panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use notevault_crypto::{decrypt, SealedBox, SymmetricKey};

fuzz_target!(|data: &[u8]| {
    if data.len() < 28 {
        return;
    }
    let mut iv = [0u8; 12];
    iv.copy_from_slice(&data[..12]);
    let mut tag = [0u8; 16];
    tag.copy_from_slice(&data[12..28]);
    let sealed = SealedBox {
        iv,
        tag,
        data: data[28..].to_vec(),
    };

    let key = SymmetricKey::generate();
    let _ = decrypt(&key, &sealed);
});
