//! Cryptographic primitives for notevault.
//!
//! Three layers of encryption coexist in the system:
//!
//! - **AEAD** (AES-256-GCM): whole-payload encryption in blocknote mode,
//!   encrypted titles, and the manager's process-secret notes.
//! - **Chunk stream cipher** (AES-256-CTR): per-chunk encryption in
//!   streamnote mode with deterministic IVs derived from the chunk counter,
//!   so no per-chunk nonce or tag is stored on-chain.
//! - **PBKDF2-HMAC-SHA256**: password-derived keys with a metadata-recorded
//!   salt.

pub mod aead;
pub mod error;
pub mod hash;
pub mod kdf;
pub mod stream;

pub use aead::{decrypt, encrypt, SealedBox, SymmetricKey, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
pub use error::{CryptoError, Result};
pub use hash::{sha256, sha256_hex};
pub use kdf::{
    derive_key, generate_salt, salt_from_base64, salt_to_base64, PBKDF2_ITERATIONS, SALT_SIZE,
};
pub use stream::{
    decrypt_with_derivation, encrypt_with_derivation, StreamKeys, STREAM_IV_SIZE,
};

/// Derive a key from a password and a stored salt, then open a sealed box.
///
/// Convenience for readers holding a password and the metadata's base64
/// salt/iv/tag fields.
///
/// # Errors
///
/// Returns [`CryptoError::Decryption`] on tag mismatch and encoding errors
/// for malformed metadata fields.
pub fn decrypt_from_derived_key(
    password: &str,
    salt_b64: &str,
    sealed: &SealedBox,
) -> Result<Vec<u8>> {
    let salt = salt_from_base64(salt_b64)?;
    let key = derive_key(password, &salt);
    decrypt(&key, sealed)
}


#[cfg(test)]
mod proptests {
    use proptest::prelude::*;

    use crate::{
        decrypt, decrypt_with_derivation, encrypt, encrypt_with_derivation, SymmetricKey,
    };

    proptest! {
        #[test]
        fn prop_aead_roundtrip(data in prop::collection::vec(any::<u8>(), 0..2048)) {
            let key = SymmetricKey::from_bytes(&[0x42; 32]).unwrap();
            let sealed = encrypt(&key, &data).unwrap();
            prop_assert_eq!(decrypt(&key, &sealed).unwrap(), data);
        }

        #[test]
        fn prop_stream_roundtrip(
            data in prop::collection::vec(any::<u8>(), 0..2048),
            index in any::<u32>(),
            seed in prop::collection::vec(any::<u8>(), 16..=16),
        ) {
            let key = SymmetricKey::from_bytes(&[0x17; 32]).unwrap();
            let encrypted = encrypt_with_derivation(&key, &data, index, &seed).unwrap();
            prop_assert_eq!(
                decrypt_with_derivation(&key, &encrypted, index, &seed).unwrap(),
                data
            );
        }
    }
}
