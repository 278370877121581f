//! Password-based key derivation.
//!
//! PBKDF2-HMAC-SHA256 with a 16-byte random salt and 100 000 iterations.
//! The salt is recorded base64 in the payload metadata so readers can
//! re-derive the key from the password alone.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::aead::{SymmetricKey, KEY_SIZE};
use crate::error::{CryptoError, Result};

/// Salt size in bytes.
pub const SALT_SIZE: usize = 16;

/// PBKDF2 iteration count.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Generate a fresh random salt.
pub fn generate_salt() -> [u8; SALT_SIZE] {
    let mut salt = [0u8; SALT_SIZE];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Derive a 256-bit key from a password and salt.
pub fn derive_key(password: &str, salt: &[u8; SALT_SIZE]) -> SymmetricKey {
    let mut key_bytes = [0u8; KEY_SIZE];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ITERATIONS, &mut key_bytes);
    let key = SymmetricKey::from_bytes(&key_bytes).expect("KEY_SIZE output");
    key_bytes.zeroize();
    key
}

/// Decode a base64 salt from payload metadata.
///
/// # Errors
///
/// Returns an error if the field is not base64 or not 16 bytes.
pub fn salt_from_base64(s: &str) -> Result<[u8; SALT_SIZE]> {
    let bytes = BASE64
        .decode(s)
        .map_err(|e| CryptoError::InvalidEncoding(e.to_string()))?;
    if bytes.len() != SALT_SIZE {
        return Err(CryptoError::InvalidSaltLength {
            expected: SALT_SIZE,
            actual: bytes.len(),
        });
    }
    let mut salt = [0u8; SALT_SIZE];
    salt.copy_from_slice(&bytes);
    Ok(salt)
}

/// Encode a salt for storage in payload metadata.
pub fn salt_to_base64(salt: &[u8; SALT_SIZE]) -> String {
    BASE64.encode(salt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_password_same_salt_same_key() {
        let salt = generate_salt();
        let a = derive_key("hunter2", &salt);
        let b = derive_key("hunter2", &salt);
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_different_salt_different_key() {
        let a = derive_key("hunter2", &generate_salt());
        let b = derive_key("hunter2", &generate_salt());
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_different_password_different_key() {
        let salt = generate_salt();
        let a = derive_key("hunter2", &salt);
        let b = derive_key("hunter3", &salt);
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_salt_base64_roundtrip() {
        let salt = generate_salt();
        let decoded = salt_from_base64(&salt_to_base64(&salt)).unwrap();
        assert_eq!(decoded, salt);
    }

    #[test]
    fn test_salt_wrong_length_rejected() {
        let encoded = BASE64.encode([0u8; 8]);
        assert!(matches!(
            salt_from_base64(&encoded),
            Err(CryptoError::InvalidSaltLength { .. })
        ));
    }
}
