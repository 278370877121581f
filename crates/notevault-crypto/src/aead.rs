//! AES-256-GCM authenticated encryption.
//!
//! Used for one-shot payload encryption in blocknote mode and for the
//! optional encrypted title. The nonce and tag are stored separately in the
//! payload metadata (base64), so [`SealedBox`] keeps them apart instead of
//! concatenating them to the ciphertext.
//!
//! ## Security Notes
//!
//! - Keys are zeroized on drop
//! - Nonces are randomly generated using OsRng
//! - NEVER reuse a nonce with the same key

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{CryptoError, Result};

/// Size of a symmetric key in bytes (256 bits).
pub const KEY_SIZE: usize = 32;

/// Size of a GCM nonce in bytes (96 bits).
pub const NONCE_SIZE: usize = 12;

/// Size of a GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// A 256-bit symmetric key.
///
/// Shared between the AEAD (blocknote payloads, titles, manager notes) and
/// the chunk stream cipher (streamnote chunks). Zeroized when dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey {
    bytes: [u8; KEY_SIZE],
}

impl SymmetricKey {
    /// Generate a new random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Create a key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: KEY_SIZE,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; KEY_SIZE];
        arr.copy_from_slice(bytes);
        Ok(Self { bytes: arr })
    }

    /// Parse a key from a 64-character hex string.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| CryptoError::InvalidEncoding(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    /// Get the key as a byte slice.
    ///
    /// # Security
    ///
    /// Avoid logging or persisting the returned bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SymmetricKey([REDACTED])")
    }
}

/// An AEAD result with its nonce and tag kept separate.
///
/// Wire form: `iv` and `tag` go into metadata fields (base64), `data` is the
/// ciphertext without the tag.
#[derive(Clone, Debug)]
pub struct SealedBox {
    /// The random 12-byte nonce.
    pub iv: [u8; NONCE_SIZE],
    /// The 16-byte authentication tag.
    pub tag: [u8; TAG_SIZE],
    /// Ciphertext without the tag.
    pub data: Vec<u8>,
}

impl SealedBox {
    /// Base64 of the nonce, as stored in metadata.
    pub fn iv_base64(&self) -> String {
        BASE64.encode(self.iv)
    }

    /// Base64 of the tag, as stored in metadata.
    pub fn tag_base64(&self) -> String {
        BASE64.encode(self.tag)
    }

    /// Rebuild a sealed box from metadata fields and ciphertext bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if either base64 field fails to decode or has the
    /// wrong length.
    pub fn from_parts(iv_b64: &str, tag_b64: &str, data: Vec<u8>) -> Result<Self> {
        let iv_bytes = BASE64
            .decode(iv_b64)
            .map_err(|e| CryptoError::InvalidEncoding(e.to_string()))?;
        let tag_bytes = BASE64
            .decode(tag_b64)
            .map_err(|e| CryptoError::InvalidEncoding(e.to_string()))?;
        if iv_bytes.len() != NONCE_SIZE {
            return Err(CryptoError::InvalidNonceLength {
                expected: NONCE_SIZE,
                actual: iv_bytes.len(),
            });
        }
        if tag_bytes.len() != TAG_SIZE {
            return Err(CryptoError::InvalidTagLength {
                expected: TAG_SIZE,
                actual: tag_bytes.len(),
            });
        }
        let mut iv = [0u8; NONCE_SIZE];
        iv.copy_from_slice(&iv_bytes);
        let mut tag = [0u8; TAG_SIZE];
        tag.copy_from_slice(&tag_bytes);
        Ok(Self { iv, tag, data })
    }
}

/// Encrypt plaintext using AES-256-GCM with a fresh random nonce.
///
/// # Errors
///
/// Returns [`CryptoError::Encryption`] if the cipher rejects the input.
pub fn encrypt(key: &SymmetricKey, plaintext: &[u8]) -> Result<SealedBox> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());
    let mut iv = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut iv);

    let mut combined = cipher
        .encrypt(
            Nonce::from_slice(&iv),
            Payload {
                msg: plaintext,
                aad: &[],
            },
        )
        .map_err(|_| CryptoError::Encryption("AES-256-GCM encryption failed".into()))?;

    // aes-gcm appends the tag to the ciphertext; split it back out.
    let split_at = combined.len() - TAG_SIZE;
    let tag_bytes = combined.split_off(split_at);
    let mut tag = [0u8; TAG_SIZE];
    tag.copy_from_slice(&tag_bytes);

    Ok(SealedBox {
        iv,
        tag,
        data: combined,
    })
}

/// Decrypt an AES-256-GCM sealed box.
///
/// # Errors
///
/// Returns [`CryptoError::Decryption`] if the tag does not verify, the key
/// is wrong, or the ciphertext is malformed.
pub fn decrypt(key: &SymmetricKey, sealed: &SealedBox) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());
    let mut combined = Vec::with_capacity(sealed.data.len() + TAG_SIZE);
    combined.extend_from_slice(&sealed.data);
    combined.extend_from_slice(&sealed.tag);

    cipher
        .decrypt(
            Nonce::from_slice(&sealed.iv),
            Payload {
                msg: &combined,
                aad: &[],
            },
        )
        .map_err(|_| CryptoError::Decryption)
}
