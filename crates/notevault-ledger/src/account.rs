//! Accounts, addresses and hierarchical receiver derivation.
//!
//! An account is an ed25519 keypair. Its address is the public key encoded
//! base32 (no padding) with a 4-byte SHA-512/256 checksum appended, 58
//! characters total. Secrets travel as 64-character hex seeds.
//!
//! Blocknote receivers are derived hierarchically: a child seed is
//! `HMAC-SHA256(parent_seed, "notevault-hd" || uint32_be(accid) ||
//! uint32_be(addid))`, so the sender can always recover a session's receiver
//! from the `(accid, addid)` indices stored in the payload metadata.

use data_encoding::BASE32_NOPAD;
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512_256};

use crate::error::{LedgerError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Length of an address's public key part.
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Length of the address checksum suffix.
const CHECKSUM_SIZE: usize = 4;

/// Length of an encoded address string.
pub const ADDRESS_LEN: usize = 58;

/// Domain tag for hierarchical child derivation.
const HD_CONTEXT: &[u8] = b"notevault-hd";

/// A ledger address: an ed25519 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address(pub [u8; PUBLIC_KEY_SIZE]);

impl Address {
    /// The zero address, used as an absent-field placeholder in encodings.
    pub fn zero() -> Self {
        Address([0u8; PUBLIC_KEY_SIZE])
    }

    /// Raw public key bytes.
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.0
    }

    /// Parse an address from its 58-character encoded form.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidAddress`] on bad length, bad base32 or
    /// checksum mismatch.
    pub fn from_encoded(s: &str) -> Result<Self> {
        if s.len() != ADDRESS_LEN {
            return Err(LedgerError::InvalidAddress(format!(
                "expected {ADDRESS_LEN} characters, got {}",
                s.len()
            )));
        }
        let decoded = BASE32_NOPAD
            .decode(s.as_bytes())
            .map_err(|e| LedgerError::InvalidAddress(e.to_string()))?;
        if decoded.len() != PUBLIC_KEY_SIZE + CHECKSUM_SIZE {
            return Err(LedgerError::InvalidAddress(format!(
                "decoded to {} bytes",
                decoded.len()
            )));
        }
        let (pk, checksum) = decoded.split_at(PUBLIC_KEY_SIZE);
        if checksum != address_checksum(pk) {
            return Err(LedgerError::InvalidAddress("checksum mismatch".to_string()));
        }
        let mut bytes = [0u8; PUBLIC_KEY_SIZE];
        bytes.copy_from_slice(pk);
        Ok(Address(bytes))
    }

    /// Encode to the 58-character address form.
    pub fn encoded(&self) -> String {
        let mut data = Vec::with_capacity(PUBLIC_KEY_SIZE + CHECKSUM_SIZE);
        data.extend_from_slice(&self.0);
        data.extend_from_slice(&address_checksum(&self.0));
        BASE32_NOPAD.encode(&data)
    }
}

fn address_checksum(pk: &[u8]) -> [u8; CHECKSUM_SIZE] {
    let digest = Sha512_256::digest(pk);
    let mut checksum = [0u8; CHECKSUM_SIZE];
    checksum.copy_from_slice(&digest[digest.len() - CHECKSUM_SIZE..]);
    checksum
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.encoded())
    }
}

impl std::fmt::Debug for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Address({})", self.encoded())
    }
}

impl std::str::FromStr for Address {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        Address::from_encoded(s)
    }
}

/// An ed25519 account able to sign payment transactions.
pub struct Account {
    signing_key: SigningKey,
}

impl Account {
    /// Generate a fresh random account.
    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        Self {
            signing_key: SigningKey::from_bytes(&seed),
        }
    }

    /// Rebuild an account from its 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Rebuild an account from a 64-character hex seed.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidSeed`] on malformed input.
    pub fn from_seed_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s.trim()).map_err(|e| LedgerError::InvalidSeed(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(LedgerError::InvalidSeed(format!(
                "expected 32 bytes, got {}",
                bytes.len()
            )));
        }
        let mut seed = [0u8; 32];
        seed.copy_from_slice(&bytes);
        Ok(Self::from_seed(&seed))
    }

    /// Export the seed as hex.
    ///
    /// # Security
    ///
    /// The seed is the full account secret; handle accordingly.
    pub fn seed_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    /// The raw 32-byte seed.
    pub fn seed(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    /// The account's address.
    pub fn address(&self) -> Address {
        let vk: VerifyingKey = self.signing_key.verifying_key();
        Address(vk.to_bytes())
    }

    /// Sign arbitrary bytes.
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message)
    }

    /// Derive the child account for `(accid, addid)`.
    ///
    /// Deterministic: the same parent seed and indices always yield the same
    /// child, which is how blocknote receivers stay recoverable forever.
    pub fn derive_child(&self, accid: u32, addid: u32) -> Account {
        let mut mac = HmacSha256::new_from_slice(&self.signing_key.to_bytes())
            .expect("HMAC accepts any key length");
        mac.update(HD_CONTEXT);
        mac.update(&accid.to_be_bytes());
        mac.update(&addid.to_be_bytes());
        let digest = mac.finalize().into_bytes();
        let mut seed = [0u8; 32];
        seed.copy_from_slice(&digest);
        Account::from_seed(&seed)
    }
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Account({})", self.address().encoded())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_roundtrip() {
        let account = Account::generate();
        let addr = account.address();
        let encoded = addr.encoded();
        assert_eq!(encoded.len(), ADDRESS_LEN);
        assert_eq!(Address::from_encoded(&encoded).unwrap(), addr);
    }

    #[test]
    fn test_address_rejects_bad_checksum() {
        let encoded = Account::generate().address().encoded();
        // Flip the final checksum character to a different base32 symbol.
        let mut chars: Vec<char> = encoded.chars().collect();
        let last = chars[ADDRESS_LEN - 1];
        chars[ADDRESS_LEN - 1] = if last == 'A' { 'B' } else { 'A' };
        let tampered: String = chars.into_iter().collect();
        assert!(Address::from_encoded(&tampered).is_err());
    }

    #[test]
    fn test_address_rejects_bad_length() {
        assert!(Address::from_encoded("SHORT").is_err());
    }

    #[test]
    fn test_seed_hex_roundtrip() {
        let account = Account::generate();
        let restored = Account::from_seed_hex(&account.seed_hex()).unwrap();
        assert_eq!(restored.address(), account.address());
    }

    #[test]
    fn test_seed_hex_rejects_garbage() {
        assert!(Account::from_seed_hex("zz").is_err());
        assert!(Account::from_seed_hex("abcd").is_err());
    }

    #[test]
    fn test_child_derivation_deterministic() {
        let parent = Account::from_seed(&[5u8; 32]);
        let a = parent.derive_child(17, 99);
        let b = parent.derive_child(17, 99);
        assert_eq!(a.address(), b.address());
    }

    #[test]
    fn test_child_derivation_index_sensitive() {
        let parent = Account::from_seed(&[5u8; 32]);
        let a = parent.derive_child(17, 99);
        let b = parent.derive_child(17, 100);
        let c = parent.derive_child(18, 99);
        assert_ne!(a.address(), b.address());
        assert_ne!(a.address(), c.address());
    }

    #[test]
    fn test_child_differs_from_parent() {
        let parent = Account::from_seed(&[5u8; 32]);
        assert_ne!(parent.derive_child(0, 0).address(), parent.address());
    }

    #[test]
    fn test_signature_verifies() {
        use ed25519_dalek::Verifier;

        let account = Account::generate();
        let signature = account.sign(b"message");
        let vk = VerifyingKey::from_bytes(account.address().as_bytes()).unwrap();
        assert!(vk.verify(b"message", &signature).is_ok());
    }
}
