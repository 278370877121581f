//! The payload-metadata record carried by the first transaction of a session.
//!
//! Serialized as UTF-8 JSON into the note field, so the whole record must
//! stay under the 1024-byte note limit. Optional fields are omitted rather
//! than nulled to keep the encoding tight.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Metadata format version.
pub const FORMAT_VERSION: u32 = 1;

/// Maximum serialized metadata size (one note).
pub const MAX_METADATA_SIZE: usize = 1024;

/// Value of the `type` field for streamnote sessions.
pub const STREAM_KIND: &str = "stream";

/// A payload title, either plain or AEAD-encrypted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TitleField {
    /// Plaintext title.
    Plain(String),
    /// Encrypted title: nonce, tag and ciphertext, all base64.
    Encrypted {
        /// AEAD nonce (base64).
        iv: String,
        /// AEAD tag (base64).
        tag: String,
        /// Ciphertext (base64).
        data: String,
    },
}

impl Default for TitleField {
    fn default() -> Self {
        TitleField::Plain(String::new())
    }
}

/// The payload-metadata record (see the note formats in the module docs).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PayloadMetadata {
    /// Format version.
    pub version: u32,

    /// Payload title.
    pub title: TitleField,

    /// MIME type of the original content.
    pub mime: String,

    /// `"stream"` for streamnote sessions; absent for blocknote.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none", default)]
    pub kind: Option<String>,

    /// Original payload byte length (blocknote only).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub size: Option<u64>,

    /// Number of data transactions (blocknote only).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub txns: Option<u32>,

    /// Codec name; absent when the payload is stored uncompressed.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub compression: Option<String>,

    /// AEAD nonce (blocknote) or stream IV seed (streamnote), base64.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub iv: Option<String>,

    /// AEAD tag, base64 (blocknote only).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tag: Option<String>,

    /// PBKDF2 salt, base64 (password-derived keys).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub salt: Option<String>,

    /// HD address index of the receiver (blocknote only).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub addid: Option<u32>,

    /// HD account index of the receiver (blocknote only).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub accid: Option<u32>,
}

impl PayloadMetadata {
    /// Start a metadata record with the always-present fields.
    pub fn new(title: TitleField, mime: impl Into<String>) -> Self {
        Self {
            version: FORMAT_VERSION,
            title,
            mime: mime.into(),
            ..Self::default()
        }
    }

    /// Whether this record describes a streamnote session.
    pub fn is_stream(&self) -> bool {
        self.kind.as_deref() == Some(STREAM_KIND)
    }

    /// Whether the payload (or chunk stream) is encrypted.
    pub fn is_encrypted(&self) -> bool {
        self.iv.is_some() || self.salt.is_some()
    }

    /// Serialize into note bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::PayloadTooLarge`] if the JSON exceeds the note
    /// limit.
    pub fn to_note_bytes(&self) -> Result<Vec<u8>> {
        let bytes = serde_json::to_vec(self)
            .map_err(|e| CoreError::MalformedMetadata(e.to_string()))?;
        if bytes.len() > MAX_METADATA_SIZE {
            return Err(CoreError::PayloadTooLarge {
                size: bytes.len(),
                max: MAX_METADATA_SIZE,
            });
        }
        Ok(bytes)
    }

    /// Parse a metadata record from note bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MalformedMetadata`] when the note is not a
    /// metadata record.
    pub fn from_note_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| CoreError::MalformedMetadata(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PayloadMetadata {
        let mut metadata = PayloadMetadata::new(
            TitleField::Plain("notes.txt".to_string()),
            "text/plain",
        );
        metadata.size = Some(42);
        metadata.txns = Some(1);
        metadata.addid = Some(7);
        metadata.accid = Some(9);
        metadata
    }

    #[test]
    fn test_note_roundtrip() {
        let metadata = sample();
        let bytes = metadata.to_note_bytes().unwrap();
        let restored = PayloadMetadata::from_note_bytes(&bytes).unwrap();
        assert_eq!(restored, metadata);
    }

    #[test]
    fn test_absent_fields_are_omitted() {
        let metadata = PayloadMetadata::new(TitleField::Plain("t".to_string()), "text/plain");
        let json = String::from_utf8(metadata.to_note_bytes().unwrap()).unwrap();
        assert!(!json.contains("size"));
        assert!(!json.contains("compression"));
        assert!(!json.contains("salt"));
        assert!(!json.contains("type"));
    }

    #[test]
    fn test_stream_kind() {
        let mut metadata = sample();
        assert!(!metadata.is_stream());
        metadata.kind = Some(STREAM_KIND.to_string());
        assert!(metadata.is_stream());

        let bytes = metadata.to_note_bytes().unwrap();
        let json = String::from_utf8(bytes.clone()).unwrap();
        assert!(json.contains("\"type\":\"stream\""));
        assert!(PayloadMetadata::from_note_bytes(&bytes).unwrap().is_stream());
    }

    #[test]
    fn test_encrypted_title_roundtrip() {
        let mut metadata = sample();
        metadata.title = TitleField::Encrypted {
            iv: "aXY=".to_string(),
            tag: "dGFn".to_string(),
            data: "ZGF0YQ==".to_string(),
        };
        let restored =
            PayloadMetadata::from_note_bytes(&metadata.to_note_bytes().unwrap()).unwrap();
        assert!(matches!(restored.title, TitleField::Encrypted { .. }));
    }

    #[test]
    fn test_oversized_metadata_rejected() {
        let mut metadata = sample();
        metadata.title = TitleField::Plain("x".repeat(MAX_METADATA_SIZE));
        assert!(matches!(
            metadata.to_note_bytes(),
            Err(CoreError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn test_garbage_note_rejected() {
        assert!(matches!(
            PayloadMetadata::from_note_bytes(&[0u8, 1, 2, 3]),
            Err(CoreError::MalformedMetadata(_))
        ));
    }

    #[test]
    fn test_is_encrypted() {
        let mut metadata = sample();
        assert!(!metadata.is_encrypted());
        metadata.salt = Some("c2FsdA==".to_string());
        assert!(metadata.is_encrypted());
    }
}
