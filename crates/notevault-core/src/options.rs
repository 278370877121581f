//! Writer and reader option surfaces.

use notevault_codec::{CompressionChoice, RawContent};
use notevault_crypto::SymmetricKey;

/// Default MIME for byte payloads.
pub const DEFAULT_BINARY_MIME: &str = "application/octet-stream";

/// Default MIME for text payloads.
pub const DEFAULT_TEXT_MIME: &str = "text/plain";

/// Options for a blocknote save.
#[derive(Clone, Debug, Default)]
pub struct SaveOptions {
    /// Codec selection; defaults to `best`.
    pub compression: CompressionChoice,
    /// MIME recorded in metadata; defaults by payload kind.
    pub mime: Option<String>,
    /// Payload title.
    pub title: Option<String>,
    /// Encrypt the title; defaults to true whenever a key or password is set.
    pub encrypt_title: Option<bool>,
    /// Raw 32-byte AEAD key.
    pub aes_key: Option<SymmetricKey>,
    /// Passphrase; a PBKDF2 salt is recorded in metadata.
    pub password: Option<String>,
    /// Prior payload id this save supersedes.
    pub revision_of: Option<String>,
    /// Compute everything but skip submission.
    pub simulate: bool,
}

impl SaveOptions {
    /// Whether any encryption material is configured.
    pub fn has_encryption(&self) -> bool {
        self.aes_key.is_some() || self.password.is_some()
    }

    /// Resolved title-encryption flag.
    pub fn effective_encrypt_title(&self) -> bool {
        self.encrypt_title.unwrap_or_else(|| self.has_encryption())
    }

    /// Resolved MIME for `content`.
    pub fn effective_mime(&self, content: &RawContent) -> String {
        match &self.mime {
            Some(mime) => mime.clone(),
            None if content.is_text() => DEFAULT_TEXT_MIME.to_string(),
            None => DEFAULT_BINARY_MIME.to_string(),
        }
    }
}

/// Options for a streamnote session.
///
/// Streams compress chunk by chunk, so the codec is a plain name; unset
/// falls back to `none`.
#[derive(Clone, Debug, Default)]
pub struct StreamOptions {
    /// Codec name applied to each chunk.
    pub compression: Option<String>,
    /// MIME recorded in metadata.
    pub mime: Option<String>,
    /// Payload title.
    pub title: Option<String>,
    /// Raw 32-byte key for the chunk stream cipher.
    pub aes_key: Option<SymmetricKey>,
    /// Passphrase; the PBKDF2 salt doubles as the IV-derivation seed.
    pub password: Option<String>,
}

impl StreamOptions {
    /// Resolved codec name.
    pub fn effective_compression(&self) -> &str {
        self.compression.as_deref().unwrap_or("none")
    }
}

/// Options for reading a payload.
#[derive(Clone, Debug, Default)]
pub struct ReadOptions {
    /// Raw 32-byte AEAD key (or stream key for streamnote).
    pub aes_key: Option<SymmetricKey>,
    /// Passphrase for password-encrypted payloads.
    pub password: Option<String>,
    /// 1-based revision index; unset follows the latest revision.
    pub revision: Option<usize>,
    /// Return the packed bytes without decrypting or decompressing.
    pub return_raw: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_title_defaults_follow_key_material() {
        let mut options = SaveOptions::default();
        assert!(!options.effective_encrypt_title());

        options.password = Some("pw".to_string());
        assert!(options.effective_encrypt_title());

        options.encrypt_title = Some(false);
        assert!(!options.effective_encrypt_title());
    }

    #[test]
    fn test_mime_defaults_by_content_kind() {
        let options = SaveOptions::default();
        assert_eq!(
            options.effective_mime(&RawContent::from("text")),
            DEFAULT_TEXT_MIME
        );
        assert_eq!(
            options.effective_mime(&RawContent::from(vec![0u8])),
            DEFAULT_BINARY_MIME
        );

        let options = SaveOptions {
            mime: Some("image/png".to_string()),
            ..SaveOptions::default()
        };
        assert_eq!(options.effective_mime(&RawContent::from(vec![0u8])), "image/png");
    }

    #[test]
    fn test_stream_compression_fallback() {
        assert_eq!(StreamOptions::default().effective_compression(), "none");
        let options = StreamOptions {
            compression: Some("gzip".to_string()),
            ..StreamOptions::default()
        };
        assert_eq!(options.effective_compression(), "gzip");
    }
}
