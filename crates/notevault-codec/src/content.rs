//! Writer input: either UTF-8 text or raw bytes.

use serde::{Deserialize, Serialize};

/// A payload handed to a writer.
///
/// Text is kept as a string until compression so that codecs restricted to
/// string input can be filtered out of auto-selection for byte payloads.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RawContent {
    /// UTF-8 text content.
    Text(String),
    /// Arbitrary binary content.
    Bytes(Vec<u8>),
}

impl RawContent {
    /// View the content as bytes (text is viewed as UTF-8).
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            RawContent::Text(s) => s.as_bytes(),
            RawContent::Bytes(b) => b,
        }
    }

    /// Original byte length of the content.
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Check if the content is empty.
    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }

    /// Whether this payload is text.
    pub fn is_text(&self) -> bool {
        matches!(self, RawContent::Text(_))
    }
}

impl From<String> for RawContent {
    fn from(s: String) -> Self {
        RawContent::Text(s)
    }
}

impl From<&str> for RawContent {
    fn from(s: &str) -> Self {
        RawContent::Text(s.to_string())
    }
}

impl From<Vec<u8>> for RawContent {
    fn from(b: Vec<u8>) -> Self {
        RawContent::Bytes(b)
    }
}

impl From<&[u8]> for RawContent {
    fn from(b: &[u8]) -> Self {
        RawContent::Bytes(b.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_as_bytes() {
        let content = RawContent::from("hi");
        assert_eq!(content.as_bytes(), b"hi");
        assert!(content.is_text());
        assert_eq!(content.len(), 2);
    }

    #[test]
    fn test_bytes_passthrough() {
        let content = RawContent::from(vec![0u8, 1, 2]);
        assert_eq!(content.as_bytes(), &[0, 1, 2]);
        assert!(!content.is_text());
    }

    #[test]
    fn test_empty() {
        assert!(RawContent::from("").is_empty());
        assert!(RawContent::from(Vec::new()).is_empty());
    }
}
