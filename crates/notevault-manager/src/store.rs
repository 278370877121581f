//! Persistent store for uploads awaiting funding.
//!
//! Keyed by the funding transaction id, each record holds the raw content
//! and options of one prepared upload. Records live until the funding
//! transaction arrives and the upload runs, or until they expire: anything
//! older than 24 hours is purged when the store opens.

use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use notevault_codec::{CompressionChoice, RawContent};

use crate::error::{ManagerError, Result};

/// Time-to-live of a pending upload, in seconds.
pub const UPLOAD_TTL_SECS: i64 = 24 * 60 * 60;

/// The options persisted alongside pending content.
///
/// Encryption material is deliberately absent: it never reaches the server
/// side of the bootstrap flow.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StoredOptions {
    /// Codec selection for the eventual save.
    pub compression: CompressionChoice,
    /// MIME recorded in metadata.
    pub mime: Option<String>,
    /// Payload title.
    pub title: Option<String>,
}

/// One pending upload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoredUpload {
    /// The content to store once funding arrives.
    pub content: RawContent,
    /// Save options.
    pub options: StoredOptions,
    /// Unix timestamp of creation.
    pub created_at: i64,
}

impl StoredUpload {
    /// Create a record stamped now.
    pub fn new(content: RawContent, options: StoredOptions) -> Self {
        Self {
            content,
            options,
            created_at: Utc::now().timestamp(),
        }
    }

    fn is_expired(&self, now: i64) -> bool {
        now.saturating_sub(self.created_at) > UPLOAD_TTL_SECS
    }
}

/// Sled-backed keyed blob store for pending uploads.
pub struct UploadStore {
    db: sled::Db,
}

impl UploadStore {
    /// Open (or create) the store at `path` and purge expired records.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path)?;
        let store = Self { db };
        let purged = store.purge_expired(Utc::now().timestamp())?;
        if purged > 0 {
            info!(purged, "expired pending uploads removed");
        }
        Ok(store)
    }

    /// Persist a pending upload under its funding transaction id.
    pub fn put(&self, txid: &str, upload: &StoredUpload) -> Result<()> {
        let bytes = bincode::serialize(upload)
            .map_err(|e| ManagerError::Serialization(e.to_string()))?;
        self.db.insert(txid.as_bytes(), bytes)?;
        self.db.flush()?;
        debug!(txid, "pending upload persisted");
        Ok(())
    }

    /// Load a pending upload.
    pub fn get(&self, txid: &str) -> Result<Option<StoredUpload>> {
        match self.db.get(txid.as_bytes())? {
            Some(bytes) => {
                let upload = bincode::deserialize(&bytes)
                    .map_err(|e| ManagerError::Serialization(e.to_string()))?;
                Ok(Some(upload))
            }
            None => Ok(None),
        }
    }

    /// Load and remove a pending upload.
    pub fn take(&self, txid: &str) -> Result<Option<StoredUpload>> {
        let upload = self.get(txid)?;
        if upload.is_some() {
            self.db.remove(txid.as_bytes())?;
            self.db.flush()?;
        }
        Ok(upload)
    }

    /// Number of pending uploads.
    pub fn len(&self) -> usize {
        self.db.len()
    }

    /// Whether the store holds no pending uploads.
    pub fn is_empty(&self) -> bool {
        self.db.is_empty()
    }

    fn purge_expired(&self, now: i64) -> Result<usize> {
        let mut purged = 0;
        for entry in self.db.iter() {
            let (key, value) = entry?;
            let expired = bincode::deserialize::<StoredUpload>(&value)
                .map(|u| u.is_expired(now))
                // Undecodable records are stale by definition.
                .unwrap_or(true);
            if expired {
                self.db.remove(&key)?;
                purged += 1;
            }
        }
        if purged > 0 {
            self.db.flush()?;
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_upload() -> StoredUpload {
        StoredUpload::new(
            RawContent::from("pending content"),
            StoredOptions {
                compression: CompressionChoice::named("gzip"),
                mime: Some("text/plain".to_string()),
                title: Some("queued".to_string()),
            },
        )
    }

    #[test]
    fn test_put_get_take() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::open(dir.path()).unwrap();

        store.put("TXID1", &sample_upload()).unwrap();
        assert_eq!(store.len(), 1);

        let loaded = store.get("TXID1").unwrap().unwrap();
        assert_eq!(loaded.content, RawContent::from("pending content"));

        let taken = store.take("TXID1").unwrap().unwrap();
        assert_eq!(taken.options.title.as_deref(), Some("queued"));
        assert!(store.is_empty());
        assert!(store.take("TXID1").unwrap().is_none());
    }

    #[test]
    fn test_expired_records_purged_at_open() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = UploadStore::open(dir.path()).unwrap();
            let mut stale = sample_upload();
            stale.created_at -= UPLOAD_TTL_SECS + 60;
            store.put("STALE", &stale).unwrap();
            store.put("FRESH", &sample_upload()).unwrap();
            assert_eq!(store.len(), 2);
        }

        let store = UploadStore::open(dir.path()).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.get("STALE").unwrap().is_none());
        assert!(store.get("FRESH").unwrap().is_some());
    }

    #[test]
    fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = UploadStore::open(dir.path()).unwrap();
            store.put("KEEP", &sample_upload()).unwrap();
        }
        let store = UploadStore::open(dir.path()).unwrap();
        assert!(store.get("KEEP").unwrap().is_some());
    }
}
