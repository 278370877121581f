//! Environment-driven manager configuration.

use std::path::PathBuf;

use notevault_crypto::SymmetricKey;

use crate::error::{ManagerError, Result};

/// Default deployment tag in bootstrap notes.
pub const DEFAULT_APP_NAME: &str = "notevault";

/// Settings for the upload manager.
pub struct ManagerConfig {
    /// Process-level AEAD key sealing bootstrap notes (`PRIVATE_KEY_AES`).
    pub process_key: SymmetricKey,
    /// Deployment tag stamped into bootstrap notes (`APP_NAME`).
    pub app_name: String,
    /// Persistence directory for pending uploads (`DB_PATH`).
    pub db_path: PathBuf,
    /// Safety multiplier applied to simulated fees when sizing funding.
    pub fee_multiplier: u64,
}

impl ManagerConfig {
    /// Read configuration from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::Config`] when `PRIVATE_KEY_AES` is missing or
    /// not a 32-byte hex string.
    pub fn from_env() -> Result<Self> {
        let key_hex = std::env::var("PRIVATE_KEY_AES")
            .map_err(|_| ManagerError::Config("PRIVATE_KEY_AES is not set".to_string()))?;
        let process_key = SymmetricKey::from_hex(&key_hex)
            .map_err(|e| ManagerError::Config(format!("PRIVATE_KEY_AES: {e}")))?;
        let app_name =
            std::env::var("APP_NAME").unwrap_or_else(|_| DEFAULT_APP_NAME.to_string());
        let db_path = std::env::var("DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./notevault-uploads"));
        Ok(Self {
            process_key,
            app_name,
            db_path,
            fee_multiplier: 2,
        })
    }
}
