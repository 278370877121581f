//! Environment-driven ledger endpoint configuration.

use crate::error::{LedgerError, Result};

/// Connection settings for the node and indexer HTTP services.
#[derive(Clone, Debug)]
pub struct LedgerConfig {
    /// Node base URL.
    pub algod_url: String,
    /// Node API token.
    pub algod_token: String,
    /// Optional node port appended to the URL.
    pub algod_port: Option<u16>,
    /// Indexer base URL.
    pub indexer_url: String,
    /// Indexer API token.
    pub indexer_token: String,
    /// Optional indexer port appended to the URL.
    pub indexer_port: Option<u16>,
}

impl Default for LedgerConfig {
    /// Local sandbox defaults.
    fn default() -> Self {
        Self {
            algod_url: "http://localhost".to_string(),
            algod_token: "a".repeat(64),
            algod_port: Some(4001),
            indexer_url: "http://localhost".to_string(),
            indexer_token: "a".repeat(64),
            indexer_port: Some(8980),
        }
    }
}

impl LedgerConfig {
    /// Read configuration from `ALGOD_*` / `INDEXER_*` environment variables,
    /// falling back to sandbox defaults for unset values.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Config`] when a port variable is not a number.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            algod_url: std::env::var("ALGOD_URL").unwrap_or(defaults.algod_url),
            algod_token: std::env::var("ALGOD_TOKEN").unwrap_or(defaults.algod_token),
            algod_port: parse_port("ALGOD_PORT")?.or(defaults.algod_port),
            indexer_url: std::env::var("INDEXER_URL").unwrap_or(defaults.indexer_url),
            indexer_token: std::env::var("INDEXER_TOKEN").unwrap_or(defaults.indexer_token),
            indexer_port: parse_port("INDEXER_PORT")?.or(defaults.indexer_port),
        })
    }

    /// Full node base URL including port.
    pub fn algod_base(&self) -> String {
        join_port(&self.algod_url, self.algod_port)
    }

    /// Full indexer base URL including port.
    pub fn indexer_base(&self) -> String {
        join_port(&self.indexer_url, self.indexer_port)
    }
}

fn parse_port(var: &str) -> Result<Option<u16>> {
    match std::env::var(var) {
        Ok(value) if !value.is_empty() => value
            .parse()
            .map(Some)
            .map_err(|_| LedgerError::Config(format!("{var} is not a valid port: {value}"))),
        _ => Ok(None),
    }
}

fn join_port(url: &str, port: Option<u16>) -> String {
    let trimmed = url.trim_end_matches('/');
    match port {
        Some(p) => format!("{trimmed}:{p}"),
        None => trimmed.to_string(),
    }
}
