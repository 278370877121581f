//! HTTP clients for the ledger node and indexer.
//!
//! Thin typed wrappers over the REST surfaces the core uses. Responses are
//! deserialized into the crate's transaction types; errors map onto
//! [`LedgerError`] with the service's message preserved so that callers can
//! recognize idempotent-resubmit responses.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::Client;
use serde::Deserialize;

use crate::account::Address;
use crate::config::LedgerConfig;
use crate::error::{LedgerError, Result};
use crate::ledger::Ledger;
use crate::transaction::{
    AddressRole, PendingInfo, SignedTransaction, SuggestedParams, TransactionPage,
    TransactionQuery, TransactionRecord,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

const ALGOD_TOKEN_HEADER: &str = "X-Algo-API-Token";
const INDEXER_TOKEN_HEADER: &str = "X-Indexer-API-Token";

fn build_client() -> Result<Client> {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(|e| LedgerError::Http(e.to_string()))
}

async fn read_json<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(LedgerError::Api {
            status: status.as_u16(),
            message,
        });
    }
    response
        .json()
        .await
        .map_err(|e| LedgerError::Decode(e.to_string()))
}

// ============================================================================
// Node client
// ============================================================================

#[derive(Deserialize)]
struct ParamsResponse {
    fee: u64,
    #[serde(rename = "min-fee")]
    min_fee: u64,
    #[serde(rename = "last-round")]
    last_round: u64,
    #[serde(rename = "genesis-id")]
    genesis_id: String,
}

#[derive(Deserialize)]
struct PendingResponse {
    #[serde(rename = "confirmed-round", default)]
    confirmed_round: Option<u64>,
    #[serde(rename = "pool-error", default)]
    pool_error: String,
}

#[derive(Deserialize)]
struct StatusResponse {
    #[serde(rename = "last-round")]
    last_round: u64,
}

/// Client for the ledger node REST API.
pub struct AlgodClient {
    client: Client,
    base: String,
    token: String,
}

impl AlgodClient {
    /// Create a node client from configuration.
    pub fn new(config: &LedgerConfig) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            base: config.algod_base(),
            token: config.algod_token.clone(),
        })
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .client
            .get(format!("{}{path}", self.base))
            .header(ALGOD_TOKEN_HEADER, &self.token)
            .send()
            .await
            .map_err(|e| LedgerError::Http(e.to_string()))?;
        read_json(response).await
    }

    /// Suggested parameters for new transactions.
    pub async fn transaction_params(&self) -> Result<SuggestedParams> {
        let raw: ParamsResponse = self.get("/v2/transactions/params").await?;
        Ok(SuggestedParams {
            fee: raw.fee,
            min_fee: raw.min_fee,
            first_valid: raw.last_round,
            last_valid: raw.last_round + 1000,
            genesis_id: raw.genesis_id,
        })
    }

    /// Submit signed transaction bytes.
    pub async fn submit_raw(&self, bytes: Vec<u8>) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/v2/transactions", self.base))
            .header(ALGOD_TOKEN_HEADER, &self.token)
            .header("Content-Type", "application/x-binary")
            .body(bytes)
            .send()
            .await
            .map_err(|e| LedgerError::Http(e.to_string()))?;
        let _: serde_json::Value = read_json(response).await?;
        Ok(())
    }

    /// Pending status for a transaction.
    pub async fn pending(&self, txid: &str) -> Result<PendingInfo> {
        let raw: PendingResponse = self
            .get(&format!("/v2/transactions/pending/{txid}"))
            .await?;
        Ok(PendingInfo {
            confirmed_round: raw.confirmed_round,
            pool_error: raw.pool_error,
        })
    }

    /// The node's current round.
    pub async fn status(&self) -> Result<u64> {
        let raw: StatusResponse = self.get("/v2/status").await?;
        Ok(raw.last_round)
    }

    /// Block until a round after `round` exists.
    pub async fn status_after_round(&self, round: u64) -> Result<u64> {
        let raw: StatusResponse = self
            .get(&format!("/v2/status/wait-for-block-after/{round}"))
            .await?;
        Ok(raw.last_round)
    }
}

// ============================================================================
// Indexer client
// ============================================================================

#[derive(Deserialize)]
struct IndexerPayment {
    receiver: String,
    amount: u64,
    #[serde(rename = "close-remainder-to", default)]
    close_remainder_to: Option<String>,
}

#[derive(Deserialize)]
struct IndexerTransaction {
    id: String,
    sender: String,
    #[serde(rename = "payment-transaction")]
    payment: IndexerPayment,
    #[serde(default)]
    note: Option<String>,
    #[serde(rename = "confirmed-round")]
    confirmed_round: u64,
    #[serde(rename = "intra-round-offset", default)]
    intra_round_offset: u64,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    transactions: Vec<IndexerTransaction>,
    #[serde(rename = "next-token", default)]
    next_token: Option<String>,
}

#[derive(Deserialize)]
struct LookupResponse {
    transaction: IndexerTransaction,
}

fn convert_record(raw: IndexerTransaction) -> Result<TransactionRecord> {
    let note = match raw.note {
        Some(encoded) => BASE64
            .decode(encoded)
            .map_err(|e| LedgerError::Decode(e.to_string()))?,
        None => Vec::new(),
    };
    let close_remainder_to = raw
        .payment
        .close_remainder_to
        .as_deref()
        .map(Address::from_encoded)
        .transpose()?;
    Ok(TransactionRecord {
        id: raw.id,
        sender: Address::from_encoded(&raw.sender)?,
        receiver: Address::from_encoded(&raw.payment.receiver)?,
        amount: raw.payment.amount,
        note,
        close_remainder_to,
        confirmed_round: raw.confirmed_round,
        intra_round_offset: raw.intra_round_offset,
    })
}

/// Client for the indexer REST API.
pub struct IndexerClient {
    client: Client,
    base: String,
    token: String,
}

impl IndexerClient {
    /// Create an indexer client from configuration.
    pub fn new(config: &LedgerConfig) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            base: config.indexer_base(),
            token: config.indexer_token.clone(),
        })
    }

    /// One page of a payment-transaction search.
    pub async fn search_transactions(&self, query: &TransactionQuery) -> Result<TransactionPage> {
        let mut request = self
            .client
            .get(format!("{}/v2/transactions", self.base))
            .header(INDEXER_TOKEN_HEADER, &self.token)
            .query(&[("tx-type", "pay")]);
        if let Some(address) = query.address {
            request = request.query(&[("address", address.encoded())]);
        }
        if let Some(role) = query.address_role {
            let role = match role {
                AddressRole::Sender => "sender",
                AddressRole::Receiver => "receiver",
            };
            request = request.query(&[("address-role", role)]);
        }
        if let Some(min_round) = query.min_round {
            request = request.query(&[("min-round", min_round.to_string())]);
        }
        if let Some(next) = &query.next {
            request = request.query(&[("next", next.clone())]);
        }
        if query.limit > 0 {
            request = request.query(&[("limit", query.limit.to_string())]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| LedgerError::Http(e.to_string()))?;
        let raw: SearchResponse = read_json(response).await?;
        let transactions = raw
            .transactions
            .into_iter()
            .map(convert_record)
            .collect::<Result<Vec<_>>>()?;
        Ok(TransactionPage {
            transactions,
            next: raw.next_token,
        })
    }

    /// Look up a confirmed transaction by id.
    pub async fn lookup(&self, txid: &str) -> Result<TransactionRecord> {
        let response = self
            .client
            .get(format!("{}/v2/transactions/{txid}", self.base))
            .header(INDEXER_TOKEN_HEADER, &self.token)
            .send()
            .await
            .map_err(|e| LedgerError::Http(e.to_string()))?;
        if response.status().as_u16() == 404 {
            return Err(LedgerError::NotFound(txid.to_string()));
        }
        let raw: LookupResponse = read_json(response).await?;
        convert_record(raw.transaction)
    }
}

// ============================================================================
// Combined ledger
// ============================================================================

/// The production [`Ledger`]: a node client plus an indexer client.
pub struct HttpLedger {
    algod: AlgodClient,
    indexer: IndexerClient,
}

impl HttpLedger {
    /// Build both clients from one configuration.
    pub fn new(config: &LedgerConfig) -> Result<Self> {
        Ok(Self {
            algod: AlgodClient::new(config)?,
            indexer: IndexerClient::new(config)?,
        })
    }

    /// Build from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(&LedgerConfig::from_env()?)
    }
}

#[async_trait]
impl Ledger for HttpLedger {
    async fn suggested_params(&self) -> Result<SuggestedParams> {
        self.algod.transaction_params().await
    }

    async fn submit(&self, signed: &SignedTransaction) -> Result<()> {
        self.algod.submit_raw(signed.to_bytes()?).await
    }

    async fn pending_info(&self, txid: &str) -> Result<PendingInfo> {
        self.algod.pending(txid).await
    }

    async fn current_round(&self) -> Result<u64> {
        self.algod.status().await
    }

    async fn wait_for_round_after(&self, round: u64) -> Result<u64> {
        self.algod.status_after_round(round).await
    }

    async fn lookup_by_id(&self, txid: &str) -> Result<TransactionRecord> {
        self.indexer.lookup(txid).await
    }

    async fn search(&self, query: &TransactionQuery) -> Result<TransactionPage> {
        self.indexer.search_transactions(query).await
    }
}
