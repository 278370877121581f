//! The bootstrap upload manager.
//!
//! A browser user funds an upload with a single signed payment, without the
//! server ever seeing their keys or the upload's encryption material:
//!
//! 1. `prepare_bootstrap_transaction` generates a throwaway sender, prices
//!    the upload by simulation, persists the content locally, and returns an
//!    unsigned funding payment whose note carries the sender's secret sealed
//!    under the process key.
//! 2. The user signs and submits the funding payment themselves.
//! 3. `run_from_bootstrap_transaction` decrypts the note, checks the
//!    bootstrap key, loads the persisted content, runs the blocknote save
//!    from the throwaway sender, and closes its remainder back to the user.

use std::sync::Arc;

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tracing::{debug, info};
use uuid::Uuid;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use notevault_codec::RawContent;
use notevault_core::{
    BlocknoteWriter, NotePayment, PayloadMetadata, SaveOptions, SaveResult, SubmitPolicy,
    submit_with_retry,
};
use notevault_crypto::{decrypt, encrypt, SealedBox, SymmetricKey};
use notevault_ledger::{
    search_all, Account, Address, AddressRole, Ledger, PaymentTransaction, TransactionQuery,
};

use crate::config::ManagerConfig;
use crate::error::{ManagerError, Result};
use crate::jobs::JobTable;
use crate::store::{StoredOptions, StoredUpload, UploadStore};

/// Base reserve included in the funding amount: the two minimum balances
/// (bootstrap sender and session receiver) and their refund, 0.2 units.
pub const BASE_RESERVE: u64 = 200_000;

/// Wire form of the sealed secret inside a bootstrap note: hex fields.
#[derive(Serialize, Deserialize)]
struct SealedNote {
    iv: String,
    data: String,
    tag: String,
}

/// The secret a bootstrap note carries, sealed under the process key.
#[derive(Serialize, Deserialize)]
struct BootstrapSecret {
    sender_mnemonic: String,
    bootstrap_key: String,
}

/// The plaintext shape of a bootstrap funding note.
#[derive(Serialize, Deserialize)]
struct BootstrapNote {
    app: String,
    blocknote: String,
}

/// An unsigned funding transaction ready for the user to sign.
#[derive(Clone, Debug)]
pub struct PreparedBootstrap {
    /// The funding payment, to be signed by the user.
    pub funding_transaction: PaymentTransaction,
    /// Its transaction id (stable across signing).
    pub funding_transaction_id: String,
    /// Address of the generated bootstrap sender.
    pub bootstrap_sender: Address,
    /// Secret handed to the user; required to run the upload.
    pub bootstrap_key: String,
}

/// Encryption material supplied at run time, never at prepare time.
#[derive(Clone, Debug, Default)]
pub struct BootstrapEncryption {
    /// Raw 32-byte AEAD key.
    pub aes_key: Option<SymmetricKey>,
    /// Passphrase.
    pub password: Option<String>,
    /// Encrypt the title.
    pub encrypt_title: Option<bool>,
}

/// The bootstrap upload manager.
pub struct UploadManager {
    ledger: Arc<dyn Ledger>,
    store: UploadStore,
    process_key: SymmetricKey,
    app_name: String,
    fee_multiplier: u64,
    policy: SubmitPolicy,
    jobs: JobTable,
}

impl UploadManager {
    /// Create a manager from configuration.
    pub fn new(ledger: Arc<dyn Ledger>, config: ManagerConfig) -> Result<Self> {
        let store = UploadStore::open(&config.db_path)?;
        Ok(Self::with_store(ledger, config, store, SubmitPolicy::default()))
    }

    /// Create a manager with an explicit store and submit policy.
    pub fn with_store(
        ledger: Arc<dyn Ledger>,
        config: ManagerConfig,
        store: UploadStore,
        policy: SubmitPolicy,
    ) -> Self {
        Self {
            ledger,
            store,
            process_key: config.process_key,
            app_name: config.app_name,
            fee_multiplier: config.fee_multiplier,
            policy,
            jobs: JobTable::new(),
        }
    }

    /// The job table for background runs.
    pub fn jobs(&self) -> &JobTable {
        &self.jobs
    }

    /// Prepare a bootstrap-funded upload.
    ///
    /// Encryption options are rejected here: they belong to the run call so
    /// the server never holds content keys next to content.
    ///
    /// # Errors
    ///
    /// [`ManagerError::EncryptionNotAllowed`] when key material is present
    /// in `options`.
    pub async fn prepare_bootstrap_transaction(
        &self,
        user_address: Address,
        content: RawContent,
        options: SaveOptions,
    ) -> Result<PreparedBootstrap> {
        if options.aes_key.is_some()
            || options.password.is_some()
            || options.encrypt_title.is_some()
        {
            return Err(ManagerError::EncryptionNotAllowed);
        }

        let sender = Account::generate();

        // Price the upload without touching the chain.
        let simulation = SaveOptions {
            compression: options.compression.clone(),
            mime: options.mime.clone(),
            title: options.title.clone(),
            simulate: true,
            ..SaveOptions::default()
        };
        let writer = BlocknoteWriter::with_policy(self.ledger.clone(), self.policy.clone());
        let priced = writer
            .save(&sender.seed_hex(), content.clone(), simulation)
            .await?;

        let params = self.ledger.suggested_params().await?;
        let amount = priced.fees * self.fee_multiplier
            + BASE_RESERVE
            + params.min_fee * self.fee_multiplier;

        let mut key_bytes = [0u8; 32];
        OsRng.fill_bytes(&mut key_bytes);
        let bootstrap_key = hex::encode(key_bytes);

        let note = self.encode_bootstrap_note(&BootstrapSecret {
            sender_mnemonic: sender.seed_hex(),
            bootstrap_key: bootstrap_key.clone(),
        })?;

        let funding = PaymentTransaction::build(
            user_address,
            sender.address(),
            amount,
            note,
            None,
            &params,
        );
        let funding_transaction_id = funding.id();

        self.store.put(
            &funding_transaction_id,
            &StoredUpload::new(
                content,
                StoredOptions {
                    compression: options.compression,
                    mime: options.mime,
                    title: options.title,
                },
            ),
        )?;
        info!(
            txid = %funding_transaction_id,
            amount,
            "bootstrap upload prepared"
        );

        Ok(PreparedBootstrap {
            funding_transaction: funding,
            funding_transaction_id,
            bootstrap_sender: sender.address(),
            bootstrap_key,
        })
    }

    /// Execute a prepared upload once its funding transaction is on-chain.
    ///
    /// Returns the blocknote save result; residual funds in the bootstrap
    /// sender are closed back to the funding user.
    ///
    /// # Errors
    ///
    /// [`ManagerError::InvalidBootstrapKey`] when the supplied key does not
    /// match the sealed note; [`ManagerError::MissingRecord`] when no
    /// content is persisted (expired or never prepared).
    pub async fn run_from_bootstrap_transaction(
        &self,
        funding_txid: &str,
        bootstrap_key: &str,
        encryption: BootstrapEncryption,
    ) -> Result<SaveResult> {
        let funding = self.ledger.lookup_by_id(funding_txid).await?;
        let secret = self.decode_bootstrap_note(&funding.note)?;

        let matches: bool = secret
            .bootstrap_key
            .as_bytes()
            .ct_eq(bootstrap_key.as_bytes())
            .into();
        if !matches {
            return Err(ManagerError::InvalidBootstrapKey);
        }

        let upload = self
            .store
            .take(funding_txid)?
            .ok_or_else(|| ManagerError::MissingRecord(funding_txid.to_string()))?;

        let options = SaveOptions {
            compression: upload.options.compression,
            mime: upload.options.mime,
            title: upload.options.title,
            aes_key: encryption.aes_key,
            password: encryption.password,
            encrypt_title: encryption.encrypt_title,
            ..SaveOptions::default()
        };

        let writer = BlocknoteWriter::with_policy(self.ledger.clone(), self.policy.clone());
        let result = writer
            .save(&secret.sender_mnemonic, upload.content, options)
            .await?;

        // Sweep the bootstrap sender's residue back to the user.
        let sender = Account::from_seed_hex(&secret.sender_mnemonic)?;
        let refund = NotePayment {
            receiver: funding.sender,
            amount: 0,
            note: Vec::new(),
            close_remainder_to: Some(funding.sender),
        };
        submit_with_retry(self.ledger.as_ref(), &sender, &refund, &self.policy).await?;
        debug!(txid = funding_txid, "bootstrap sender closed back to funder");

        Ok(result)
    }

    /// Run a prepared upload in the background; poll the job table by id.
    pub fn spawn_run_from_bootstrap_transaction(
        self: &Arc<Self>,
        funding_txid: String,
        bootstrap_key: String,
        encryption: BootstrapEncryption,
    ) -> Uuid {
        let id = self.jobs.insert();
        let manager = self.clone();
        tokio::spawn(async move {
            match manager
                .run_from_bootstrap_transaction(&funding_txid, &bootstrap_key, encryption)
                .await
            {
                Ok(result) => manager.jobs.complete(id, result),
                Err(err) => manager.jobs.fail(id, err.to_string()),
            }
        });
        id
    }

    /// Bootstrap senders this user has funded.
    pub async fn get_all_senders(&self, user_address: Address) -> Result<Vec<Address>> {
        let records = search_all(
            self.ledger.as_ref(),
            TransactionQuery {
                address: Some(user_address),
                address_role: Some(AddressRole::Sender),
                ..TransactionQuery::default()
            },
        )
        .await?;
        Ok(records
            .iter()
            .filter(|t| self.decode_bootstrap_note(&t.note).is_ok())
            .map(|t| t.receiver)
            .collect())
    }

    /// The payload transaction id a bootstrap sender produced, if any.
    pub async fn get_payload_id_from_sender(&self, sender: Address) -> Result<Option<String>> {
        let records = search_all(
            self.ledger.as_ref(),
            TransactionQuery {
                address: Some(sender),
                address_role: Some(AddressRole::Sender),
                ..TransactionQuery::default()
            },
        )
        .await?;
        Ok(records
            .iter()
            .find(|t| PayloadMetadata::from_note_bytes(&t.note).is_ok())
            .map(|t| t.id.clone()))
    }

    /// Recover a bootstrap sender's secret from its funding transaction.
    pub async fn get_bootstrap_sender_mnemonic(
        &self,
        user_address: Address,
        bootstrap_sender: Address,
    ) -> Result<Option<String>> {
        let records = search_all(
            self.ledger.as_ref(),
            TransactionQuery {
                address: Some(user_address),
                address_role: Some(AddressRole::Sender),
                ..TransactionQuery::default()
            },
        )
        .await?;
        Ok(records
            .iter()
            .filter(|t| t.receiver == bootstrap_sender)
            .find_map(|t| self.decode_bootstrap_note(&t.note).ok())
            .map(|secret| secret.sender_mnemonic))
    }

    /// Seal a bootstrap secret into note bytes:
    /// `{"app": ..., "blocknote": base64(json({iv, data, tag} hex))}`.
    fn encode_bootstrap_note(&self, secret: &BootstrapSecret) -> Result<Vec<u8>> {
        let plaintext = serde_json::to_vec(secret)
            .map_err(|e| ManagerError::Serialization(e.to_string()))?;
        let sealed = encrypt(&self.process_key, &plaintext)?;
        let sealed_json = serde_json::to_vec(&SealedNote {
            iv: hex::encode(sealed.iv),
            data: hex::encode(&sealed.data),
            tag: hex::encode(sealed.tag),
        })
        .map_err(|e| ManagerError::Serialization(e.to_string()))?;
        let note = BootstrapNote {
            app: self.app_name.clone(),
            blocknote: BASE64.encode(sealed_json),
        };
        serde_json::to_vec(&note).map_err(|e| ManagerError::Serialization(e.to_string()))
    }

    /// Reverse [`Self::encode_bootstrap_note`]; any mismatch (foreign app,
    /// undecryptable payload, malformed JSON) rejects the note.
    fn decode_bootstrap_note(&self, note: &[u8]) -> Result<BootstrapSecret> {
        let outer: BootstrapNote = serde_json::from_slice(note)
            .map_err(|_| ManagerError::NotABootstrap("not a bootstrap note".to_string()))?;
        if outer.app != self.app_name {
            return Err(ManagerError::NotABootstrap(format!(
                "foreign app tag: {}",
                outer.app
            )));
        }
        let sealed_json = BASE64
            .decode(outer.blocknote)
            .map_err(|_| ManagerError::NotABootstrap("invalid base64".to_string()))?;
        let sealed: SealedNote = serde_json::from_slice(&sealed_json)
            .map_err(|_| ManagerError::NotABootstrap("invalid sealed note".to_string()))?;

        let iv = hex::decode(&sealed.iv)
            .map_err(|_| ManagerError::NotABootstrap("invalid iv".to_string()))?;
        let tag = hex::decode(&sealed.tag)
            .map_err(|_| ManagerError::NotABootstrap("invalid tag".to_string()))?;
        let data = hex::decode(&sealed.data)
            .map_err(|_| ManagerError::NotABootstrap("invalid data".to_string()))?;
        if iv.len() != notevault_crypto::NONCE_SIZE || tag.len() != notevault_crypto::TAG_SIZE {
            return Err(ManagerError::NotABootstrap("invalid seal lengths".to_string()));
        }

        let mut iv_arr = [0u8; notevault_crypto::NONCE_SIZE];
        iv_arr.copy_from_slice(&iv);
        let mut tag_arr = [0u8; notevault_crypto::TAG_SIZE];
        tag_arr.copy_from_slice(&tag);
        let sealed_box = SealedBox {
            iv: iv_arr,
            tag: tag_arr,
            data,
        };
        let plaintext = decrypt(&self.process_key, &sealed_box)?;
        serde_json::from_slice(&plaintext)
            .map_err(|_| ManagerError::NotABootstrap("invalid secret".to_string()))
    }
}
