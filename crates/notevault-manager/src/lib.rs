//! Bootstrap-funded uploads for notevault.
//!
//! Lets a user fund an upload with one signed payment while the server side
//! never holds the user's keys or the upload's encryption material. Pending
//! content is persisted locally (24 h TTL) until its funding transaction
//! lands; background runs are tracked in a UUID-keyed job table.

pub mod config;
pub mod error;
pub mod jobs;
pub mod manager;
pub mod store;

pub use config::{ManagerConfig, DEFAULT_APP_NAME};
pub use error::{ManagerError, Result};
pub use jobs::{JobState, JobTable};
pub use manager::{
    BootstrapEncryption, PreparedBootstrap, UploadManager, BASE_RESERVE,
};
pub use store::{StoredOptions, StoredUpload, UploadStore, UPLOAD_TTL_SECS};

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use notevault_codec::RawContent;
    use notevault_core::{BlocknoteReader, ReadOptions, SaveOptions, SubmitPolicy};
    use notevault_crypto::SymmetricKey;
    use notevault_ledger::{Account, Ledger, MemoryLedger};

    use super::*;

    fn test_manager(ledger: &Arc<MemoryLedger>) -> Arc<UploadManager> {
        let dir = tempfile::tempdir().unwrap();
        let config = ManagerConfig {
            process_key: SymmetricKey::from_bytes(&[0x33; 32]).unwrap(),
            app_name: "notevault-test".to_string(),
            db_path: dir.into_path(),
            fee_multiplier: 2,
        };
        let store = UploadStore::open(&config.db_path).unwrap();
        Arc::new(UploadManager::with_store(
            ledger.clone() as Arc<dyn Ledger>,
            config,
            store,
            SubmitPolicy::immediate(),
        ))
    }

    async fn fund(ledger: &Arc<MemoryLedger>, user: &Account, prepared: &PreparedBootstrap) {
        let signed = prepared.funding_transaction.clone().sign(user);
        assert_eq!(signed.id, prepared.funding_transaction_id);
        ledger.submit(&signed).await.unwrap();
    }

    #[tokio::test]
    async fn test_prepare_and_run_roundtrip() {
        let ledger = Arc::new(MemoryLedger::new());
        let manager = test_manager(&ledger);
        let user = Account::from_seed(&[8; 32]);

        let prepared = manager
            .prepare_bootstrap_transaction(
                user.address(),
                RawContent::from("funded content"),
                SaveOptions::default(),
            )
            .await
            .unwrap();
        assert!(prepared.funding_transaction.amount > BASE_RESERVE);

        fund(&ledger, &user, &prepared).await;

        let result = manager
            .run_from_bootstrap_transaction(
                &prepared.funding_transaction_id,
                &prepared.bootstrap_key,
                BootstrapEncryption::default(),
            )
            .await
            .unwrap();
        let payload_id = result.payload_transaction_id.unwrap();

        let read = BlocknoteReader::new(ledger.clone() as Arc<dyn Ledger>)
            .read(&payload_id, ReadOptions::default())
            .await
            .unwrap();
        assert_eq!(read.content, b"funded content");

        // The bootstrap sender was swept back to the user.
        let refund = ledger
            .records()
            .into_iter()
            .find(|t| t.sender == prepared.bootstrap_sender && t.receiver == user.address());
        assert_eq!(
            refund.unwrap().close_remainder_to,
            Some(user.address())
        );
    }

    #[tokio::test]
    async fn test_run_with_user_encryption() {
        let ledger = Arc::new(MemoryLedger::new());
        let manager = test_manager(&ledger);
        let user = Account::from_seed(&[8; 32]);

        let prepared = manager
            .prepare_bootstrap_transaction(
                user.address(),
                RawContent::from("private"),
                SaveOptions::default(),
            )
            .await
            .unwrap();
        fund(&ledger, &user, &prepared).await;

        let result = manager
            .run_from_bootstrap_transaction(
                &prepared.funding_transaction_id,
                &prepared.bootstrap_key,
                BootstrapEncryption {
                    password: Some("user-pw".to_string()),
                    ..BootstrapEncryption::default()
                },
            )
            .await
            .unwrap();
        let payload_id = result.payload_transaction_id.unwrap();

        let read = BlocknoteReader::new(ledger.clone() as Arc<dyn Ledger>)
            .read(
                &payload_id,
                ReadOptions {
                    password: Some("user-pw".to_string()),
                    ..ReadOptions::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(read.content, b"private");
    }

    #[tokio::test]
    async fn test_prepare_rejects_encryption_material() {
        let ledger = Arc::new(MemoryLedger::new());
        let manager = test_manager(&ledger);
        let user = Account::from_seed(&[8; 32]);

        let err = manager
            .prepare_bootstrap_transaction(
                user.address(),
                RawContent::from("x"),
                SaveOptions {
                    password: Some("pw".to_string()),
                    ..SaveOptions::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ManagerError::EncryptionNotAllowed));
    }

    #[tokio::test]
    async fn test_wrong_bootstrap_key_rejected() {
        let ledger = Arc::new(MemoryLedger::new());
        let manager = test_manager(&ledger);
        let user = Account::from_seed(&[8; 32]);

        let prepared = manager
            .prepare_bootstrap_transaction(
                user.address(),
                RawContent::from("x"),
                SaveOptions::default(),
            )
            .await
            .unwrap();
        fund(&ledger, &user, &prepared).await;

        let err = manager
            .run_from_bootstrap_transaction(
                &prepared.funding_transaction_id,
                &hex::encode([0u8; 32]),
                BootstrapEncryption::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ManagerError::InvalidBootstrapKey));
    }

    #[tokio::test]
    async fn test_sender_discovery() {
        let ledger = Arc::new(MemoryLedger::new());
        let manager = test_manager(&ledger);
        let user = Account::from_seed(&[8; 32]);

        let prepared = manager
            .prepare_bootstrap_transaction(
                user.address(),
                RawContent::from("discoverable"),
                SaveOptions::default(),
            )
            .await
            .unwrap();
        fund(&ledger, &user, &prepared).await;

        let senders = manager.get_all_senders(user.address()).await.unwrap();
        assert_eq!(senders, vec![prepared.bootstrap_sender]);

        let mnemonic = manager
            .get_bootstrap_sender_mnemonic(user.address(), prepared.bootstrap_sender)
            .await
            .unwrap()
            .unwrap();
        let recovered = Account::from_seed_hex(&mnemonic).unwrap();
        assert_eq!(recovered.address(), prepared.bootstrap_sender);

        // Before the upload runs there is no payload id; afterwards the
        // metadata transaction is found.
        assert!(manager
            .get_payload_id_from_sender(prepared.bootstrap_sender)
            .await
            .unwrap()
            .is_none());

        let result = manager
            .run_from_bootstrap_transaction(
                &prepared.funding_transaction_id,
                &prepared.bootstrap_key,
                BootstrapEncryption::default(),
            )
            .await
            .unwrap();
        let payload_id = manager
            .get_payload_id_from_sender(prepared.bootstrap_sender)
            .await
            .unwrap();
        assert_eq!(payload_id, result.payload_transaction_id);
    }

    #[tokio::test]
    async fn test_background_job_lifecycle() {
        let ledger = Arc::new(MemoryLedger::new());
        let manager = test_manager(&ledger);
        let user = Account::from_seed(&[8; 32]);

        let prepared = manager
            .prepare_bootstrap_transaction(
                user.address(),
                RawContent::from("job content"),
                SaveOptions::default(),
            )
            .await
            .unwrap();
        fund(&ledger, &user, &prepared).await;

        let job = manager.spawn_run_from_bootstrap_transaction(
            prepared.funding_transaction_id.clone(),
            prepared.bootstrap_key.clone(),
            BootstrapEncryption::default(),
        );

        let state = loop {
            match manager.jobs().poll(job) {
                Some(JobState::Running) => tokio::time::sleep(std::time::Duration::from_millis(5)).await,
                Some(terminal) => break terminal,
                None => panic!("job vanished before a terminal poll"),
            }
        };
        match state {
            JobState::Done(result) => assert!(result.payload_transaction_id.is_some()),
            other => panic!("unexpected job state {other:?}"),
        }
        // Terminal state was evicted by the poll.
        assert!(manager.jobs().poll(job).is_none());
    }
}
