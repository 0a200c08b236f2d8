//! Async façade used by the UI.
//!
//! Each call shapes one [`Operation`], signs it with the caller's identity
//! and submits it on tokio's blocking pool. A call that outlives
//! `submit_timeout` resolves to `Unknown`: the submission may still commit,
//! so callers must reconcile with a query before retrying.

use std::sync::Arc;
use std::time::Duration;

use dcloud_shared::{
    FileHash, Identity, Operation, RegistryError, SignedOperation, UploadFile, UserId,
};
use dcloud_store::{FileRecord, StorageAccount};
use tracing::{debug, info, warn};

use crate::executor::{Outcome, Receipt, TransactionExecutor};

pub struct RegistryClient {
    identity: Identity,
    executor: Arc<TransactionExecutor>,
    submit_timeout: Duration,
}

impl RegistryClient {
    pub fn new(
        identity: Identity,
        executor: Arc<TransactionExecutor>,
        submit_timeout: Duration,
    ) -> Self {
        Self {
            identity,
            executor,
            submit_timeout,
        }
    }

    pub fn user_id(&self) -> UserId {
        self.identity.user_id()
    }

    // ------------------------------------------------------------------
    // Storage account
    // ------------------------------------------------------------------

    /// Create the caller's storage account. An existing account counts as
    /// success.
    pub async fn initialize_storage(&self) -> Result<StorageAccount, RegistryError> {
        let owner = self.user_id();
        match self.submit(Operation::InitializeStorage { owner }).await {
            Ok(receipt) => match receipt.outcome {
                Outcome::Account(account) => {
                    info!(owner = %owner.short(), "storage initialized");
                    Ok(account)
                }
                other => Err(unexpected(other)),
            },
            Err(RegistryError::AlreadyExists(_)) => {
                debug!(owner = %owner.short(), "storage already initialized");
                self.executor.storage_account(&owner)
            }
            Err(e) => Err(e),
        }
    }

    pub fn storage_account_exists(&self) -> bool {
        self.executor.storage_account(&self.user_id()).is_ok()
    }

    pub fn get_storage_info(&self) -> Result<StorageAccount, RegistryError> {
        self.executor.storage_account(&self.user_id())
    }

    // ------------------------------------------------------------------
    // Files
    // ------------------------------------------------------------------

    /// Register a file whose bytes already live in the blob store under
    /// `content_locator`.
    pub async fn upload_file(
        &self,
        file_hash: FileHash,
        file_name: &str,
        file_size: u64,
        content_locator: &str,
        encryption_key: Option<String>,
    ) -> Result<FileRecord, RegistryError> {
        let upload = UploadFile {
            owner: self.user_id(),
            file_hash,
            file_name: file_name.to_string(),
            file_size,
            content_locator: content_locator.to_string(),
            encryption_key,
        };
        let receipt = self.submit(Operation::UploadFile(upload)).await?;
        match receipt.outcome {
            Outcome::File(record) => {
                info!(file = %record.file_name, size = record.file_size, "file uploaded");
                Ok(record)
            }
            other => Err(unexpected(other)),
        }
    }

    /// Like [`upload_file`](Self::upload_file), fingerprinting `bytes` first.
    pub async fn upload_bytes(
        &self,
        bytes: &[u8],
        file_name: &str,
        content_locator: &str,
        encryption_key: Option<String>,
    ) -> Result<FileRecord, RegistryError> {
        let file_hash = FileHash::of(bytes);
        self.upload_file(
            file_hash,
            file_name,
            bytes.len() as u64,
            content_locator,
            encryption_key,
        )
        .await
    }

    pub async fn delete_file(&self, file_hash: FileHash) -> Result<FileRecord, RegistryError> {
        let owner = self.user_id();
        let receipt = self.submit(Operation::RemoveFile { owner, file_hash }).await?;
        match receipt.outcome {
            Outcome::Removed(record) => Ok(record),
            other => Err(unexpected(other)),
        }
    }

    pub async fn share_file(
        &self,
        file_hash: FileHash,
        is_public: bool,
    ) -> Result<FileRecord, RegistryError> {
        let owner = self.user_id();
        let op = Operation::SetVisibility {
            owner,
            file_hash,
            is_public,
        };
        match self.submit(op).await?.outcome {
            Outcome::File(record) => Ok(record),
            other => Err(unexpected(other)),
        }
    }

    /// Fetch `owner`'s file for download. Counts as an access.
    pub async fn download_file(
        &self,
        owner: UserId,
        file_hash: FileHash,
    ) -> Result<FileRecord, RegistryError> {
        match self.submit(Operation::ReadFile { owner, file_hash }).await?.outcome {
            Outcome::File(record) => Ok(record),
            other => Err(unexpected(other)),
        }
    }

    /// Caller's live files, oldest first.
    pub fn get_user_files(&self) -> Vec<FileRecord> {
        self.executor.list_by_owner(&self.user_id())
    }

    async fn submit(&self, operation: Operation) -> Result<Receipt, RegistryError> {
        let signed = SignedOperation::sign(&self.identity, operation)
            .map_err(|e| RegistryError::InvalidInput(e.to_string()))?;
        let tx_id = signed.tx_id;
        let executor = Arc::clone(&self.executor);

        let task = tokio::task::spawn_blocking(move || executor.submit(signed));
        match tokio::time::timeout(self.submit_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(RegistryError::Unknown(format!(
                "submission {tx_id} aborted: {join_err}"
            ))),
            Err(_) => {
                warn!(tx = %tx_id, timeout = ?self.submit_timeout, "submission outcome unknown");
                Err(RegistryError::Unknown(format!(
                    "no outcome for {tx_id} within {:?}",
                    self.submit_timeout
                )))
            }
        }
    }
}

fn unexpected(outcome: Outcome) -> RegistryError {
    RegistryError::Unknown(format!("unexpected outcome {outcome:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegistryConfig;
    use dcloud_shared::ErrorKind;
    use dcloud_store::{Journal, MemoryJournal, TransactionRecord};

    fn shared_executor() -> Arc<TransactionExecutor> {
        Arc::new(TransactionExecutor::new(
            &RegistryConfig::default(),
            Arc::new(MemoryJournal::new()),
        ))
    }

    fn client(executor: &Arc<TransactionExecutor>) -> RegistryClient {
        RegistryClient::new(Identity::generate(), Arc::clone(executor), Duration::from_secs(5))
    }

    /// Journal whose appends stall, to push submissions past the client
    /// timeout.
    struct SlowJournal {
        inner: MemoryJournal,
        delay: Duration,
    }

    impl Journal for SlowJournal {
        fn append(&self, record: &TransactionRecord) -> dcloud_store::Result<()> {
            std::thread::sleep(self.delay);
            self.inner.append(record)
        }

        fn records(&self) -> dcloud_store::Result<Vec<TransactionRecord>> {
            self.inner.records()
        }
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let exec = shared_executor();
        let alice = client(&exec);
        assert!(!alice.storage_account_exists());

        let first = alice.initialize_storage().await.unwrap();
        let second = alice.initialize_storage().await.unwrap();
        assert_eq!(first, second);
        assert!(alice.storage_account_exists());
    }

    #[tokio::test]
    async fn test_upload_share_download_delete() {
        let exec = shared_executor();
        let alice = client(&exec);
        let bob = client(&exec);
        alice.initialize_storage().await.unwrap();

        let record = alice
            .upload_bytes(b"holiday photos", "photos.zip", "bafy-photos", None)
            .await
            .unwrap();
        assert_eq!(record.file_hash, FileHash::of(b"holiday photos"));
        assert_eq!(record.file_size, 14);
        assert_eq!(alice.get_storage_info().unwrap().total_storage_used(), 14);

        let err = bob
            .download_file(alice.user_id(), record.file_hash)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);

        alice.share_file(record.file_hash, true).await.unwrap();
        let fetched = bob
            .download_file(alice.user_id(), record.file_hash)
            .await
            .unwrap();
        assert_eq!(fetched.access_count, 1);
        assert_eq!(fetched.content_locator, "bafy-photos");

        alice.delete_file(record.file_hash).await.unwrap();
        assert!(alice.get_user_files().is_empty());
        let info = alice.get_storage_info().unwrap();
        assert_eq!((info.total_files(), info.total_storage_used()), (0, 0));
    }

    #[tokio::test]
    async fn test_upload_without_account_not_initialized() {
        let exec = shared_executor();
        let alice = client(&exec);
        let err = alice
            .upload_file(FileHash::of(b"x"), "x.bin", 1, "loc", None)
            .await
            .unwrap_err();
        assert_eq!(err, RegistryError::NotInitialized(alice.user_id()));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_get_user_files_lists_own_files_only() {
        let exec = shared_executor();
        let alice = client(&exec);
        let bob = client(&exec);
        alice.initialize_storage().await.unwrap();
        bob.initialize_storage().await.unwrap();

        alice.upload_bytes(b"a", "a.txt", "loc-a", None).await.unwrap();
        bob.upload_bytes(b"b", "b.txt", "loc-b", Some("k".into())).await.unwrap();

        let names: Vec<_> = alice.get_user_files().into_iter().map(|f| f.file_name).collect();
        assert_eq!(names, vec!["a.txt".to_string()]);
        assert_eq!(bob.get_user_files()[0].encryption_key.as_deref(), Some("k"));
    }

    #[tokio::test]
    async fn test_timeout_is_unknown_then_reconciles() {
        let journal = Arc::new(SlowJournal {
            inner: MemoryJournal::new(),
            delay: Duration::from_millis(300),
        });
        let exec = Arc::new(TransactionExecutor::new(&RegistryConfig::default(), journal));
        let alice = RegistryClient::new(Identity::generate(), exec, Duration::from_millis(20));

        let err = alice.initialize_storage().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unknown);
        assert!(err.is_retryable());

        // The submission was not cancelled; query before retrying.
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(alice.storage_account_exists());
    }
}
