//! Commit boundary of the registry.
//!
//! A submission is authenticated, validated against an optimistic view of
//! the arena ([`TransactionExecutor::prepare`]) and then committed only if
//! none of the records it read changed in between
//! ([`TransactionExecutor::commit`]). A lost race is reported as `Conflict`
//! and never retried here.
//!
//! Every authenticated submission ends up in the journal, either with its
//! commit sequence or with the kind of rejection it received. When the
//! journal cannot take the entry the caller gets `Storage` instead.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dcloud_shared::{FileHash, Operation, RegistryError, SignedOperation, UserId};
use dcloud_store::{
    Database, FileRecord, Journal, RecordArena, SqliteJournal, StagedTransaction, StorageAccount,
    TransactionRecord,
};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::RegistryConfig;
use crate::files::FileRegistry;
use crate::quota::{QuotaMismatch, StorageQuotaLedger};

/// What a committed operation produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Outcome {
    Account(StorageAccount),
    File(FileRecord),
    /// The tombstoned record
    Removed(FileRecord),
}

/// Proof of commit returned to the submitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Receipt {
    pub tx_id: Uuid,
    pub sequence: u64,
    pub committed_at: DateTime<Utc>,
    pub outcome: Outcome,
}

/// A validated submission waiting for [`TransactionExecutor::commit`].
pub struct PreparedTransaction<'a> {
    signed: SignedOperation,
    staged: StagedTransaction<'a>,
    outcome: Outcome,
    now: DateTime<Utc>,
}

impl PreparedTransaction<'_> {
    pub fn tx_id(&self) -> Uuid {
        self.signed.tx_id
    }

    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }
}

pub struct TransactionExecutor {
    arena: RecordArena,
    files: FileRegistry,
    journal: Arc<dyn Journal>,
    /// Tx ids in flight or journaled. Grows for the life of the ledger; a
    /// reused id must be refused no matter how old it is.
    seen: Mutex<HashSet<Uuid>>,
    /// Next commit sequence; held while a commit is journaled so journal
    /// order matches sequence order.
    next_sequence: Mutex<u64>,
}

impl TransactionExecutor {
    /// Empty registry writing to `journal`.
    pub fn new(config: &RegistryConfig, journal: Arc<dyn Journal>) -> Self {
        let quota = StorageQuotaLedger::new(config.max_bytes_per_account);
        Self {
            arena: RecordArena::new(),
            files: FileRegistry::new(quota, config.max_file_name_len),
            journal,
            seen: Mutex::new(HashSet::new()),
            next_sequence: Mutex::new(1),
        }
    }

    /// Open the SQLite journal named by `config` (or the platform default)
    /// and rebuild state from it.
    pub fn open(config: &RegistryConfig) -> Result<Self, RegistryError> {
        let db = match &config.journal_path {
            Some(path) => {
                if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                    std::fs::create_dir_all(dir)
                        .map_err(|e| RegistryError::Storage(e.to_string()))?;
                }
                Database::open_at(path)?
            }
            None => Database::new()?,
        };
        Self::recover(config, Arc::new(SqliteJournal::new(db)))
    }

    /// Rebuild state by replaying the journal's committed entries in
    /// sequence order. Each entry is re-authenticated and re-applied with
    /// its recorded commit time.
    ///
    /// Limits from `config` only bind new submissions. Replay runs without a
    /// quota ceiling or name cap, since committed history already passed the
    /// limits in force when it was submitted.
    pub fn recover(
        config: &RegistryConfig,
        journal: Arc<dyn Journal>,
    ) -> Result<Self, RegistryError> {
        let executor = Self::new(config, Arc::clone(&journal));
        let unbounded = FileRegistry::new(StorageQuotaLedger::new(None), usize::MAX);
        let records = journal.records()?;
        let committed = journal.committed()?;

        let mut last_sequence = 0;
        for record in &committed {
            let sequence = record.sequence().unwrap_or_default();
            if sequence <= last_sequence {
                return Err(RegistryError::Storage(format!(
                    "journal sequence {sequence} follows {last_sequence}"
                )));
            }

            let signed = record.to_signed();
            signed.authenticate().map_err(|e| {
                RegistryError::Storage(format!(
                    "journal entry {} fails authentication: {e}",
                    record.tx_id
                ))
            })?;

            let mut staged = executor.arena.begin();
            apply(&unbounded, &mut staged, &signed, record.recorded_at).map_err(|e| {
                RegistryError::Storage(format!("replay of {} diverged: {e}", record.tx_id))
            })?;
            executor.arena.commit(staged, || Ok(()))?;
            last_sequence = sequence;
        }

        executor
            .seen
            .lock()
            .extend(records.iter().map(|r| r.tx_id));
        *executor.next_sequence.lock() = last_sequence + 1;

        info!(
            committed = committed.len(),
            rejected = records.len() - committed.len(),
            records = executor.arena.len(),
            "journal replayed"
        );
        Ok(executor)
    }

    // ------------------------------------------------------------------
    // Submission
    // ------------------------------------------------------------------

    /// Validate and commit in one step.
    pub fn submit(&self, signed: SignedOperation) -> Result<Receipt, RegistryError> {
        let prepared = self.prepare(signed)?;
        self.commit(prepared)
    }

    /// Authenticate `signed` and run its business rules against current
    /// state. Nothing is written yet.
    pub fn prepare(
        &self,
        signed: SignedOperation,
    ) -> Result<PreparedTransaction<'_>, RegistryError> {
        if let Err(err) = signed.verify() {
            warn!(
                tx = %signed.tx_id,
                signer = %signed.signer.short(),
                "rejected unsigned submission"
            );
            return Err(err);
        }

        if !self.seen.lock().insert(signed.tx_id) {
            warn!(tx = %signed.tx_id, "rejected replayed submission");
            return Err(RegistryError::Replayed(signed.tx_id));
        }

        if let Err(err) = signed.authorize() {
            return Err(self.reject(&signed, err));
        }

        let now = Utc::now();
        let mut staged = self.arena.begin();
        match apply(&self.files, &mut staged, &signed, now) {
            Ok(outcome) => Ok(PreparedTransaction {
                signed,
                staged,
                outcome,
                now,
            }),
            Err(err) => Err(self.reject(&signed, err)),
        }
    }

    /// Commit a prepared transaction if nothing it read has changed since.
    pub fn commit(&self, prepared: PreparedTransaction<'_>) -> Result<Receipt, RegistryError> {
        let PreparedTransaction {
            signed,
            staged,
            outcome,
            now,
        } = prepared;

        let committed = self.arena.commit(staged, || {
            let mut next = self.next_sequence.lock();
            let sequence = *next;
            self.journal
                .append(&TransactionRecord::committed(&signed, sequence, now))?;
            *next += 1;
            Ok(sequence)
        });

        match committed {
            Ok((sequence, versions)) => {
                info!(
                    tx = %signed.tx_id,
                    op = signed.operation.name(),
                    signer = %signed.signer.short(),
                    sequence,
                    written = versions.len(),
                    "transaction committed"
                );
                Ok(Receipt {
                    tx_id: signed.tx_id,
                    sequence,
                    committed_at: now,
                    outcome,
                })
            }
            Err(err) => Err(self.reject(&signed, err)),
        }
    }

    /// Journal a rejection and hand back the error for the caller. If the
    /// rejection cannot be journaled the id is released, as it would be
    /// after a restart, and the caller sees `Storage`.
    fn reject(&self, signed: &SignedOperation, err: RegistryError) -> RegistryError {
        warn!(
            tx = %signed.tx_id,
            op = signed.operation.name(),
            signer = %signed.signer.short(),
            kind = err.kind().as_str(),
            error = %err,
            "transaction rejected"
        );
        let record = TransactionRecord::rejected(signed, &err, Utc::now());
        match self.journal.append(&record) {
            Ok(()) => err,
            Err(e) => {
                warn!(tx = %signed.tx_id, error = %e, "failed to journal rejection");
                self.seen.lock().remove(&signed.tx_id);
                RegistryError::Storage(format!(
                    "rejection of {} not journaled ({err}): {e}",
                    signed.tx_id
                ))
            }
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn storage_account(&self, owner: &UserId) -> Result<StorageAccount, RegistryError> {
        self.files.quota().query(&self.arena, owner)
    }

    /// Live file record without counting an access.
    pub fn file(&self, owner: &UserId, file_hash: &FileHash) -> Result<FileRecord, RegistryError> {
        self.files.get(&self.arena, owner, file_hash)
    }

    pub fn list_by_owner(&self, owner: &UserId) -> Vec<FileRecord> {
        debug!(owner = %owner.short(), "listing files");
        self.files.list_by_owner(&self.arena, owner)
    }

    /// Accounts whose aggregates disagree with their live files.
    pub fn audit(&self) -> Vec<QuotaMismatch> {
        self.files.quota().audit(&self.arena)
    }

    /// Full journal, in append order.
    pub fn history(&self) -> Result<Vec<TransactionRecord>, RegistryError> {
        Ok(self.journal.records()?)
    }

    /// Owners with at least one record.
    pub fn owners(&self) -> Vec<UserId> {
        self.arena.owners()
    }
}

fn apply(
    files: &FileRegistry,
    tx: &mut StagedTransaction<'_>,
    signed: &SignedOperation,
    now: DateTime<Utc>,
) -> Result<Outcome, RegistryError> {
    let caller = &signed.signer;
    match &signed.operation {
        Operation::InitializeStorage { owner } => files
            .quota()
            .initialize(tx, owner, now)
            .map(Outcome::Account),
        Operation::UploadFile(upload) => files.upload(tx, upload, now).map(Outcome::File),
        Operation::RemoveFile { owner, file_hash } => files
            .remove(tx, caller, owner, file_hash)
            .map(Outcome::Removed),
        Operation::SetVisibility {
            owner,
            file_hash,
            is_public,
        } => files
            .set_visibility(tx, caller, owner, file_hash, *is_public)
            .map(Outcome::File),
        Operation::ReadFile { owner, file_hash } => files
            .read(tx, caller, owner, file_hash)
            .map(Outcome::File),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcloud_shared::{ErrorKind, Identity, UploadFile};
    use dcloud_store::{MemoryJournal, StoreError, TxStatus};

    fn executor() -> (TransactionExecutor, Arc<MemoryJournal>) {
        let journal = Arc::new(MemoryJournal::new());
        let exec = TransactionExecutor::new(&RegistryConfig::default(), journal.clone());
        (exec, journal)
    }

    fn sign(identity: &Identity, op: Operation) -> SignedOperation {
        SignedOperation::sign(identity, op).unwrap()
    }

    fn init(identity: &Identity) -> Operation {
        Operation::InitializeStorage {
            owner: identity.user_id(),
        }
    }

    fn upload(identity: &Identity, name: &str, size: u64) -> Operation {
        Operation::UploadFile(UploadFile {
            owner: identity.user_id(),
            file_hash: FileHash::of(name.as_bytes()),
            file_name: name.to_string(),
            file_size: size,
            content_locator: format!("loc-{name}"),
            encryption_key: None,
        })
    }

    #[test]
    fn test_walkthrough_scenario() {
        let (exec, _) = executor();
        let u1 = Identity::generate();
        let u2 = Identity::generate();
        let h1 = FileHash::of(b"h1");

        exec.submit(sign(&u1, init(&u1))).unwrap();
        exec.submit(sign(
            &u1,
            Operation::UploadFile(UploadFile {
                owner: u1.user_id(),
                file_hash: h1,
                file_name: "a.txt".into(),
                file_size: 1024,
                content_locator: "loc1".into(),
                encryption_key: None,
            }),
        ))
        .unwrap();

        let account = exec.storage_account(&u1.user_id()).unwrap();
        assert_eq!((account.total_files(), account.total_storage_used()), (1, 1024));

        let receipt = exec
            .submit(sign(
                &u1,
                Operation::SetVisibility {
                    owner: u1.user_id(),
                    file_hash: h1,
                    is_public: true,
                },
            ))
            .unwrap();
        assert!(matches!(receipt.outcome, Outcome::File(ref f) if f.is_public));

        let read = exec
            .submit(sign(
                &u2,
                Operation::ReadFile {
                    owner: u1.user_id(),
                    file_hash: h1,
                },
            ))
            .unwrap();
        assert!(matches!(read.outcome, Outcome::File(ref f) if f.access_count == 1));

        exec.submit(sign(
            &u1,
            Operation::RemoveFile {
                owner: u1.user_id(),
                file_hash: h1,
            },
        ))
        .unwrap();
        let account = exec.storage_account(&u1.user_id()).unwrap();
        assert_eq!((account.total_files(), account.total_storage_used()), (0, 0));

        let err = exec
            .submit(sign(
                &u2,
                Operation::ReadFile {
                    owner: u1.user_id(),
                    file_hash: h1,
                },
            ))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(exec.audit().is_empty());
    }

    #[test]
    fn test_racing_uploads_one_conflicts() {
        let (exec, _) = executor();
        let owner = Identity::generate();
        exec.submit(sign(&owner, init(&owner))).unwrap();

        let first = exec.prepare(sign(&owner, upload(&owner, "same", 100))).unwrap();
        let second = exec.prepare(sign(&owner, upload(&owner, "same", 100))).unwrap();

        exec.commit(first).unwrap();
        let err = exec.commit(second).unwrap_err();
        assert!(matches!(err, RegistryError::Conflict(_)));
        assert!(err.is_retryable());

        let account = exec.storage_account(&owner.user_id()).unwrap();
        assert_eq!((account.total_files(), account.total_storage_used()), (1, 100));
    }

    #[test]
    fn test_concurrent_threads_single_increment() {
        let (exec, _) = executor();
        let exec = Arc::new(exec);
        let owner = Identity::generate();
        exec.submit(sign(&owner, init(&owner))).unwrap();

        let barrier = Arc::new(std::sync::Barrier::new(2));
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let exec = Arc::clone(&exec);
                let barrier = Arc::clone(&barrier);
                let signed = sign(&owner, upload(&owner, "contended", 512));
                std::thread::spawn(move || {
                    let prepared = exec.prepare(signed);
                    barrier.wait();
                    prepared.and_then(|p| exec.commit(p)).map(|_| ())
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        let loser = results.into_iter().find_map(|r| r.err()).unwrap();
        assert!(matches!(
            loser.kind(),
            ErrorKind::Conflict | ErrorKind::AlreadyExists
        ));

        let account = exec.storage_account(&owner.user_id()).unwrap();
        assert_eq!((account.total_files(), account.total_storage_used()), (1, 512));
    }

    #[test]
    fn test_disjoint_owners_commit_independently() {
        let (exec, _) = executor();
        let a = Identity::generate();
        let b = Identity::generate();

        let pa = exec.prepare(sign(&a, init(&a))).unwrap();
        let pb = exec.prepare(sign(&b, init(&b))).unwrap();
        let rb = exec.commit(pb).unwrap();
        let ra = exec.commit(pa).unwrap();
        assert_ne!(ra.sequence, rb.sequence);
    }

    #[test]
    fn test_second_initialize_is_already_exists() {
        let (exec, _) = executor();
        let owner = Identity::generate();
        exec.submit(sign(&owner, init(&owner))).unwrap();
        let before = exec.storage_account(&owner.user_id()).unwrap();

        let err = exec.submit(sign(&owner, init(&owner))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert_eq!(exec.storage_account(&owner.user_id()).unwrap(), before);
    }

    #[test]
    fn test_unsigned_rejected_before_state_check() {
        let (exec, journal) = executor();
        let owner = Identity::generate();
        let mut signed = sign(&owner, upload(&owner, "a", 1));
        signed.signature = vec![0u8; 64];

        // Would be NotInitialized if state were consulted.
        let err = exec.submit(signed).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert!(journal.records().unwrap().is_empty());
    }

    #[test]
    fn test_foreign_signer_unauthorized() {
        let (exec, journal) = executor();
        let owner = Identity::generate();
        let intruder = Identity::generate();
        exec.submit(sign(&owner, init(&owner))).unwrap();
        exec.submit(sign(&owner, upload(&owner, "a", 1))).unwrap();

        let err = exec
            .submit(sign(
                &intruder,
                Operation::RemoveFile {
                    owner: owner.user_id(),
                    file_hash: FileHash::of(b"a"),
                },
            ))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert!(exec.file(&owner.user_id(), &FileHash::of(b"a")).is_ok());

        let last = journal.records().unwrap().pop().unwrap();
        assert!(matches!(
            last.status,
            TxStatus::Rejected { kind: ErrorKind::Unauthorized, .. }
        ));
    }

    #[test]
    fn test_replayed_submission_rejected() {
        let (exec, _) = executor();
        let owner = Identity::generate();
        exec.submit(sign(&owner, init(&owner))).unwrap();
        exec.submit(sign(&owner, upload(&owner, "a", 1))).unwrap();

        let read = sign(
            &owner,
            Operation::ReadFile {
                owner: owner.user_id(),
                file_hash: FileHash::of(b"a"),
            },
        );
        exec.submit(read.clone()).unwrap();
        let err = exec.submit(read).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Replayed);
        assert_eq!(
            exec.file(&owner.user_id(), &FileHash::of(b"a")).unwrap().access_count,
            1
        );
    }

    #[test]
    fn test_every_outcome_is_journaled() {
        let (exec, journal) = executor();
        let owner = Identity::generate();
        exec.submit(sign(&owner, init(&owner))).unwrap();
        let _ = exec.submit(sign(&owner, init(&owner)));
        exec.submit(sign(&owner, upload(&owner, "a", 1))).unwrap();

        let records = journal.records().unwrap();
        assert_eq!(records.len(), 3);
        let sequences: Vec<_> = records.iter().map(|r| r.sequence()).collect();
        assert_eq!(sequences, vec![Some(1), None, Some(2)]);
    }

    #[test]
    fn test_recover_rebuilds_identical_state() {
        let (exec, journal) = executor();
        let a = Identity::generate();
        let b = Identity::generate();
        exec.submit(sign(&a, init(&a))).unwrap();
        exec.submit(sign(&b, init(&b))).unwrap();
        exec.submit(sign(&a, upload(&a, "one", 10))).unwrap();
        exec.submit(sign(&a, upload(&a, "two", 20))).unwrap();
        exec.submit(sign(
            &a,
            Operation::RemoveFile {
                owner: a.user_id(),
                file_hash: FileHash::of(b"one"),
            },
        ))
        .unwrap();
        exec.submit(sign(
            &b,
            Operation::ReadFile {
                owner: a.user_id(),
                file_hash: FileHash::of(b"two"),
            },
        ))
        .unwrap_err();

        let recovered =
            TransactionExecutor::recover(&RegistryConfig::default(), journal.clone()).unwrap();
        for owner in [a.user_id(), b.user_id()] {
            assert_eq!(
                recovered.storage_account(&owner).unwrap(),
                exec.storage_account(&owner).unwrap()
            );
            assert_eq!(recovered.list_by_owner(&owner), exec.list_by_owner(&owner));
        }
        assert!(recovered.audit().is_empty());

        let next = recovered.submit(sign(&b, upload(&b, "three", 3))).unwrap();
        assert_eq!(next.sequence, 6);
    }

    #[test]
    fn test_recover_refuses_replayed_ids() {
        let (exec, journal) = executor();
        let owner = Identity::generate();
        let signed = sign(&owner, init(&owner));
        exec.submit(signed.clone()).unwrap();

        let recovered = TransactionExecutor::recover(&RegistryConfig::default(), journal).unwrap();
        assert_eq!(recovered.submit(signed).unwrap_err().kind(), ErrorKind::Replayed);
    }

    #[test]
    fn test_open_persists_across_restarts() {
        let dir = tempfile::tempdir().unwrap();
        let config = RegistryConfig {
            journal_path: Some(dir.path().join("ledger").join("journal.db")),
            ..RegistryConfig::default()
        };
        let owner = Identity::generate();

        {
            let exec = TransactionExecutor::open(&config).unwrap();
            exec.submit(sign(&owner, init(&owner))).unwrap();
            exec.submit(sign(&owner, upload(&owner, "kept", 42))).unwrap();
        }

        let exec = TransactionExecutor::open(&config).unwrap();
        let account = exec.storage_account(&owner.user_id()).unwrap();
        assert_eq!((account.total_files(), account.total_storage_used()), (1, 42));
        assert_eq!(exec.history().unwrap().len(), 2);
    }

    #[test]
    fn test_recover_ignores_tightened_limits() {
        let (exec, journal) = executor();
        let owner = Identity::generate();
        let long_name = "n".repeat(200);
        exec.submit(sign(&owner, init(&owner))).unwrap();
        exec.submit(sign(&owner, upload(&owner, &long_name, 5_000))).unwrap();

        let tightened = RegistryConfig {
            max_bytes_per_account: Some(1_000),
            max_file_name_len: 16,
            ..RegistryConfig::default()
        };
        let recovered = TransactionExecutor::recover(&tightened, journal).unwrap();
        let account = recovered.storage_account(&owner.user_id()).unwrap();
        assert_eq!(account.total_storage_used(), 5_000);
        assert!(recovered.audit().is_empty());

        // New submissions are held to the tightened limits.
        let err = recovered
            .submit(sign(&owner, upload(&owner, "more", 10)))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Overflow);
        let err = recovered
            .submit(sign(&owner, upload(&owner, &"m".repeat(17), 1)))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    /// Journal that accepts commits but fails every rejection.
    struct CommitOnlyJournal(MemoryJournal);

    impl Journal for CommitOnlyJournal {
        fn append(&self, record: &TransactionRecord) -> dcloud_store::Result<()> {
            match record.status {
                TxStatus::Committed { .. } => self.0.append(record),
                TxStatus::Rejected { .. } => Err(StoreError::Corrupt("disk full".into())),
            }
        }

        fn records(&self) -> dcloud_store::Result<Vec<TransactionRecord>> {
            self.0.records()
        }
    }

    #[test]
    fn test_unjournaled_rejection_surfaces_storage() {
        let journal = Arc::new(CommitOnlyJournal(MemoryJournal::new()));
        let exec = TransactionExecutor::new(&RegistryConfig::default(), journal.clone());
        let owner = Identity::generate();

        // No account yet: rejected, but the rejection cannot be journaled.
        let signed = sign(&owner, upload(&owner, "early", 10));
        let err = exec.submit(signed.clone()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Storage);
        assert!(!err.is_retryable());
        assert!(journal.records().unwrap().is_empty());

        // The id was released, matching what a restart would see.
        exec.submit(sign(&owner, init(&owner))).unwrap();
        let receipt = exec.submit(signed.clone()).unwrap();
        assert_eq!(receipt.tx_id, signed.tx_id);

        let recovered = TransactionExecutor::recover(&RegistryConfig::default(), journal).unwrap();
        assert_eq!(recovered.submit(signed).unwrap_err().kind(), ErrorKind::Replayed);
    }

    mod quota_invariant {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Step {
            Init(usize),
            Upload { who: usize, file: u8, size: u64 },
            Remove { who: usize, file: u8 },
            Share { who: usize, file: u8, public: bool },
            Read { who: usize, owner: usize, file: u8 },
        }

        fn step() -> impl Strategy<Value = Step> {
            prop_oneof![
                (0..3usize).prop_map(Step::Init),
                (0..3usize, 0..4u8, 0..5_000u64)
                    .prop_map(|(who, file, size)| Step::Upload { who, file, size }),
                (0..3usize, 0..4u8).prop_map(|(who, file)| Step::Remove { who, file }),
                (0..3usize, 0..4u8, any::<bool>())
                    .prop_map(|(who, file, public)| Step::Share { who, file, public }),
                (0..3usize, 0..3usize, 0..4u8)
                    .prop_map(|(who, owner, file)| Step::Read { who, owner, file }),
            ]
        }

        fn hash(file: u8) -> FileHash {
            FileHash::of(&[file])
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(64))]

            #[test]
            fn aggregates_match_live_files(steps in proptest::collection::vec(step(), 1..40)) {
                let config = RegistryConfig {
                    max_bytes_per_account: Some(8_000),
                    ..RegistryConfig::default()
                };
                let exec = TransactionExecutor::new(&config, Arc::new(MemoryJournal::new()));
                let users: Vec<Identity> = (0..3).map(|_| Identity::generate()).collect();

                for step in steps {
                    let (who, op) = match step {
                        Step::Init(who) => (who, init(&users[who])),
                        Step::Upload { who, file, size } => (
                            who,
                            Operation::UploadFile(UploadFile {
                                owner: users[who].user_id(),
                                file_hash: hash(file),
                                file_name: format!("f{file}"),
                                file_size: size,
                                content_locator: "loc".into(),
                                encryption_key: None,
                            }),
                        ),
                        Step::Remove { who, file } => (
                            who,
                            Operation::RemoveFile {
                                owner: users[who].user_id(),
                                file_hash: hash(file),
                            },
                        ),
                        Step::Share { who, file, public } => (
                            who,
                            Operation::SetVisibility {
                                owner: users[who].user_id(),
                                file_hash: hash(file),
                                is_public: public,
                            },
                        ),
                        Step::Read { who, owner, file } => (
                            who,
                            Operation::ReadFile {
                                owner: users[owner].user_id(),
                                file_hash: hash(file),
                            },
                        ),
                    };
                    let _ = exec.submit(sign(&users[who], op));
                    prop_assert!(exec.audit().is_empty());
                }

                for user in &users {
                    if let Ok(account) = exec.storage_account(&user.user_id()) {
                        let live = exec.list_by_owner(&user.user_id());
                        prop_assert_eq!(account.total_files(), live.len() as u64);
                        prop_assert_eq!(
                            account.total_storage_used(),
                            live.iter().map(|f| f.file_size).sum::<u64>()
                        );
                        prop_assert!(account.total_storage_used() <= 8_000);
                    }
                }
            }
        }
    }
}
