//! Records held by the ledger.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to the UI layer. New fields must carry `#[serde(default)]` so
//! older readers and journals keep decoding.

use chrono::{DateTime, Utc};
use dcloud_shared::{
    Address, ErrorKind, FileHash, Operation, RegistryError, SignedOperation, UserId,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// StorageAccount
// ---------------------------------------------------------------------------

/// Per-owner quota record. The aggregates can only change through
/// [`StorageAccount::apply`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageAccount {
    owner: UserId,
    total_files: u64,
    total_storage_used: u64,
    created_at: DateTime<Utc>,
}

/// Change to an account's aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaDelta {
    Grow { bytes: u64, files: u64 },
    Shrink { bytes: u64, files: u64 },
}

impl StorageAccount {
    /// A zeroed account.
    pub fn new(owner: UserId, created_at: DateTime<Utc>) -> Self {
        Self {
            owner,
            total_files: 0,
            total_storage_used: 0,
            created_at,
        }
    }

    pub fn owner(&self) -> &UserId {
        &self.owner
    }

    pub fn total_files(&self) -> u64 {
        self.total_files
    }

    pub fn total_storage_used(&self) -> u64 {
        self.total_storage_used
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Return the account with `delta` applied, or an error if usage would
    /// leave `[0, ceiling]`.
    pub fn apply(&self, delta: QuotaDelta, ceiling: Option<u64>) -> Result<Self, RegistryError> {
        let mut next = self.clone();
        match delta {
            QuotaDelta::Grow { bytes, files } => {
                let limit = ceiling.unwrap_or(u64::MAX);
                let requested = u128::from(self.total_storage_used) + u128::from(bytes);
                next.total_storage_used = self
                    .total_storage_used
                    .checked_add(bytes)
                    .filter(|used| *used <= limit)
                    .ok_or(RegistryError::Overflow { requested, limit })?;
                next.total_files = self.total_files.checked_add(files).ok_or(
                    RegistryError::Overflow {
                        requested: u128::from(self.total_files) + u128::from(files),
                        limit: u64::MAX,
                    },
                )?;
            }
            QuotaDelta::Shrink { bytes, files } => {
                next.total_storage_used =
                    self.total_storage_used.checked_sub(bytes).ok_or_else(|| {
                        RegistryError::InvalidInput(format!(
                            "cannot release {bytes} bytes from {} in use",
                            self.total_storage_used
                        ))
                    })?;
                next.total_files = self.total_files.checked_sub(files).ok_or_else(|| {
                    RegistryError::InvalidInput(format!(
                        "cannot release {files} files from {} recorded",
                        self.total_files
                    ))
                })?;
            }
        }
        Ok(next)
    }
}

// ---------------------------------------------------------------------------
// FileRecord
// ---------------------------------------------------------------------------

/// Metadata for one file, keyed by `(owner, file_hash)`. The bytes live in
/// the external blob store behind `content_locator`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileRecord {
    pub address: Address,
    pub owner: UserId,
    pub file_hash: FileHash,
    pub file_name: String,
    pub file_size: u64,
    pub content_locator: String,
    pub upload_timestamp: DateTime<Utc>,
    pub is_public: bool,
    pub access_count: u64,
    #[serde(default)]
    pub encryption_key: Option<String>,
    /// `false` once tombstoned; a dead record accepts no further mutation
    pub alive: bool,
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// Anything stored at an [`Address`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Record {
    Storage(StorageAccount),
    File(FileRecord),
}

impl Record {
    pub fn owner(&self) -> &UserId {
        match self {
            Record::Storage(account) => account.owner(),
            Record::File(file) => &file.owner,
        }
    }

    pub fn as_storage(&self) -> Option<&StorageAccount> {
        match self {
            Record::Storage(account) => Some(account),
            Record::File(_) => None,
        }
    }

    pub fn as_file(&self) -> Option<&FileRecord> {
        match self {
            Record::File(file) => Some(file),
            Record::Storage(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// TransactionRecord (journal entry)
// ---------------------------------------------------------------------------

/// Terminal state of a submitted transaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum TxStatus {
    Committed { sequence: u64 },
    Rejected { kind: ErrorKind, reason: String },
}

/// Immutable audit entry appended for every terminal outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransactionRecord {
    pub tx_id: Uuid,
    pub signer: UserId,
    pub operation: Operation,
    pub signature: Vec<u8>,
    pub status: TxStatus,
    pub recorded_at: DateTime<Utc>,
}

impl TransactionRecord {
    pub fn committed(signed: &SignedOperation, sequence: u64, recorded_at: DateTime<Utc>) -> Self {
        Self::from_signed(signed, TxStatus::Committed { sequence }, recorded_at)
    }

    pub fn rejected(
        signed: &SignedOperation,
        error: &RegistryError,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        let status = TxStatus::Rejected {
            kind: error.kind(),
            reason: error.to_string(),
        };
        Self::from_signed(signed, status, recorded_at)
    }

    fn from_signed(signed: &SignedOperation, status: TxStatus, recorded_at: DateTime<Utc>) -> Self {
        Self {
            tx_id: signed.tx_id,
            signer: signed.signer,
            operation: signed.operation.clone(),
            signature: signed.signature.clone(),
            status,
            recorded_at,
        }
    }

    /// Commit sequence, if this transaction committed.
    pub fn sequence(&self) -> Option<u64> {
        match self.status {
            TxStatus::Committed { sequence } => Some(sequence),
            TxStatus::Rejected { .. } => None,
        }
    }

    /// Rebuild the signed envelope, e.g. to re-verify during replay.
    pub fn to_signed(&self) -> SignedOperation {
        SignedOperation {
            tx_id: self.tx_id,
            signer: self.signer,
            operation: self.operation.clone(),
            signature: self.signature.clone(),
        }
    }
}
