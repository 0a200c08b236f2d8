//! Per-owner storage accounts.
//!
//! `reserve` is the only path that changes an account's aggregates; uploads
//! and removals go through it inside the same staged transaction as the file
//! record they touch, so both commit or neither does.

use chrono::{DateTime, Utc};
use dcloud_shared::address::storage_address;
use dcloud_shared::{RegistryError, UserId};
use dcloud_store::{QuotaDelta, Record, RecordArena, StagedTransaction, StorageAccount};
use serde::Serialize;
use tracing::{debug, info};

/// Aggregates of one owner, either recorded on the account or re-derived
/// from the live file set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Usage {
    pub files: u64,
    pub bytes: u64,
}

/// An owner whose account disagrees with its live files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuotaMismatch {
    pub owner: UserId,
    /// `None` when live files exist without an account
    pub recorded: Option<Usage>,
    pub derived: Usage,
}

#[derive(Debug, Clone)]
pub struct StorageQuotaLedger {
    max_bytes_per_account: Option<u64>,
}

impl StorageQuotaLedger {
    pub fn new(max_bytes_per_account: Option<u64>) -> Self {
        Self {
            max_bytes_per_account,
        }
    }

    pub fn max_bytes_per_account(&self) -> Option<u64> {
        self.max_bytes_per_account
    }

    /// Create a zeroed account. A second call for the same owner fails with
    /// `AlreadyExists`, which callers treat as "already initialized".
    pub fn initialize(
        &self,
        tx: &mut StagedTransaction<'_>,
        owner: &UserId,
        now: DateTime<Utc>,
    ) -> Result<StorageAccount, RegistryError> {
        let address = storage_address(owner);
        if tx.read(&address).is_some() {
            return Err(RegistryError::AlreadyExists(address));
        }

        let account = StorageAccount::new(*owner, now);
        tx.write(address, Record::Storage(account.clone()));
        debug!(owner = %owner.short(), "storage account staged");
        Ok(account)
    }

    /// Apply `delta` to the owner's account.
    pub fn reserve(
        &self,
        tx: &mut StagedTransaction<'_>,
        owner: &UserId,
        delta: QuotaDelta,
    ) -> Result<StorageAccount, RegistryError> {
        let address = storage_address(owner);
        let account = tx
            .read(&address)
            .and_then(|r| r.as_storage().cloned())
            .ok_or(RegistryError::NotInitialized(*owner))?;

        let updated = account.apply(delta, self.max_bytes_per_account)?;
        tx.write(address, Record::Storage(updated.clone()));
        Ok(updated)
    }

    /// Fail with `NotInitialized` unless the owner has an account.
    pub fn require(
        &self,
        tx: &mut StagedTransaction<'_>,
        owner: &UserId,
    ) -> Result<StorageAccount, RegistryError> {
        tx.read(&storage_address(owner))
            .and_then(|r| r.as_storage().cloned())
            .ok_or(RegistryError::NotInitialized(*owner))
    }

    /// Committed account of `owner`.
    pub fn query(
        &self,
        arena: &RecordArena,
        owner: &UserId,
    ) -> Result<StorageAccount, RegistryError> {
        let address = storage_address(owner);
        arena
            .get(&address)
            .record
            .and_then(|r| r.as_storage().cloned())
            .ok_or(RegistryError::NotFound(address))
    }

    /// Re-derive every owner's aggregates from the live file records and
    /// report accounts that disagree. Meant for a quiescent arena, e.g.
    /// right after a journal replay.
    pub fn audit(&self, arena: &RecordArena) -> Vec<QuotaMismatch> {
        let mut mismatches = Vec::new();

        for owner in arena.owners() {
            let mut recorded = None;
            let mut derived = Usage::default();

            for address in arena.addresses_owned_by(&owner) {
                match arena.get(&address).record {
                    Some(Record::Storage(account)) => {
                        recorded = Some(Usage {
                            files: account.total_files(),
                            bytes: account.total_storage_used(),
                        });
                    }
                    Some(Record::File(file)) if file.alive => {
                        derived.files += 1;
                        derived.bytes = derived.bytes.saturating_add(file.file_size);
                    }
                    _ => {}
                }
            }

            let consistent = match recorded {
                Some(usage) => usage == derived,
                None => derived == Usage::default(),
            };
            if !consistent {
                mismatches.push(QuotaMismatch {
                    owner,
                    recorded,
                    derived,
                });
            }
        }

        info!(
            owners = arena.owners().len(),
            mismatches = mismatches.len(),
            "quota audit finished"
        );
        mismatches
    }
}
