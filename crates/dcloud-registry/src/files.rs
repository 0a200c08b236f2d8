//! File metadata records.
//!
//! One [`FileRecord`] per `(owner, file_hash)`. Removal tombstones the record
//! instead of erasing it; a tombstoned address may be uploaded to again,
//! which starts a fresh live record.

use chrono::{DateTime, Utc};
use dcloud_shared::address::file_address;
use dcloud_shared::constants::{MAX_CONTENT_LOCATOR_LEN, MAX_ENCRYPTION_KEY_LEN};
use dcloud_shared::{Address, FileHash, RegistryError, UploadFile, UserId};
use dcloud_store::{FileRecord, QuotaDelta, Record, RecordArena, StagedTransaction};
use tracing::debug;

use crate::quota::StorageQuotaLedger;

#[derive(Debug, Clone)]
pub struct FileRegistry {
    quota: StorageQuotaLedger,
    max_file_name_len: usize,
}

impl FileRegistry {
    pub fn new(quota: StorageQuotaLedger, max_file_name_len: usize) -> Self {
        Self {
            quota,
            max_file_name_len,
        }
    }

    pub fn quota(&self) -> &StorageQuotaLedger {
        &self.quota
    }

    /// Register a file and charge it to the owner's account.
    pub fn upload(
        &self,
        tx: &mut StagedTransaction<'_>,
        upload: &UploadFile,
        now: DateTime<Utc>,
    ) -> Result<FileRecord, RegistryError> {
        self.validate_upload(upload)?;
        self.quota.require(tx, &upload.owner)?;

        let address = file_address(&upload.owner, &upload.file_hash);
        if live_file(tx, &address).is_some() {
            return Err(RegistryError::AlreadyExists(address));
        }

        self.quota.reserve(
            tx,
            &upload.owner,
            QuotaDelta::Grow {
                bytes: upload.file_size,
                files: 1,
            },
        )?;

        let record = FileRecord {
            address,
            owner: upload.owner,
            file_hash: upload.file_hash,
            file_name: upload.file_name.clone(),
            file_size: upload.file_size,
            content_locator: upload.content_locator.clone(),
            upload_timestamp: now,
            is_public: false,
            access_count: 0,
            encryption_key: upload.encryption_key.clone(),
            alive: true,
        };
        tx.write(address, Record::File(record.clone()));

        debug!(
            owner = %upload.owner.short(),
            file = %address.short(),
            size = upload.file_size,
            "file upload staged"
        );
        Ok(record)
    }

    /// Tombstone a file and release its quota. Returns the dead record.
    pub fn remove(
        &self,
        tx: &mut StagedTransaction<'_>,
        caller: &UserId,
        owner: &UserId,
        file_hash: &FileHash,
    ) -> Result<FileRecord, RegistryError> {
        ensure_owner(caller, owner, "remove")?;
        let address = file_address(owner, file_hash);
        let mut record = live_file(tx, &address).ok_or(RegistryError::NotFound(address))?;

        self.quota.reserve(
            tx,
            owner,
            QuotaDelta::Shrink {
                bytes: record.file_size,
                files: 1,
            },
        )?;

        record.alive = false;
        tx.write(address, Record::File(record.clone()));
        Ok(record)
    }

    /// Share or unshare a file. Setting the current value succeeds without
    /// writing anything.
    pub fn set_visibility(
        &self,
        tx: &mut StagedTransaction<'_>,
        caller: &UserId,
        owner: &UserId,
        file_hash: &FileHash,
        is_public: bool,
    ) -> Result<FileRecord, RegistryError> {
        ensure_owner(caller, owner, "change visibility of")?;
        let address = file_address(owner, file_hash);
        let mut record = live_file(tx, &address).ok_or(RegistryError::NotFound(address))?;

        if record.is_public != is_public {
            record.is_public = is_public;
            tx.write(address, Record::File(record.clone()));
        }
        Ok(record)
    }

    /// Download by `requester`: allowed for the owner or when the file is
    /// public. Every successful read counts, including the owner's own.
    pub fn read(
        &self,
        tx: &mut StagedTransaction<'_>,
        requester: &UserId,
        owner: &UserId,
        file_hash: &FileHash,
    ) -> Result<FileRecord, RegistryError> {
        let address = file_address(owner, file_hash);
        let mut record = live_file(tx, &address).ok_or(RegistryError::NotFound(address))?;

        if requester != owner && !record.is_public {
            return Err(RegistryError::Unauthorized(format!(
                "file {} is private to its owner",
                address.short()
            )));
        }

        record.access_count =
            record
                .access_count
                .checked_add(1)
                .ok_or(RegistryError::Overflow {
                    requested: u128::from(record.access_count) + 1,
                    limit: u64::MAX,
                })?;
        tx.write(address, Record::File(record.clone()));
        Ok(record)
    }

    /// Committed live record, without counting an access.
    pub fn get(
        &self,
        arena: &RecordArena,
        owner: &UserId,
        file_hash: &FileHash,
    ) -> Result<FileRecord, RegistryError> {
        let address = file_address(owner, file_hash);
        arena
            .get(&address)
            .record
            .and_then(|r| r.as_file().cloned())
            .filter(|f| f.alive)
            .ok_or(RegistryError::NotFound(address))
    }

    /// Live files of `owner`, oldest upload first. Ties break on address so
    /// repeated calls over unchanged state return the same order.
    pub fn list_by_owner(&self, arena: &RecordArena, owner: &UserId) -> Vec<FileRecord> {
        let mut files: Vec<FileRecord> = arena
            .addresses_owned_by(owner)
            .iter()
            .filter_map(|addr| arena.get(addr).record)
            .filter_map(|record| match record {
                Record::File(file) if file.alive => Some(file),
                _ => None,
            })
            .collect();
        files.sort_by(|a, b| {
            a.upload_timestamp
                .cmp(&b.upload_timestamp)
                .then_with(|| a.address.cmp(&b.address))
        });
        files
    }

    fn validate_upload(&self, upload: &UploadFile) -> Result<(), RegistryError> {
        if upload.file_size == 0 {
            return Err(RegistryError::InvalidInput("file size must be positive".into()));
        }

        let name_len = upload.file_name.chars().count();
        if upload.file_name.trim().is_empty() {
            return Err(RegistryError::InvalidInput("file name is empty".into()));
        }
        if name_len > self.max_file_name_len {
            return Err(RegistryError::InvalidInput(format!(
                "file name is {name_len} characters, limit {}",
                self.max_file_name_len
            )));
        }

        if upload.content_locator.is_empty() {
            return Err(RegistryError::InvalidInput("content locator is empty".into()));
        }
        if upload.content_locator.chars().count() > MAX_CONTENT_LOCATOR_LEN {
            return Err(RegistryError::InvalidInput(format!(
                "content locator exceeds {MAX_CONTENT_LOCATOR_LEN} characters"
            )));
        }

        if let Some(key) = &upload.encryption_key {
            if key.is_empty() || key.chars().count() > MAX_ENCRYPTION_KEY_LEN {
                return Err(RegistryError::InvalidInput(format!(
                    "encryption key must be 1..={MAX_ENCRYPTION_KEY_LEN} characters"
                )));
            }
        }
        Ok(())
    }
}

fn live_file(tx: &mut StagedTransaction<'_>, address: &Address) -> Option<FileRecord> {
    tx.read(address)
        .and_then(|r| r.as_file().cloned())
        .filter(|f| f.alive)
}

fn ensure_owner(caller: &UserId, owner: &UserId, action: &str) -> Result<(), RegistryError> {
    if caller != owner {
        return Err(RegistryError::Unauthorized(format!(
            "only the owner may {action} this file"
        )));
    }
    Ok(())
}
