//! Append-only transaction journal.
//!
//! The journal is the ledger's source of truth: registry state can always be
//! rebuilt by replaying its committed entries in sequence order.

use chrono::{DateTime, Utc};
use dcloud_shared::{ErrorKind, UserId};
use parking_lot::Mutex;
use rusqlite::params;
use uuid::Uuid;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{TransactionRecord, TxStatus};

/// Sink for terminal transaction outcomes.
pub trait Journal: Send + Sync {
    /// Durably append one entry. Entries are never rewritten.
    fn append(&self, record: &TransactionRecord) -> Result<()>;

    /// Every entry, in append order.
    fn records(&self) -> Result<Vec<TransactionRecord>>;

    /// Committed entries in commit-sequence order.
    fn committed(&self) -> Result<Vec<TransactionRecord>> {
        let mut committed: Vec<_> = self
            .records()?
            .into_iter()
            .filter(|r| r.sequence().is_some())
            .collect();
        committed.sort_by_key(|r| r.sequence());
        Ok(committed)
    }
}

// ---------------------------------------------------------------------------
// SQLite
// ---------------------------------------------------------------------------

impl Database {
    pub fn append_transaction(&self, record: &TransactionRecord) -> Result<()> {
        let (status, sequence, error_kind, reason) = match &record.status {
            TxStatus::Committed { sequence } => ("committed", Some(*sequence as i64), None, None),
            TxStatus::Rejected { kind, reason } => {
                ("rejected", None, Some(kind.as_str()), Some(reason.as_str()))
            }
        };

        self.conn().execute(
            "INSERT INTO transactions
                 (tx_id, signer, operation, signature, status, sequence, error_kind, reason, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                record.tx_id.to_string(),
                record.signer.to_hex(),
                serde_json::to_string(&record.operation)?,
                hex::encode(&record.signature),
                status,
                sequence,
                error_kind,
                reason,
                record.recorded_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_transaction(&self, tx_id: Uuid) -> Result<TransactionRecord> {
        let raw = self
            .conn()
            .query_row(
                "SELECT tx_id, signer, operation, signature, status, sequence, error_kind, reason, recorded_at
                 FROM transactions
                 WHERE tx_id = ?1",
                params![tx_id.to_string()],
                RawTransaction::from_row,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })?;
        raw.decode()
    }

    /// All journal entries in append order.
    pub fn list_transactions(&self) -> Result<Vec<TransactionRecord>> {
        self.query_transactions(
            "SELECT tx_id, signer, operation, signature, status, sequence, error_kind, reason, recorded_at
             FROM transactions
             ORDER BY position ASC",
        )
    }

    /// Committed entries in commit-sequence order.
    pub fn committed_transactions(&self) -> Result<Vec<TransactionRecord>> {
        self.query_transactions(
            "SELECT tx_id, signer, operation, signature, status, sequence, error_kind, reason, recorded_at
             FROM transactions
             WHERE status = 'committed'
             ORDER BY sequence ASC",
        )
    }

    fn query_transactions(&self, sql: &str) -> Result<Vec<TransactionRecord>> {
        let mut stmt = self.conn().prepare(sql)?;
        let rows = stmt.query_map([], RawTransaction::from_row)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?.decode()?);
        }
        Ok(records)
    }
}

/// Journal backed by a SQLite [`Database`].
pub struct SqliteJournal {
    db: Mutex<Database>,
}

impl SqliteJournal {
    pub fn new(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }
}

impl Journal for SqliteJournal {
    fn append(&self, record: &TransactionRecord) -> Result<()> {
        self.db.lock().append_transaction(record)
    }

    fn records(&self) -> Result<Vec<TransactionRecord>> {
        self.db.lock().list_transactions()
    }

    fn committed(&self) -> Result<Vec<TransactionRecord>> {
        self.db.lock().committed_transactions()
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Volatile journal for tests and throwaway registries.
#[derive(Default)]
pub struct MemoryJournal {
    records: Mutex<Vec<TransactionRecord>>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Journal for MemoryJournal {
    fn append(&self, record: &TransactionRecord) -> Result<()> {
        let mut records = self.records.lock();
        if records.iter().any(|r| r.tx_id == record.tx_id) {
            return Err(StoreError::Corrupt(format!(
                "transaction {} already journaled",
                record.tx_id
            )));
        }
        records.push(record.clone());
        Ok(())
    }

    fn records(&self) -> Result<Vec<TransactionRecord>> {
        Ok(self.records.lock().clone())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Columns of a `transactions` row before decoding.
struct RawTransaction {
    tx_id: String,
    signer: String,
    operation: String,
    signature: String,
    status: String,
    sequence: Option<i64>,
    error_kind: Option<String>,
    reason: Option<String>,
    recorded_at: String,
}

impl RawTransaction {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            tx_id: row.get(0)?,
            signer: row.get(1)?,
            operation: row.get(2)?,
            signature: row.get(3)?,
            status: row.get(4)?,
            sequence: row.get(5)?,
            error_kind: row.get(6)?,
            reason: row.get(7)?,
            recorded_at: row.get(8)?,
        })
    }

    fn decode(self) -> Result<TransactionRecord> {
        let tx_id = Uuid::parse_str(&self.tx_id)?;
        let signer =
            UserId::from_hex(&self.signer).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let operation = serde_json::from_str(&self.operation)?;
        let signature = hex::decode(&self.signature)?;
        let recorded_at: DateTime<Utc> =
            DateTime::parse_from_rfc3339(&self.recorded_at)?.with_timezone(&Utc);

        let status = match (self.status.as_str(), self.sequence) {
            ("committed", Some(sequence)) if sequence >= 0 => TxStatus::Committed {
                sequence: sequence as u64,
            },
            ("rejected", None) => {
                let kind = self
                    .error_kind
                    .as_deref()
                    .and_then(ErrorKind::parse)
                    .ok_or_else(|| {
                        StoreError::Corrupt(format!("tx {tx_id}: missing or unknown error kind"))
                    })?;
                TxStatus::Rejected {
                    kind,
                    reason: self.reason.unwrap_or_default(),
                }
            }
            (status, _) => {
                return Err(StoreError::Corrupt(format!(
                    "tx {tx_id}: inconsistent status '{status}'"
                )))
            }
        };

        Ok(TransactionRecord {
            tx_id,
            signer,
            operation,
            signature,
            status,
            recorded_at,
        })
    }
}
