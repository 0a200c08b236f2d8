//! v001 -- Transaction journal.
//!
//! One row per terminal transaction outcome. Rows are never rewritten:
//! triggers abort any UPDATE or DELETE.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS transactions (
    position    INTEGER PRIMARY KEY AUTOINCREMENT,
    tx_id       TEXT NOT NULL UNIQUE,         -- UUID v4
    signer      TEXT NOT NULL,                -- hex-encoded pubkey
    operation   TEXT NOT NULL,                -- JSON-encoded Operation
    signature   TEXT NOT NULL,                -- hex-encoded Ed25519 signature
    status      TEXT NOT NULL CHECK (status IN ('committed', 'rejected')),
    sequence    INTEGER UNIQUE,               -- commit order, NULL when rejected
    error_kind  TEXT,                         -- NULL when committed
    reason      TEXT,
    recorded_at TEXT NOT NULL,                -- RFC-3339

    CHECK ((status = 'committed') = (sequence IS NOT NULL))
);

CREATE INDEX IF NOT EXISTS idx_transactions_signer ON transactions(signer);

CREATE TRIGGER IF NOT EXISTS transactions_no_update
BEFORE UPDATE ON transactions
BEGIN
    SELECT RAISE(ABORT, 'transactions are append-only');
END;

CREATE TRIGGER IF NOT EXISTS transactions_no_delete
BEFORE DELETE ON transactions
BEGIN
    SELECT RAISE(ABORT, 'transactions are append-only');
END;
"#;

/// Apply the journal migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
