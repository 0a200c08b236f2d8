//! # dcloud-store
//!
//! Ledger state for the DCloud registry.
//!
//! Live records sit in a [`RecordArena`] keyed by deterministic address and
//! committed with per-address optimistic concurrency. Every terminal
//! transaction outcome is appended to a [`Journal`], by default a SQLite
//! database whose rows can never be updated or deleted.

pub mod arena;
pub mod database;
pub mod journal;
pub mod migrations;
pub mod models;

mod error;

pub use arena::{RecordArena, StagedTransaction, Versioned};
pub use database::Database;
pub use error::{Result, StoreError};
pub use journal::{Journal, MemoryJournal, SqliteJournal};
pub use models::*;
