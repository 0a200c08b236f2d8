//! # dcloud-registry
//!
//! File registry of the DCloud network: per-owner storage accounts, file
//! metadata records and the transaction executor that commits signed
//! operations against them.
//!
//! - [`StorageQuotaLedger`] keeps each owner's file count and byte total.
//! - [`FileRegistry`] enforces upload, removal, sharing and read rules.
//! - [`TransactionExecutor`] authenticates submissions, commits them with
//!   optimistic concurrency and journals every outcome.
//! - [`RegistryClient`] is the async façade the UI talks to.

pub mod client;
pub mod config;
pub mod executor;
pub mod files;
pub mod quota;

pub use client::RegistryClient;
pub use config::RegistryConfig;
pub use executor::{Outcome, PreparedTransaction, Receipt, TransactionExecutor};
pub use files::FileRegistry;
pub use quota::{QuotaMismatch, StorageQuotaLedger, Usage};
