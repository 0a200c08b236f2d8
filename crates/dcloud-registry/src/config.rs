//! Registry configuration loaded from environment variables.
//!
//! All settings have sensible defaults so a registry can start with zero
//! configuration for local development.

use std::path::PathBuf;
use std::time::Duration;

use dcloud_shared::constants::MAX_FILE_NAME_LEN;

/// Registry configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Per-account quota ceiling in bytes (`None` = unbounded).
    /// Env: `DCLOUD_MAX_BYTES_PER_ACCOUNT`
    /// Default: unbounded
    pub max_bytes_per_account: Option<u64>,

    /// Maximum file name length, in characters.
    /// Env: `DCLOUD_MAX_FILE_NAME_LEN`
    /// Default: `256`
    pub max_file_name_len: usize,

    /// How long a client waits for a submission before reporting `Unknown`.
    /// Env: `DCLOUD_SUBMIT_TIMEOUT_MS`
    /// Default: 30 s
    pub submit_timeout: Duration,

    /// SQLite journal location.
    /// Env: `DCLOUD_JOURNAL_PATH`
    /// Default: platform data directory (`dcloud/journal.db`)
    pub journal_path: Option<PathBuf>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_bytes_per_account: None,
            max_file_name_len: MAX_FILE_NAME_LEN,
            submit_timeout: Duration::from_secs(30),
            journal_path: None,
        }
    }
}

impl RegistryConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(val) = lookup("DCLOUD_MAX_BYTES_PER_ACCOUNT") {
            match val.trim().parse::<u64>() {
                Ok(limit) => config.max_bytes_per_account = Some(limit),
                Err(e) => tracing::warn!(
                    value = %val,
                    error = %e,
                    "Invalid DCLOUD_MAX_BYTES_PER_ACCOUNT, quota stays unbounded"
                ),
            }
        }

        if let Some(val) = lookup("DCLOUD_MAX_FILE_NAME_LEN") {
            match val.trim().parse::<usize>() {
                Ok(n) if n > 0 => config.max_file_name_len = n,
                _ => tracing::warn!(
                    value = %val,
                    "Invalid DCLOUD_MAX_FILE_NAME_LEN, using default"
                ),
            }
        }

        if let Some(val) = lookup("DCLOUD_SUBMIT_TIMEOUT_MS") {
            match val.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => config.submit_timeout = Duration::from_millis(ms),
                _ => tracing::warn!(
                    value = %val,
                    "Invalid DCLOUD_SUBMIT_TIMEOUT_MS, using default"
                ),
            }
        }

        if let Some(path) = lookup("DCLOUD_JOURNAL_PATH") {
            if !path.is_empty() {
                config.journal_path = Some(PathBuf::from(path));
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter.

        config
    }
}
