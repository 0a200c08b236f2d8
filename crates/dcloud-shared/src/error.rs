use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Address, UserId};

/// Typed rejection returned by every registry operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Storage account for {0} has not been initialized")]
    NotInitialized(UserId),

    #[error("Record already exists at {0}")]
    AlreadyExists(Address),

    #[error("No live record at {0}")]
    NotFound(Address),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage quota exceeded: {requested} bytes requested, limit {limit}")]
    Overflow { requested: u128, limit: u64 },

    #[error("Concurrent update to {0}, re-read state and resubmit")]
    Conflict(Address),

    #[error("Outcome unknown: {0}")]
    Unknown(String),

    #[error("Transaction {0} was already submitted")]
    Replayed(uuid::Uuid),

    #[error("Ledger storage error: {0}")]
    Storage(String),
}

/// Stable discriminant of [`RegistryError`], persisted in the journal and
/// used by collaborators to pick a user-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    NotInitialized,
    AlreadyExists,
    NotFound,
    Unauthorized,
    InvalidInput,
    Overflow,
    Conflict,
    Unknown,
    Replayed,
    Storage,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotInitialized => "not_initialized",
            Self::AlreadyExists => "already_exists",
            Self::NotFound => "not_found",
            Self::Unauthorized => "unauthorized",
            Self::InvalidInput => "invalid_input",
            Self::Overflow => "overflow",
            Self::Conflict => "conflict",
            Self::Unknown => "unknown",
            Self::Replayed => "replayed",
            Self::Storage => "storage",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let kind = match s {
            "not_initialized" => Self::NotInitialized,
            "already_exists" => Self::AlreadyExists,
            "not_found" => Self::NotFound,
            "unauthorized" => Self::Unauthorized,
            "invalid_input" => Self::InvalidInput,
            "overflow" => Self::Overflow,
            "conflict" => Self::Conflict,
            "unknown" => Self::Unknown,
            "replayed" => Self::Replayed,
            "storage" => Self::Storage,
            _ => return None,
        };
        Some(kind)
    }
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotInitialized(_) => ErrorKind::NotInitialized,
            Self::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::Overflow { .. } => ErrorKind::Overflow,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Unknown(_) => ErrorKind::Unknown,
            Self::Replayed(_) => ErrorKind::Replayed,
            Self::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Only a lost race or an ambiguous outcome may be retried, and only
    /// after the caller has re-read the affected records.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::Unknown(_))
    }
}

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Invalid key bytes")]
    InvalidKeyBytes,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Failed to encode signing payload: {0}")]
    Encoding(#[from] bincode::Error),
}
