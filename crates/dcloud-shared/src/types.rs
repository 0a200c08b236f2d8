use serde::{Deserialize, Serialize};

use crate::constants::{ADDRESS_SIZE, FINGERPRINT_SIZE, PUBKEY_SIZE};
use crate::error::RegistryError;

// User identity = Ed25519 public key (32 bytes)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub [u8; PUBKEY_SIZE]);

impl UserId {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, RegistryError> {
        decode_fixed(s, "user id").map(Self)
    }

    pub fn short(&self) -> String {
        self.to_hex()[..8].to_string()
    }

    pub fn as_bytes(&self) -> &[u8; PUBKEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Content fingerprint of a file's bytes. Unique within an owner's namespace.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileHash(pub [u8; FINGERPRINT_SIZE]);

impl FileHash {
    /// BLAKE3 digest over the actual file bytes.
    pub fn of(content: &[u8]) -> Self {
        Self(*blake3::hash(content).as_bytes())
    }

    /// Parse a fingerprint, rejecting anything that is not exactly
    /// [`FINGERPRINT_SIZE`] bytes wide.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, RegistryError> {
        let arr: [u8; FINGERPRINT_SIZE] = bytes.try_into().map_err(|_| {
            RegistryError::InvalidInput(format!(
                "fingerprint must be {FINGERPRINT_SIZE} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(arr))
    }

    pub fn from_hex(s: &str) -> Result<Self, RegistryError> {
        decode_fixed(s, "fingerprint").map(Self)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; FINGERPRINT_SIZE] {
        &self.0
    }
}

impl std::fmt::Display for FileHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Deterministic record locator, see [`crate::address`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(pub [u8; ADDRESS_SIZE]);

impl Address {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, RegistryError> {
        decode_fixed(s, "address").map(Self)
    }

    pub fn short(&self) -> String {
        self.to_hex()[..8].to_string()
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

fn decode_fixed<const N: usize>(s: &str, what: &str) -> Result<[u8; N], RegistryError> {
    let bytes = hex::decode(s.trim())
        .map_err(|e| RegistryError::InvalidInput(format!("{what} is not valid hex: {e}")))?;
    bytes.as_slice().try_into().map_err(|_| {
        RegistryError::InvalidInput(format!("{what} must be {N} bytes, got {}", bytes.len()))
    })
}
