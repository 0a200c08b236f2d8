//! Deterministic record addressing.
//!
//! `Derive` is BLAKE3 in key-derivation mode under [`KDF_CONTEXT_ADDRESS`],
//! fed every segment as `u32-LE length || bytes`. Length-prefixing keeps
//! `("ab", "c")` and `("a", "bc")` apart.
//!
//! - storage account: `Derive("storage", owner)`
//! - file record:     `Derive("file", owner, fileHash)`

use crate::constants::{FINGERPRINT_SIZE, KDF_CONTEXT_ADDRESS, NAMESPACE_FILE, NAMESPACE_STORAGE};
use crate::error::RegistryError;
use crate::types::{Address, FileHash, UserId};

/// Derive the address of a record from its namespace, owner and optional
/// discriminator. The discriminator, when present, must be exactly one
/// fingerprint wide.
pub fn derive(
    namespace: &str,
    owner: &UserId,
    discriminator: Option<&[u8]>,
) -> Result<Address, RegistryError> {
    match discriminator {
        None => Ok(derive_segments(&[namespace.as_bytes(), owner.as_bytes()])),
        Some(d) if d.len() == FINGERPRINT_SIZE => {
            Ok(derive_segments(&[namespace.as_bytes(), owner.as_bytes(), d]))
        }
        Some(d) => Err(RegistryError::InvalidInput(format!(
            "discriminator must be {FINGERPRINT_SIZE} bytes, got {}",
            d.len()
        ))),
    }
}

/// Address of the single storage account owned by `owner`.
pub fn storage_address(owner: &UserId) -> Address {
    derive_segments(&[NAMESPACE_STORAGE.as_bytes(), owner.as_bytes()])
}

/// Address of the file record for `(owner, file_hash)`.
pub fn file_address(owner: &UserId, file_hash: &FileHash) -> Address {
    derive_segments(&[
        NAMESPACE_FILE.as_bytes(),
        owner.as_bytes(),
        file_hash.as_bytes(),
    ])
}

fn derive_segments(segments: &[&[u8]]) -> Address {
    let mut hasher = blake3::Hasher::new_derive_key(KDF_CONTEXT_ADDRESS);
    for segment in segments {
        hasher.update(&(segment.len() as u32).to_le_bytes());
        hasher.update(segment);
    }
    Address(*hasher.finalize().as_bytes())
}
