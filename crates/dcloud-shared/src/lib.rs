//! # dcloud-shared
//!
//! Types shared by every DCloud crate: owner identities and their Ed25519
//! keys, content fingerprints, deterministic record addresses, the signed
//! operation envelope and the registry's error taxonomy.

pub mod address;
pub mod constants;
pub mod error;
pub mod identity;
pub mod protocol;
pub mod types;

pub use error::{ErrorKind, IdentityError, RegistryError};
pub use identity::Identity;
pub use protocol::{Operation, SignedOperation, UploadFile};
pub use types::{Address, FileHash, UserId};
