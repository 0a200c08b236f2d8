/// Application name
pub const APP_NAME: &str = "DCloud";

/// Ed25519 public key size in bytes
pub const PUBKEY_SIZE: usize = 32;

/// Ed25519 secret key size in bytes
pub const SECRET_KEY_SIZE: usize = 32;

/// Width of a file fingerprint (BLAKE3 digest) in bytes
pub const FINGERPRINT_SIZE: usize = 32;

/// Width of a derived record address in bytes
pub const ADDRESS_SIZE: usize = 32;

/// Default upper bound on file name length, in characters
pub const MAX_FILE_NAME_LEN: usize = 256;

/// Upper bound on content locator length (e.g. an IPFS CID), in characters
pub const MAX_CONTENT_LOCATOR_LEN: usize = 128;

/// Upper bound on the opaque encryption key reference, in characters
pub const MAX_ENCRYPTION_KEY_LEN: usize = 256;

/// Address namespaces
pub const NAMESPACE_STORAGE: &str = "storage";
pub const NAMESPACE_FILE: &str = "file";

/// Key derivation / domain separation contexts (BLAKE3)
pub const KDF_CONTEXT_ADDRESS: &str = "dcloud-address-v1";

/// Domain tag prepended to every signed operation payload
pub const SIGNING_DOMAIN: &str = "dcloud-op-v1";
