use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::SIGNING_DOMAIN;
use crate::error::{IdentityError, RegistryError};
use crate::identity::{verify_signature, Identity};
use crate::types::{FileHash, UserId};

/// All state transitions the registry accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// One-time creation of the owner's storage account
    InitializeStorage { owner: UserId },

    /// Register a file's metadata and charge it to the owner's quota
    UploadFile(UploadFile),

    /// Tombstone a file and release its quota
    RemoveFile { owner: UserId, file_hash: FileHash },

    /// Share or unshare a file
    SetVisibility {
        owner: UserId,
        file_hash: FileHash,
        is_public: bool,
    },

    /// Download by the signer; bumps the record's access count
    ReadFile { owner: UserId, file_hash: FileHash },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadFile {
    pub owner: UserId,
    pub file_hash: FileHash,
    pub file_name: String,
    pub file_size: u64,
    /// Opaque reference into the blob store (e.g. an IPFS CID)
    pub content_locator: String,
    pub encryption_key: Option<String>,
}

impl Operation {
    /// Owner of the records this operation addresses.
    pub fn owner(&self) -> &UserId {
        match self {
            Self::InitializeStorage { owner }
            | Self::RemoveFile { owner, .. }
            | Self::SetVisibility { owner, .. }
            | Self::ReadFile { owner, .. } => owner,
            Self::UploadFile(upload) => &upload.owner,
        }
    }

    /// Whether only the owner may sign this operation. Reads are open to
    /// anyone; visibility is checked against the record.
    pub fn requires_owner(&self) -> bool {
        !matches!(self, Self::ReadFile { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::InitializeStorage { .. } => "initialize_storage",
            Self::UploadFile(_) => "upload_file",
            Self::RemoveFile { .. } => "remove_file",
            Self::SetVisibility { .. } => "set_visibility",
            Self::ReadFile { .. } => "read_file",
        }
    }
}

/// An operation together with the signer's authorization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedOperation {
    /// Unique per submission; a ledger accepts each id at most once
    pub tx_id: Uuid,
    pub signer: UserId,
    pub operation: Operation,
    /// Ed25519 signature over [`signing_payload`]
    pub signature: Vec<u8>,
}

/// payload = bincode(domain || tx_id || signer || operation)
pub fn signing_payload(
    tx_id: &Uuid,
    signer: &UserId,
    operation: &Operation,
) -> Result<Vec<u8>, bincode::Error> {
    bincode::serialize(&(SIGNING_DOMAIN, tx_id.as_bytes(), signer, operation))
}

impl SignedOperation {
    /// Sign `operation` under a fresh transaction id.
    pub fn sign(identity: &Identity, operation: Operation) -> Result<Self, IdentityError> {
        let tx_id = Uuid::new_v4();
        let signer = identity.user_id();
        let payload = signing_payload(&tx_id, &signer, &operation)?;
        let signature = identity.sign(&payload).to_bytes().to_vec();
        Ok(Self {
            tx_id,
            signer,
            operation,
            signature,
        })
    }

    /// Check the signature and, for owner-only operations, that the signer
    /// is the owner being acted on.
    pub fn authenticate(&self) -> Result<(), RegistryError> {
        self.verify()?;
        self.authorize()
    }

    /// Check that `signature` was produced by `signer` over this envelope.
    pub fn verify(&self) -> Result<(), RegistryError> {
        let payload = signing_payload(&self.tx_id, &self.signer, &self.operation)
            .map_err(|e| RegistryError::InvalidInput(format!("unencodable operation: {e}")))?;

        verify_signature(&self.signer, &payload, &self.signature).map_err(|e| {
            RegistryError::Unauthorized(format!("signature check failed for {}: {e}", self.signer))
        })
    }

    /// Check that the signer may perform the operation at all.
    pub fn authorize(&self) -> Result<(), RegistryError> {
        if self.operation.requires_owner() && self.operation.owner() != &self.signer {
            return Err(RegistryError::Unauthorized(format!(
                "{} may not {} on behalf of {}",
                self.signer.short(),
                self.operation.name(),
                self.operation.owner().short()
            )));
        }
        Ok(())
    }

    /// Serialize to binary (bincode)
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize from binary
    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}
