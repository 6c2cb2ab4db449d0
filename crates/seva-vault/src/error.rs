//! # Vault Error Types

use thiserror::Error;

use seva_core::{DocumentId, IdentityId, SevaError, ValidationFailure};

/// Errors from vault and blob store operations.
#[derive(Error, Debug)]
pub enum VaultError {
    /// Upload metadata or content failed validation.
    #[error("invalid upload: {0}")]
    InvalidUpload(ValidationFailure),

    /// Content exceeds the configured upload limit.
    #[error("document is {size} bytes, limit is {limit}")]
    TooLarge { size: u64, limit: u64 },

    /// A non-staff identity tried to upload into someone else's vault.
    #[error("{uploader} may not upload documents for {owner}")]
    OnBehalfNotPermitted { uploader: IdentityId, owner: IdentityId },

    /// Uploader or owner is soft-revoked.
    #[error("identity {0} has been revoked")]
    Revoked(IdentityId),

    /// No document with this id.
    #[error("{0} not found")]
    NotFound(DocumentId),

    /// Stored bytes are missing or no longer match the recorded digest.
    #[error("content of {id} failed integrity check: {detail}")]
    Integrity { id: DocumentId, detail: String },

    /// Blob backend I/O failure.
    #[error("blob store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<VaultError> for SevaError {
    fn from(err: VaultError) -> Self {
        match err {
            VaultError::InvalidUpload(failure) => SevaError::ValidationFailed(failure),
            VaultError::TooLarge { .. } | VaultError::OnBehalfNotPermitted { .. } => {
                SevaError::validation(err.to_string())
            }
            VaultError::Revoked(_) => SevaError::StateConflict(err.to_string()),
            VaultError::NotFound(_) => SevaError::NotFound(err.to_string()),
            VaultError::Integrity { .. } | VaultError::Io(_) => {
                SevaError::StorageFailure(err.to_string())
            }
        }
    }
}
