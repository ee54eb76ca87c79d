//! Error taxonomy for secret operations
//!
//! Fatal kinds abort the operation and should not be retried in the same
//! session. Everything else leaves the caller's view usable.

use hereandalways_crypto::CryptoError;
use hereandalways_storage::{ApiError, BlobLocation, ObjectStoreError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SecretError {
    #[error("Cryptographic provider unavailable")]
    ProviderUnavailable,

    #[error("Secure randomness unavailable")]
    RandomnessFailure,

    #[error("Upload failed: {0}")]
    UploadFailure(String),

    #[error("Decryption failed")]
    DecryptionFailure,

    #[error("Fetch failed: {reason}")]
    FetchFailure { reason: String, retriable: bool },

    #[error("Backend error: {0}")]
    Backend(ApiError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Record deleted but ciphertext at {location} remains: {reason}")]
    CleanupFailure {
        location: BlobLocation,
        reason: String,
    },

    #[error("Backend did not confirm the write; ciphertext kept at {location}: {reason}")]
    OutcomeUnknown {
        location: BlobLocation,
        reason: String,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl SecretError {
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SecretError::ProviderUnavailable | SecretError::RandomnessFailure
        )
    }

    pub fn is_retriable(&self) -> bool {
        match self {
            SecretError::FetchFailure { retriable, .. } => *retriable,
            SecretError::UploadFailure(_) | SecretError::CleanupFailure { .. } => true,
            SecretError::Backend(e) => e.is_retriable(),
            _ => false,
        }
    }

    /// Short message suitable for showing to the owner.
    pub fn user_message(&self) -> String {
        match self {
            SecretError::ProviderUnavailable | SecretError::RandomnessFailure => {
                "Secure encryption is unavailable on this device.".to_string()
            }
            SecretError::UploadFailure(_) => {
                "Could not save the credential. Nothing was stored; please try again.".to_string()
            }
            SecretError::DecryptionFailure => "Could not reveal this secret.".to_string(),
            SecretError::FetchFailure { retriable: true, .. } => {
                "Could not load this secret right now. Please try again.".to_string()
            }
            SecretError::FetchFailure { .. } => {
                "The stored secret could not be found.".to_string()
            }
            SecretError::Backend(ApiError::Unauthorized) => {
                "Your session has expired. Please log in again.".to_string()
            }
            SecretError::Backend(e) => format!("The server could not complete the request: {}", e),
            SecretError::CleanupFailure { .. } => {
                "The credential was deleted, but its encrypted data could not be removed yet."
                    .to_string()
            }
            SecretError::NotFound(_) => "That credential no longer exists.".to_string(),
            SecretError::OutcomeUnknown { .. } => {
                "The server did not confirm the save. Check your vault before trying again."
                    .to_string()
            }
            SecretError::InvalidInput(reason) => reason.clone(),
            SecretError::Cancelled => "Cancelled.".to_string(),
        }
    }
}

impl From<CryptoError> for SecretError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::ProviderUnavailable => SecretError::ProviderUnavailable,
            CryptoError::RandomnessFailure => SecretError::RandomnessFailure,
            // A stored key that no longer parses cannot open its blob either
            CryptoError::DecryptionFailed
            | CryptoError::InvalidKey(_)
            | CryptoError::InvalidKeySize(_) => SecretError::DecryptionFailure,
            CryptoError::EncryptionFailed => {
                SecretError::InvalidInput("secret is too large to encrypt".to_string())
            }
        }
    }
}

impl From<ApiError> for SecretError {
    fn from(e: ApiError) -> Self {
        match e {
            ApiError::NotFound(what) => SecretError::NotFound(what),
            other => SecretError::Backend(other),
        }
    }
}

impl SecretError {
    pub(crate) fn from_fetch(e: ObjectStoreError) -> Self {
        match e {
            ObjectStoreError::NotFound(location) => SecretError::FetchFailure {
                reason: format!("ciphertext {} is missing", location),
                retriable: false,
            },
            other => SecretError::FetchFailure {
                reason: other.to_string(),
                retriable: true,
            },
        }
    }
}
