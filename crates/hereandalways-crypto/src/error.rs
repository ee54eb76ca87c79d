use thiserror::Error;

use crate::key::KEY_SIZE;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Cryptographic provider unavailable")]
    ProviderUnavailable,

    #[error("Secure randomness unavailable")]
    RandomnessFailure,

    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed - wrong key, or data corrupted or truncated")]
    DecryptionFailed,

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Invalid key size: expected {KEY_SIZE}, got {0}")]
    InvalidKeySize(usize),
}

impl CryptoError {
    /// Fatal errors abort the whole operation; there is no weaker fallback.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CryptoError::ProviderUnavailable | CryptoError::RandomnessFailure
        )
    }
}
