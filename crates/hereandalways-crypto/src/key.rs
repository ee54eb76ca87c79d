//! Per-secret symmetric keys
//!
//! Every stored credential gets its own AES-256-GCM key. Key bytes live in
//! `Zeroizing<>` and are scrubbed on drop; the exported text form is scrubbed
//! too.

use std::fmt;

use aes_gcm::{Aes256Gcm, Key, KeyInit};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::entropy::{EntropySource, SystemEntropy};
use crate::error::CryptoError;

/// 256-bit key (32 bytes)
pub const KEY_SIZE: usize = 32;

pub struct SymmetricKey {
    bytes: Zeroizing<[u8; KEY_SIZE]>,
}

impl SymmetricKey {
    /// Generate a fresh key from the operating system's randomness.
    pub fn generate() -> Result<Self, CryptoError> {
        Self::generate_with(&SystemEntropy::new())
    }

    /// Generate a fresh key from `entropy`.
    ///
    /// A failing source means the provider is gone for this session.
    pub fn generate_with(entropy: &dyn EntropySource) -> Result<Self, CryptoError> {
        let mut bytes = Zeroizing::new([0u8; KEY_SIZE]);
        entropy
            .fill(bytes.as_mut())
            .map_err(|_| CryptoError::ProviderUnavailable)?;
        Ok(Self { bytes })
    }

    /// Encode the raw key bytes as standard, padded base64.
    pub fn export(&self) -> ExportedKey {
        ExportedKey(STANDARD.encode(self.bytes.as_ref()))
    }

    /// Inverse of [`SymmetricKey::export`].
    pub fn import(encoded: &str) -> Result<Self, CryptoError> {
        let decoded = Zeroizing::new(
            STANDARD
                .decode(encoded)
                .map_err(|e| CryptoError::InvalidKey(e.to_string()))?,
        );
        if decoded.len() != KEY_SIZE {
            return Err(CryptoError::InvalidKeySize(decoded.len()));
        }

        let mut bytes = Zeroizing::new([0u8; KEY_SIZE]);
        bytes.copy_from_slice(&decoded);
        Ok(Self { bytes })
    }

    pub(crate) fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(self.bytes.as_ref()))
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SymmetricKey([REDACTED])")
    }
}

/// Base64 text form of a [`SymmetricKey`], as stored in `encryptedKey`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct ExportedKey(String);

impl ExportedKey {
    pub fn new(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn import(&self) -> Result<SymmetricKey, CryptoError> {
        SymmetricKey::import(&self.0)
    }
}

impl fmt::Debug for ExportedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ExportedKey([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entropy::testing::BrokenEntropy;

    #[test]
    fn test_export_is_padded_base64_of_32_bytes() {
        let key = SymmetricKey::generate().unwrap();
        let exported = key.export();

        // 32 bytes -> 44 chars with a single '=' pad
        assert_eq!(exported.as_str().len(), 44);
        assert!(exported.as_str().ends_with('='));
        assert_eq!(STANDARD.decode(exported.as_str()).unwrap().len(), KEY_SIZE);
    }

    #[test]
    fn test_export_is_deterministic() {
        let key = SymmetricKey::generate().unwrap();
        assert_eq!(key.export(), key.export());
    }

    #[test]
    fn test_import_export_roundtrip() {
        let key = SymmetricKey::generate().unwrap();
        let imported = SymmetricKey::import(key.export().as_str()).unwrap();
        assert_eq!(imported.export(), key.export());
    }

    #[test]
    fn test_fresh_keys_differ() {
        let k1 = SymmetricKey::generate().unwrap();
        let k2 = SymmetricKey::generate().unwrap();
        assert_ne!(k1.export(), k2.export());
    }

    #[test]
    fn test_import_rejects_garbage() {
        assert!(matches!(
            SymmetricKey::import("not base64!!"),
            Err(CryptoError::InvalidKey(_))
        ));
        // Valid base64, wrong length (16 bytes)
        assert_eq!(
            SymmetricKey::import("AAAAAAAAAAAAAAAAAAAAAA==").unwrap_err(),
            CryptoError::InvalidKeySize(16)
        );
    }

    #[test]
    fn test_generate_without_provider_is_fatal() {
        let err = SymmetricKey::generate_with(&BrokenEntropy).unwrap_err();
        assert_eq!(err, CryptoError::ProviderUnavailable);
        assert!(err.is_fatal());
    }

    #[test]
    fn test_debug_never_prints_key_material() {
        let key = SymmetricKey::generate().unwrap();
        let exported = key.export();
        assert!(!format!("{:?}", key).contains(exported.as_str()));
        assert!(!format!("{:?}", exported).contains(exported.as_str()));
    }

    #[test]
    fn test_exported_key_serializes_as_plain_string() {
        let exported = ExportedKey::new("abc=");
        assert_eq!(serde_json::to_string(&exported).unwrap(), "\"abc=\"");
        let back: ExportedKey = serde_json::from_str("\"abc=\"").unwrap();
        assert_eq!(back, exported);
    }
}
