//! HereAndAlways Crypto - client-side secret protection
//!
//! This crate provides:
//! - Per-secret AES-256-GCM key generation
//! - Key export/import as standard base64 (WebCrypto `raw` compatible)
//! - Self-describing encryption: base64(nonce || ciphertext || tag)
//! - Hardware keychain storage for the backend session token
//!
//! Plaintext never leaves this crate except inside zeroizing buffers.

pub mod cipher;
pub mod entropy;
pub mod error;
pub mod key;
pub mod keychain;

pub use cipher::{decrypt, decrypt_with_key, encrypt, encrypt_with, NONCE_SIZE, TAG_SIZE};
pub use entropy::{EntropySource, SystemEntropy};
pub use error::CryptoError;
pub use key::{ExportedKey, SymmetricKey, KEY_SIZE};
pub use keychain::{KeychainError, TokenKeychain};
