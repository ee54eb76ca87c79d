//! AES-256-GCM authenticated encryption
//!
//! Output is base64(nonce || ciphertext || tag), the same framing the web
//! client produces with WebCrypto, so either side can read the other's blobs.

use aes_gcm::{aead::Aead, Nonce};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use zeroize::Zeroizing;

use crate::entropy::{EntropySource, SystemEntropy};
use crate::error::CryptoError;
use crate::key::SymmetricKey;

/// 96-bit nonce (12 bytes)
pub const NONCE_SIZE: usize = 12;
/// 128-bit GCM tag (16 bytes)
pub const TAG_SIZE: usize = 16;

/// Encrypt `plaintext` under `key` with a fresh OS-random nonce.
pub fn encrypt(plaintext: &[u8], key: &SymmetricKey) -> Result<String, CryptoError> {
    encrypt_with(&SystemEntropy::new(), plaintext, key)
}

/// Encrypt with nonce bytes drawn from `entropy`.
///
/// Returns: base64(nonce || ciphertext || tag)
pub fn encrypt_with(
    entropy: &dyn EntropySource,
    plaintext: &[u8],
    key: &SymmetricKey,
) -> Result<String, CryptoError> {
    let mut nonce_bytes = [0u8; NONCE_SIZE];
    entropy.fill(&mut nonce_bytes)?;
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = key
        .cipher()
        .encrypt(nonce, plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut framed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    framed.extend_from_slice(&nonce_bytes);
    framed.extend_from_slice(&ciphertext);

    Ok(STANDARD.encode(framed))
}

/// Decrypt text produced by [`encrypt`], using the key in its exported form.
pub fn decrypt(encoded: &str, exported_key: &str) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let key = SymmetricKey::import(exported_key)?;
    decrypt_with_key(encoded, &key)
}

/// Decrypt text produced by [`encrypt`].
///
/// Expects: base64(nonce || ciphertext || tag)
pub fn decrypt_with_key(
    encoded: &str,
    key: &SymmetricKey,
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let framed = STANDARD
        .decode(encoded)
        .map_err(|_| CryptoError::DecryptionFailed)?;

    if framed.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CryptoError::DecryptionFailed);
    }

    let (nonce_bytes, sealed) = framed.split_at(NONCE_SIZE);
    let nonce = Nonce::from_slice(nonce_bytes);

    let plaintext = key
        .cipher()
        .decrypt(nonce, sealed)
        .map_err(|_| CryptoError::DecryptionFailed)?;

    Ok(Zeroizing::new(plaintext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entropy::testing::BrokenEntropy;
    use proptest::prelude::*;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = SymmetricKey::generate().unwrap();
        let plaintext = b"hunter2-secret";

        let encoded = encrypt(plaintext, &key).unwrap();
        assert!(encoded.len() > plaintext.len());
        assert!(STANDARD.decode(&encoded).is_ok());

        let decrypted = decrypt(&encoded, key.export().as_str()).unwrap();
        assert_eq!(decrypted.as_slice(), plaintext);
    }

    #[test]
    fn test_frame_layout() {
        let key = SymmetricKey::generate().unwrap();
        let encoded = encrypt(b"abc", &key).unwrap();
        let framed = STANDARD.decode(&encoded).unwrap();
        assert_eq!(framed.len(), NONCE_SIZE + 3 + TAG_SIZE);
    }

    #[test]
    fn test_same_input_encrypts_differently() {
        let key = SymmetricKey::generate().unwrap();
        let plaintext = b"same-secret";

        let e1 = encrypt(plaintext, &key).unwrap();
        let e2 = encrypt(plaintext, &key).unwrap();
        // Fresh nonce each call
        assert_ne!(e1, e2);

        assert_eq!(decrypt_with_key(&e1, &key).unwrap().as_slice(), plaintext);
        assert_eq!(decrypt_with_key(&e2, &key).unwrap().as_slice(), plaintext);
    }

    #[test]
    fn test_empty_plaintext() {
        let key = SymmetricKey::generate().unwrap();
        let encoded = encrypt(b"", &key).unwrap();
        assert!(decrypt_with_key(&encoded, &key).unwrap().is_empty());
    }

    #[test]
    fn test_wrong_key_fails() {
        let key1 = SymmetricKey::generate().unwrap();
        let key2 = SymmetricKey::generate().unwrap();

        let encoded = encrypt(b"secret data", &key1).unwrap();
        assert_eq!(
            decrypt(&encoded, key2.export().as_str()).unwrap_err(),
            CryptoError::DecryptionFailed
        );
    }

    #[test]
    fn test_every_bit_flip_in_frame_is_detected() {
        let key = SymmetricKey::generate().unwrap();
        let encoded = encrypt(b"pin:4321", &key).unwrap();
        let framed = STANDARD.decode(&encoded).unwrap();

        for byte in 0..framed.len() {
            for bit in 0..8 {
                let mut tampered = framed.clone();
                tampered[byte] ^= 1 << bit;
                let result = decrypt_with_key(&STANDARD.encode(&tampered), &key);
                assert_eq!(result.unwrap_err(), CryptoError::DecryptionFailed);
            }
        }
    }

    #[test]
    fn test_flipped_text_character_is_detected() {
        let key = SymmetricKey::generate().unwrap();
        let encoded = encrypt(b"pin:4321", &key).unwrap();

        for i in 0..encoded.len() {
            let mut bytes = encoded.clone().into_bytes();
            bytes[i] ^= 0x01;
            let tampered = String::from_utf8(bytes).unwrap();
            assert_eq!(
                decrypt_with_key(&tampered, &key).unwrap_err(),
                CryptoError::DecryptionFailed
            );
        }
    }

    #[test]
    fn test_truncated_text_fails() {
        let key = SymmetricKey::generate().unwrap();
        let encoded = encrypt(b"hunter2-secret", &key).unwrap();

        let truncated = &encoded[..encoded.len() - 1];
        assert_eq!(
            decrypt(truncated, key.export().as_str()).unwrap_err(),
            CryptoError::DecryptionFailed
        );
        // Shorter than nonce + tag
        let short = STANDARD.encode([0u8; NONCE_SIZE + TAG_SIZE - 1]);
        assert_eq!(
            decrypt_with_key(&short, &key).unwrap_err(),
            CryptoError::DecryptionFailed
        );
    }

    #[test]
    fn test_imported_key_is_interchangeable() {
        let key = SymmetricKey::generate().unwrap();
        let imported = key.export().import().unwrap();

        let by_original = encrypt(b"both ways", &key).unwrap();
        let by_imported = encrypt(b"both ways", &imported).unwrap();
        assert_eq!(decrypt_with_key(&by_original, &imported).unwrap().as_slice(), b"both ways");
        assert_eq!(decrypt_with_key(&by_imported, &key).unwrap().as_slice(), b"both ways");
    }

    #[test]
    fn test_randomness_failure_aborts() {
        let key = SymmetricKey::generate().unwrap();
        let err = encrypt_with(&BrokenEntropy, b"never", &key).unwrap_err();
        assert_eq!(err, CryptoError::RandomnessFailure);
        assert!(err.is_fatal());
    }

    #[test]
    fn test_malformed_key_text_is_not_a_decryption_failure() {
        let key = SymmetricKey::generate().unwrap();
        let encoded = encrypt(b"x", &key).unwrap();
        assert!(matches!(
            decrypt(&encoded, "%%%"),
            Err(CryptoError::InvalidKey(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_roundtrip(plaintext in proptest::collection::vec(any::<u8>(), 0..512)) {
            let key = SymmetricKey::generate().unwrap();
            let encoded = encrypt(&plaintext, &key).unwrap();
            let decrypted = decrypt(&encoded, key.export().as_str()).unwrap();
            prop_assert_eq!(decrypted.as_slice(), plaintext.as_slice());
        }
    }
}
