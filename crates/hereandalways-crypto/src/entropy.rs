//! Entropy sources for keys and nonces
//!
//! `ring::rand::SecureRandom` is sealed, so the crate takes its own small
//! trait at this seam. Production code always uses [`SystemEntropy`].

use ring::rand::{SecureRandom, SystemRandom};

use crate::error::CryptoError;

pub trait EntropySource: Send + Sync {
    /// Fill `dest` with cryptographically secure random bytes.
    fn fill(&self, dest: &mut [u8]) -> Result<(), CryptoError>;
}

/// OS-backed randomness via `ring`.
pub struct SystemEntropy {
    rng: SystemRandom,
}

impl SystemEntropy {
    pub fn new() -> Self {
        Self {
            rng: SystemRandom::new(),
        }
    }
}

impl Default for SystemEntropy {
    fn default() -> Self {
        Self::new()
    }
}

impl EntropySource for SystemEntropy {
    fn fill(&self, dest: &mut [u8]) -> Result<(), CryptoError> {
        self.rng
            .fill(dest)
            .map_err(|_| CryptoError::RandomnessFailure)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Entropy source whose provider is gone.
    pub struct BrokenEntropy;

    impl EntropySource for BrokenEntropy {
        fn fill(&self, _dest: &mut [u8]) -> Result<(), CryptoError> {
            Err(CryptoError::RandomnessFailure)
        }
    }
}
