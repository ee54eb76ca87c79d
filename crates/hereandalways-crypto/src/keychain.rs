//! Hardware keychain storage for the backend session token

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeychainError {
    #[error("Keychain not available")]
    NotAvailable,
    #[error("No session token stored for {0}")]
    NotFound(String),
    #[error("Platform error: {0}")]
    Platform(String),
}

/// Bearer token storage, one entry per account.
pub struct TokenKeychain {
    service_name: String,
}

impl TokenKeychain {
    pub fn new(service_name: &str) -> Self {
        Self {
            service_name: service_name.to_string(),
        }
    }

    fn entry(&self, account: &str) -> Result<keyring::Entry, KeychainError> {
        keyring::Entry::new(&self.service_name, account).map_err(map_keyring_error)
    }

    pub fn store_token(&self, account: &str, token: &SecretString) -> Result<(), KeychainError> {
        self.entry(account)?
            .set_password(token.expose_secret())
            .map_err(map_keyring_error)?;
        tracing::debug!(service = %self.service_name, account, "session token stored");
        Ok(())
    }

    pub fn retrieve_token(&self, account: &str) -> Result<SecretString, KeychainError> {
        let token = self.entry(account)?.get_password().map_err(|e| match e {
            keyring::Error::NoEntry => KeychainError::NotFound(account.to_string()),
            other => map_keyring_error(other),
        })?;
        Ok(SecretString::new(token))
    }

    /// Remove the stored token. Removing an absent token is not an error.
    pub fn clear_token(&self, account: &str) -> Result<(), KeychainError> {
        match self.entry(account)?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(map_keyring_error(e)),
        }
    }
}

fn map_keyring_error(e: keyring::Error) -> KeychainError {
    match e {
        keyring::Error::NoStorageAccess(_) | keyring::Error::PlatformFailure(_) => {
            KeychainError::NotAvailable
        }
        other => KeychainError::Platform(other.to_string()),
    }
}
