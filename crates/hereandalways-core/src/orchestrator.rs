//! Secret lifecycle orchestration
//!
//! Coordinates key generation, encryption, upload and record persistence for
//! a credential, and the reverse path for reveal. Plaintext only ever exists
//! inside this process; the object store sees ciphertext and the backend sees
//! the blob location plus the exported key.

use std::sync::Arc;
use std::time::Duration;

use hereandalways_crypto::{self as crypto, EntropySource, ExportedKey, SymmetricKey, SystemEntropy};
use hereandalways_storage::{
    ApiError, BlobLocation, BlobName, Category, CredentialApi, CredentialPayload, CredentialRecord,
    ObjectStore, TrusteeSummary,
};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{AppConfig, DEFAULT_FETCH_TIMEOUT, DEFAULT_SIGNED_URL_TTL};
use crate::error::SecretError;

/// Attempts at removing a blob once its record is gone.
const CLEANUP_ATTEMPTS: u32 = 3;
const CLEANUP_BACKOFF: Duration = Duration::from_millis(100);

/// Where a secret currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Encrypting,
    Uploading,
    AwaitingReveal,
    Decrypting,
    Revealed,
    Hidden,
}

/// Fields of the add-credential form.
#[derive(Debug, Clone)]
pub struct NewSecret {
    pub title: String,
    pub username_or_card_number: String,
    pub secret: SecretString,
    pub category: Category,
    pub notes: Option<String>,
    pub trustee_ids: Vec<Uuid>,
}

/// Fields of the edit form. `new_secret` set means rotate the ciphertext.
#[derive(Debug, Clone)]
pub struct SecretEdit {
    pub title: String,
    pub username_or_card_number: String,
    pub category: Category,
    pub notes: Option<String>,
    pub trustee_ids: Vec<Uuid>,
    pub new_secret: Option<SecretString>,
}

impl SecretEdit {
    /// Start an edit from the record's current metadata.
    pub fn from_record(record: &CredentialRecord) -> Self {
        Self {
            title: record.title.clone(),
            username_or_card_number: record.username_or_card_number.clone(),
            category: record.category,
            notes: record.notes.clone(),
            trustee_ids: record.trustee_ids.clone(),
            new_secret: None,
        }
    }
}

pub struct SecretOrchestrator {
    store: Arc<dyn ObjectStore>,
    api: Arc<dyn CredentialApi>,
    entropy: Arc<dyn EntropySource>,
    fetch_timeout: Duration,
    signed_url_ttl: Duration,
}

impl SecretOrchestrator {
    pub fn new(store: Arc<dyn ObjectStore>, api: Arc<dyn CredentialApi>) -> Self {
        Self {
            store,
            api,
            entropy: Arc::new(SystemEntropy::new()),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            signed_url_ttl: DEFAULT_SIGNED_URL_TTL,
        }
    }

    pub fn from_config(
        config: &AppConfig,
        store: Arc<dyn ObjectStore>,
        api: Arc<dyn CredentialApi>,
    ) -> Self {
        Self::new(store, api)
            .with_fetch_timeout(config.fetch_timeout)
            .with_signed_url_ttl(config.signed_url_ttl)
    }

    pub fn with_entropy(mut self, entropy: Arc<dyn EntropySource>) -> Self {
        self.entropy = entropy;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_signed_url_ttl(mut self, ttl: Duration) -> Self {
        self.signed_url_ttl = ttl;
        self
    }

    /// Encrypt, upload, then persist a new credential.
    ///
    /// The record is only written once the ciphertext is stored. If the
    /// backend rejects the write the blob is removed again. When the outcome
    /// is unclear (timeout, dropped connection, unreadable success body) the
    /// owner's records are re-listed and the blob is kept if a record points
    /// at it.
    pub async fn create_secret<F>(
        &self,
        owner_id: Uuid,
        new: NewSecret,
        mut on_state: F,
    ) -> Result<CredentialRecord, SecretError>
    where
        F: FnMut(LifecycleState),
    {
        validate(&new.title, &new.secret)?;

        on_state(LifecycleState::Encrypting);
        let (exported, ciphertext) = self.seal(&new.secret).map_err(|e| {
            on_state(LifecycleState::Idle);
            e
        })?;

        on_state(LifecycleState::Uploading);
        let location = match self.upload(&new.title, ciphertext).await {
            Ok(location) => location,
            Err(e) => {
                on_state(LifecycleState::Idle);
                return Err(e);
            }
        };

        let payload = CredentialPayload {
            title: new.title,
            username_or_card_number: new.username_or_card_number,
            ciphertext_location: Some(location.clone()),
            encrypted_key: Some(exported),
            category: new.category,
            notes: new.notes,
            trustee_ids: new.trustee_ids,
        };

        let result = match self.api.create(owner_id, &payload).await {
            Ok(record) => Ok(record),
            Err(e) if e.is_rejection() => {
                warn!(location = %location, error = %e, "Credential rejected; removing blob");
                self.discard_blob(&location).await;
                Err(e.into())
            }
            Err(e) => self.reconcile_create(owner_id, &location, e).await,
        };
        on_state(LifecycleState::Idle);

        let record = result?;
        info!(credential_id = %record.id, location = %location, "Credential created");
        Ok(record)
    }

    async fn reconcile_create(
        &self,
        owner_id: Uuid,
        location: &BlobLocation,
        error: ApiError,
    ) -> Result<CredentialRecord, SecretError> {
        warn!(location = %location, error = %error, "Create unconfirmed; checking backend");
        let listed = self.api.list(owner_id).await.map(|records| {
            records
                .into_iter()
                .find(|r| &r.ciphertext_location == location)
        });

        match listed {
            Ok(Some(record)) => Ok(record),
            // A decode failure follows a success status, so the record exists somewhere
            Ok(None) if !matches!(error, ApiError::Decode(_)) => {
                self.discard_blob(location).await;
                Err(error.into())
            }
            Ok(None) | Err(_) => Err(SecretError::OutcomeUnknown {
                location: location.clone(),
                reason: error.to_string(),
            }),
        }
    }

    /// Save edited metadata, rotating the ciphertext when a new secret is given.
    ///
    /// On rotation the old blob is only removed after the record points at
    /// the new one. A rejected update removes the new blob and leaves the old
    /// record as it was. An unconfirmed update is checked against the stored
    /// record before either blob is touched.
    pub async fn update_secret<F>(
        &self,
        owner_id: Uuid,
        credential_id: Uuid,
        edit: SecretEdit,
        mut on_state: F,
    ) -> Result<CredentialRecord, SecretError>
    where
        F: FnMut(LifecycleState),
    {
        if edit.title.trim().is_empty() {
            return Err(SecretError::InvalidInput("title is required".to_string()));
        }

        let current = self.api.get(owner_id, credential_id).await?;

        let rotated = match &edit.new_secret {
            Some(secret) => {
                validate(&edit.title, secret)?;
                on_state(LifecycleState::Encrypting);
                let (exported, ciphertext) = self.seal(secret).map_err(|e| {
                    on_state(LifecycleState::Idle);
                    e
                })?;
                on_state(LifecycleState::Uploading);
                match self.upload(&edit.title, ciphertext).await {
                    Ok(location) => Some((location, exported)),
                    Err(e) => {
                        on_state(LifecycleState::Idle);
                        return Err(e);
                    }
                }
            }
            None => None,
        };

        let payload = CredentialPayload {
            title: edit.title,
            username_or_card_number: edit.username_or_card_number,
            ciphertext_location: rotated.as_ref().map(|(loc, _)| loc.clone()),
            encrypted_key: rotated.as_ref().map(|(_, key)| key.clone()),
            category: edit.category,
            notes: edit.notes,
            trustee_ids: edit.trustee_ids,
        };

        let result = match (self.api.update(owner_id, credential_id, &payload).await, &rotated) {
            (Ok(record), _) => Ok(record),
            (Err(e), None) => Err(e.into()),
            (Err(e), Some((location, _))) if e.is_rejection() => {
                warn!(credential_id = %credential_id, location = %location, error = %e,
                    "Update rejected; removing rotated blob");
                self.discard_blob(location).await;
                Err(e.into())
            }
            (Err(e), Some((location, _))) => {
                self.reconcile_rotation(owner_id, credential_id, location, e)
                    .await
            }
        };
        on_state(LifecycleState::Idle);
        let record = result?;

        if rotated.is_some() && current.ciphertext_location != record.ciphertext_location {
            if let Err(e) = self.remove_blob(&current.ciphertext_location).await {
                warn!(credential_id = %credential_id, error = %e, "Superseded ciphertext left behind");
            }
        }

        info!(credential_id = %credential_id, rotated = rotated.is_some(), "Credential updated");
        Ok(record)
    }

    async fn reconcile_rotation(
        &self,
        owner_id: Uuid,
        credential_id: Uuid,
        location: &BlobLocation,
        error: ApiError,
    ) -> Result<CredentialRecord, SecretError> {
        warn!(credential_id = %credential_id, location = %location, error = %error,
            "Update unconfirmed; checking backend");

        match self.api.get(owner_id, credential_id).await {
            Ok(record) if &record.ciphertext_location == location => Ok(record),
            Ok(_) if !matches!(error, ApiError::Decode(_)) => {
                self.discard_blob(location).await;
                Err(error.into())
            }
            _ => Err(SecretError::OutcomeUnknown {
                location: location.clone(),
                reason: error.to_string(),
            }),
        }
    }

    /// Delete the record, then its ciphertext.
    pub async fn delete_secret(&self, owner_id: Uuid, credential_id: Uuid) -> Result<(), SecretError> {
        let record = self.api.get(owner_id, credential_id).await?;
        self.api.delete(credential_id).await?;
        info!(credential_id = %credential_id, "Credential record deleted");

        self.remove_blob(&record.ciphertext_location).await
    }

    pub async fn list_secrets(
        &self,
        owner_id: Uuid,
        category: Option<Category>,
    ) -> Result<Vec<CredentialRecord>, SecretError> {
        let records = match category {
            Some(category) => self.api.list_by_category(owner_id, category).await?,
            None => self.api.list(owner_id).await?,
        };
        debug!(owner_id = %owner_id, count = records.len(), "Listed credentials");
        Ok(records)
    }

    pub async fn get_secret(
        &self,
        owner_id: Uuid,
        credential_id: Uuid,
    ) -> Result<CredentialRecord, SecretError> {
        Ok(self.api.get(owner_id, credential_id).await?)
    }

    pub async fn list_trustees(&self, owner_id: Uuid) -> Result<Vec<TrusteeSummary>, SecretError> {
        Ok(self.api.list_trustees(owner_id).await?)
    }

    /// Fetch and decrypt a record's secret.
    ///
    /// The fetch is bounded by the configured timeout; running out of time is
    /// a retriable `FetchFailure`.
    pub async fn reveal_secret<F>(
        &self,
        record: &CredentialRecord,
        mut on_state: F,
    ) -> Result<SecretString, SecretError>
    where
        F: FnMut(LifecycleState),
    {
        on_state(LifecycleState::AwaitingReveal);

        let fetched = tokio::time::timeout(
            self.fetch_timeout,
            self.store.get(&record.ciphertext_location),
        )
        .await;

        let bytes = match fetched {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                on_state(LifecycleState::Hidden);
                return Err(SecretError::from_fetch(e));
            }
            Err(_) => {
                on_state(LifecycleState::Hidden);
                warn!(credential_id = %record.id, "Ciphertext fetch timed out");
                return Err(SecretError::FetchFailure {
                    reason: format!("timed out after {}s", self.fetch_timeout.as_secs_f32()),
                    retriable: true,
                });
            }
        };

        on_state(LifecycleState::Decrypting);
        match open(&bytes, &record.encrypted_key) {
            Ok(secret) => {
                on_state(LifecycleState::Revealed);
                debug!(credential_id = %record.id, "Secret revealed");
                Ok(secret)
            }
            Err(e) => {
                on_state(LifecycleState::Hidden);
                warn!(credential_id = %record.id, "Could not decrypt ciphertext");
                Err(e)
            }
        }
    }

    /// Time-limited download link for a record's ciphertext.
    pub async fn share_link(&self, record: &CredentialRecord) -> Result<String, SecretError> {
        self.store
            .signed_url(&record.ciphertext_location, self.signed_url_ttl)
            .await
            .map_err(SecretError::from_fetch)
    }

    fn seal(&self, secret: &SecretString) -> Result<(ExportedKey, String), SecretError> {
        let key = SymmetricKey::generate_with(self.entropy.as_ref())?;
        let ciphertext =
            crypto::encrypt_with(self.entropy.as_ref(), secret.expose_secret().as_bytes(), &key)?;
        Ok((key.export(), ciphertext))
    }

    async fn upload(&self, title: &str, ciphertext: String) -> Result<BlobLocation, SecretError> {
        let name = BlobName::for_title(title);
        self.store
            .put(&name, ciphertext.into_bytes())
            .await
            .map_err(|e| {
                warn!(blob = %name, error = %e, "Ciphertext upload failed");
                SecretError::UploadFailure(e.to_string())
            })
    }

    /// Best-effort removal of a blob no record points at.
    async fn discard_blob(&self, location: &BlobLocation) {
        if let Err(e) = self.store.delete(location).await {
            warn!(location = %location, error = %e, "Orphaned ciphertext could not be removed");
        }
    }

    async fn remove_blob(&self, location: &BlobLocation) -> Result<(), SecretError> {
        let mut last_error = None;
        for attempt in 1..=CLEANUP_ATTEMPTS {
            match self.store.delete(location).await {
                Ok(()) => {
                    debug!(location = %location, attempt, "Ciphertext removed");
                    return Ok(());
                }
                Err(e) => {
                    warn!(location = %location, attempt, error = %e, "Ciphertext delete failed");
                    last_error = Some(e);
                    if attempt < CLEANUP_ATTEMPTS {
                        tokio::time::sleep(CLEANUP_BACKOFF * attempt).await;
                    }
                }
            }
        }
        Err(SecretError::CleanupFailure {
            location: location.clone(),
            reason: last_error.map(|e| e.to_string()).unwrap_or_default(),
        })
    }
}

fn validate(title: &str, secret: &SecretString) -> Result<(), SecretError> {
    if title.trim().is_empty() {
        return Err(SecretError::InvalidInput("title is required".to_string()));
    }
    if secret.expose_secret().is_empty() {
        return Err(SecretError::InvalidInput("secret must not be empty".to_string()));
    }
    Ok(())
}

fn open(bytes: &[u8], key: &ExportedKey) -> Result<SecretString, SecretError> {
    let encoded = std::str::from_utf8(bytes).map_err(|_| SecretError::DecryptionFailure)?;
    let plaintext = crypto::decrypt(encoded.trim(), key.as_str())?;
    let text = std::str::from_utf8(&plaintext).map_err(|_| SecretError::DecryptionFailure)?;
    Ok(SecretString::new(text.to_owned()))
}
