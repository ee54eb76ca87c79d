//! In-process implementations of the remote collaborators
//!
//! Used by tests across the workspace. Failures can be switched
//! on per operation to exercise the orchestrator's cleanup paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::api::{ApiError, CredentialApi};
use crate::model::{BlobLocation, BlobName, Category, CredentialPayload, CredentialRecord, TrusteeSummary};
use crate::object_store::{ObjectStore, ObjectStoreError};

/// A panicked test thread must not take the fake down with it.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    fail_puts: AtomicBool,
    fail_gets: AtomicBool,
    fail_deletes: AtomicBool,
    get_delay: Mutex<Option<Duration>>,
    location_delays: Mutex<HashMap<String, Duration>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_gets(&self, fail: bool) {
        self.fail_gets.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Make every `get` stall for `delay` before answering.
    pub fn delay_gets(&self, delay: Option<Duration>) {
        *lock(&self.get_delay) = delay;
    }

    /// Make `get` of one location stall for `delay`; other locations answer at once.
    pub fn delay_get_of(&self, location: &BlobLocation, delay: Duration) {
        lock(&self.location_delays).insert(location.as_str().to_string(), delay);
    }

    pub fn len(&self) -> usize {
        lock(&self.objects).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, location: &BlobLocation) -> bool {
        lock(&self.objects).contains_key(location.as_str())
    }

    /// Raw stored bytes, for inspecting what actually left the client.
    pub fn raw(&self, location: &BlobLocation) -> Option<Vec<u8>> {
        lock(&self.objects).get(location.as_str()).cloned()
    }

    /// Overwrite a stored blob in place.
    pub fn replace_raw(&self, location: &BlobLocation, bytes: Vec<u8>) {
        lock(&self.objects).insert(location.as_str().to_string(), bytes);
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put(&self, name: &BlobName, bytes: Vec<u8>) -> Result<BlobLocation, ObjectStoreError> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(ObjectStoreError::Upload("simulated upload failure".into()));
        }
        let mut objects = lock(&self.objects);
        if objects.contains_key(name.as_str()) {
            return Err(ObjectStoreError::Upload(format!("{} already exists", name)));
        }
        objects.insert(name.as_str().to_string(), bytes);
        Ok(BlobLocation::new(name.as_str()))
    }

    async fn get(&self, location: &BlobLocation) -> Result<Vec<u8>, ObjectStoreError> {
        let delay = lock(&self.location_delays)
            .get(location.as_str())
            .copied()
            .or(*lock(&self.get_delay));
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(ObjectStoreError::Fetch("simulated fetch failure".into()));
        }
        self.raw(location)
            .ok_or_else(|| ObjectStoreError::NotFound(location.to_string()))
    }

    async fn delete(&self, location: &BlobLocation) -> Result<(), ObjectStoreError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(ObjectStoreError::Delete("simulated delete failure".into()));
        }
        lock(&self.objects).remove(location.as_str());
        Ok(())
    }

    async fn signed_url(
        &self,
        location: &BlobLocation,
        expires_in: Duration,
    ) -> Result<String, ObjectStoreError> {
        if !self.contains(location) {
            return Err(ObjectStoreError::NotFound(location.to_string()));
        }
        Ok(format!(
            "memory://{}?expiresIn={}",
            location,
            expires_in.as_secs()
        ))
    }
}

/// Backend stand-in that enforces the same owner and field rules as the server.
#[derive(Default)]
pub struct InMemoryCredentialApi {
    records: Mutex<Vec<CredentialRecord>>,
    trustees: Mutex<HashMap<Uuid, Vec<TrusteeSummary>>>,
    fail_creates: AtomicBool,
    fail_updates: AtomicBool,
    fail_deletes: AtomicBool,
}

impl InMemoryCredentialApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_creates(&self, fail: bool) {
        self.fail_creates.store(fail, Ordering::SeqCst);
    }

    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn add_trustee(&self, owner_id: Uuid, trustee: TrusteeSummary) {
        lock(&self.trustees)
            .entry(owner_id)
            .or_default()
            .push(trustee);
    }

    /// Every stored record, regardless of owner.
    pub fn snapshot(&self) -> Vec<CredentialRecord> {
        lock(&self.records).clone()
    }

    fn unavailable() -> ApiError {
        ApiError::Rejected {
            status: 503,
            message: "simulated backend failure".into(),
        }
    }
}

#[async_trait]
impl CredentialApi for InMemoryCredentialApi {
    async fn create(
        &self,
        owner_id: Uuid,
        payload: &CredentialPayload,
    ) -> Result<CredentialRecord, ApiError> {
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        let (Some(location), Some(key)) = (&payload.ciphertext_location, &payload.encrypted_key)
        else {
            return Err(ApiError::Rejected {
                status: 400,
                message: "passwordOrPin and encryptedKey are required".into(),
            });
        };

        let record = CredentialRecord {
            id: Uuid::new_v4(),
            title: payload.title.clone(),
            username_or_card_number: payload.username_or_card_number.clone(),
            category: payload.category,
            notes: payload.notes.clone(),
            created_at: Some(chrono::Utc::now().naive_utc()),
            trustee_ids: payload.trustee_ids.clone(),
            ciphertext_location: location.clone(),
            encrypted_key: key.clone(),
            owner_id: Some(owner_id),
        };
        lock(&self.records).push(record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        owner_id: Uuid,
        credential_id: Uuid,
        payload: &CredentialPayload,
    ) -> Result<CredentialRecord, ApiError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        let mut records = lock(&self.records);
        let record = records
            .iter_mut()
            .find(|r| r.id == credential_id)
            .ok_or_else(|| ApiError::NotFound(format!("credential {}", credential_id)))?;
        if record.owner_id != Some(owner_id) {
            return Err(ApiError::Unauthorized);
        }

        record.title = payload.title.clone();
        record.username_or_card_number = payload.username_or_card_number.clone();
        record.category = payload.category;
        record.notes = payload.notes.clone();
        record.trustee_ids = payload.trustee_ids.clone();
        if let Some(location) = &payload.ciphertext_location {
            record.ciphertext_location = location.clone();
        }
        if let Some(key) = &payload.encrypted_key {
            record.encrypted_key = key.clone();
        }
        Ok(record.clone())
    }

    async fn list(&self, owner_id: Uuid) -> Result<Vec<CredentialRecord>, ApiError> {
        Ok(lock(&self.records)
            .iter()
            .filter(|r| r.owner_id == Some(owner_id))
            .cloned()
            .collect())
    }

    async fn list_by_category(
        &self,
        owner_id: Uuid,
        category: Category,
    ) -> Result<Vec<CredentialRecord>, ApiError> {
        Ok(self
            .list(owner_id)
            .await?
            .into_iter()
            .filter(|r| r.category == category)
            .collect())
    }

    async fn delete(&self, credential_id: Uuid) -> Result<(), ApiError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        let mut records = lock(&self.records);
        let before = records.len();
        records.retain(|r| r.id != credential_id);
        if records.len() == before {
            return Err(ApiError::NotFound(format!("credential {}", credential_id)));
        }
        Ok(())
    }

    async fn list_trustees(&self, owner_id: Uuid) -> Result<Vec<TrusteeSummary>, ApiError> {
        Ok(lock(&self.trustees)
            .get(&owner_id)
            .cloned()
            .unwrap_or_default())
    }
}
