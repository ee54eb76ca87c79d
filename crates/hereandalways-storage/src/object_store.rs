//! Ciphertext blob storage

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{BlobLocation, BlobName};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ObjectStoreError {
    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("Delete failed: {0}")]
    Delete(String),

    #[error("Signing failed: {0}")]
    Sign(String),

    #[error("Storage request timed out")]
    Timeout,
}

/// Opaque blob store. Only ciphertext is ever handed to it.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload a new blob. Never overwrites an existing one.
    async fn put(&self, name: &BlobName, bytes: Vec<u8>) -> Result<BlobLocation, ObjectStoreError>;

    async fn get(&self, location: &BlobLocation) -> Result<Vec<u8>, ObjectStoreError>;

    /// Remove a blob. Deleting a missing blob succeeds.
    async fn delete(&self, location: &BlobLocation) -> Result<(), ObjectStoreError>;

    /// Time-limited download URL for sharing with trustees.
    async fn signed_url(
        &self,
        location: &BlobLocation,
        expires_in: Duration,
    ) -> Result<String, ObjectStoreError>;
}
