//! Backend REST client for credential records and trustees
//!
//! The backend is trusted to store records, not to decrypt them. Every
//! endpoint decodes into an explicit type; failures become [`ApiError`].

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use thiserror::Error;
use uuid::Uuid;

use crate::http::error_message;
use crate::model::{Category, CredentialPayload, CredentialRecord, TrusteeSummary};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("Not authorized - log in again")]
    Unauthorized,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Backend rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Backend unreachable: {0}")]
    Transport(String),

    #[error("Backend request timed out")]
    Timeout,

    #[error("Unexpected backend response: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn is_retriable(&self) -> bool {
        match self {
            ApiError::Transport(_) | ApiError::Timeout => true,
            ApiError::Rejected { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// The backend answered with an error status, so nothing was written.
    ///
    /// Transport failures and timeouts leave the outcome unknown, and a
    /// decode failure only happens after a success status.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            ApiError::Unauthorized | ApiError::NotFound(_) | ApiError::Rejected { .. }
        )
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ApiError::Timeout
        } else if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else {
            ApiError::Transport(e.to_string())
        }
    }
}

#[async_trait]
pub trait CredentialApi: Send + Sync {
    async fn create(
        &self,
        owner_id: Uuid,
        payload: &CredentialPayload,
    ) -> Result<CredentialRecord, ApiError>;

    async fn update(
        &self,
        owner_id: Uuid,
        credential_id: Uuid,
        payload: &CredentialPayload,
    ) -> Result<CredentialRecord, ApiError>;

    async fn list(&self, owner_id: Uuid) -> Result<Vec<CredentialRecord>, ApiError>;

    async fn list_by_category(
        &self,
        owner_id: Uuid,
        category: Category,
    ) -> Result<Vec<CredentialRecord>, ApiError>;

    async fn delete(&self, credential_id: Uuid) -> Result<(), ApiError>;

    async fn list_trustees(&self, owner_id: Uuid) -> Result<Vec<TrusteeSummary>, ApiError>;

    /// The backend has no single-record endpoint; look it up in the owner's list.
    async fn get(&self, owner_id: Uuid, credential_id: Uuid) -> Result<CredentialRecord, ApiError> {
        self.list(owner_id)
            .await?
            .into_iter()
            .find(|r| r.id == credential_id)
            .ok_or_else(|| ApiError::NotFound(format!("credential {}", credential_id)))
    }
}

pub struct HttpCredentialApi {
    client: reqwest::Client,
    base_url: String,
    token: Option<SecretString>,
}

impl HttpCredentialApi {
    /// `base_url` includes the `/api` prefix, e.g. `http://localhost:8081/api`.
    pub fn new(base_url: &str, token: Option<SecretString>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, token)
    }

    pub fn with_client(client: reqwest::Client, base_url: &str, token: Option<SecretString>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let req = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match &self.token {
            Some(token) => req.bearer_auth(token.expose_secret()),
            None => req,
        }
    }

    async fn send<T: DeserializeOwned>(&self, req: reqwest::RequestBuilder) -> Result<T, ApiError> {
        let resp = checked(req.send().await?).await?;
        resp.json::<T>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }
}

async fn checked(resp: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let (status, message) = error_message(resp).await;
    tracing::debug!(status = status.as_u16(), %message, "backend request failed");
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::Unauthorized,
        StatusCode::NOT_FOUND => ApiError::NotFound(message),
        _ => ApiError::Rejected {
            status: status.as_u16(),
            message,
        },
    })
}

fn owned(mut records: Vec<CredentialRecord>, owner_id: Uuid) -> Vec<CredentialRecord> {
    for record in &mut records {
        record.owner_id = Some(owner_id);
    }
    records
}

#[async_trait]
impl CredentialApi for HttpCredentialApi {
    async fn create(
        &self,
        owner_id: Uuid,
        payload: &CredentialPayload,
    ) -> Result<CredentialRecord, ApiError> {
        let req = self
            .request(reqwest::Method::POST, "/credentials")
            .query(&[("ownerId", owner_id.to_string())])
            .json(payload);
        let mut record: CredentialRecord = self.send(req).await?;
        record.owner_id = Some(owner_id);
        Ok(record)
    }

    async fn update(
        &self,
        owner_id: Uuid,
        credential_id: Uuid,
        payload: &CredentialPayload,
    ) -> Result<CredentialRecord, ApiError> {
        let req = self
            .request(reqwest::Method::PUT, &format!("/credentials/{}", credential_id))
            .query(&[("ownerId", owner_id.to_string())])
            .json(payload);
        let mut record: CredentialRecord = self.send(req).await?;
        record.owner_id = Some(owner_id);
        Ok(record)
    }

    async fn list(&self, owner_id: Uuid) -> Result<Vec<CredentialRecord>, ApiError> {
        let req = self
            .request(reqwest::Method::GET, "/credentials")
            .query(&[("ownerId", owner_id.to_string())]);
        Ok(owned(self.send(req).await?, owner_id))
    }

    async fn list_by_category(
        &self,
        owner_id: Uuid,
        category: Category,
    ) -> Result<Vec<CredentialRecord>, ApiError> {
        let req = self
            .request(reqwest::Method::GET, "/credentials/filter")
            .query(&[
                ("ownerId", owner_id.to_string()),
                ("category", category.as_str().to_string()),
            ]);
        Ok(owned(self.send(req).await?, owner_id))
    }

    async fn delete(&self, credential_id: Uuid) -> Result<(), ApiError> {
        let req = self.request(
            reqwest::Method::DELETE,
            &format!("/credentials/{}", credential_id),
        );
        checked(req.send().await?).await?;
        Ok(())
    }

    async fn list_trustees(&self, owner_id: Uuid) -> Result<Vec<TrusteeSummary>, ApiError> {
        let req = self.request(reqwest::Method::GET, &format!("/trustees/{}", owner_id));
        self.send(req).await
    }
}
