//! Supabase Storage client for ciphertext blobs

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::http::error_message;
use crate::model::{BlobLocation, BlobName};
use crate::object_store::{ObjectStore, ObjectStoreError};

/// Blobs are immutable once written, so clients may cache them for an hour.
const CACHE_CONTROL: &str = "max-age=3600";

pub struct SupabaseStorage {
    client: reqwest::Client,
    base_url: String,
    bucket: String,
    api_key: SecretString,
}

#[derive(Debug, Deserialize)]
struct SignedUrlResponse {
    #[serde(rename = "signedURL", alias = "signedUrl")]
    signed_url: String,
}

impl SupabaseStorage {
    pub fn new(base_url: &str, bucket: &str, api_key: SecretString) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, bucket, api_key)
    }

    pub fn with_client(
        client: reqwest::Client,
        base_url: &str,
        bucket: &str,
        api_key: SecretString,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
            api_key,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn object_url(&self, kind: Option<&str>, name: &str) -> String {
        match kind {
            Some(kind) => format!(
                "{}/storage/v1/object/{}/{}/{}",
                self.base_url, kind, self.bucket, name
            ),
            None => format!("{}/storage/v1/object/{}/{}", self.base_url, self.bucket, name),
        }
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let key = self.api_key.expose_secret();
        req.header("apikey", key)
            .header("Authorization", format!("Bearer {}", key))
    }

    fn object_name<'a>(&self, location: &'a BlobLocation) -> Result<&'a str, ObjectStoreError> {
        location.object_name(&self.bucket).ok_or_else(|| {
            ObjectStoreError::NotFound(format!(
                "{} is not an object in bucket '{}'",
                location, self.bucket
            ))
        })
    }
}

fn transport(e: reqwest::Error, wrap: fn(String) -> ObjectStoreError) -> ObjectStoreError {
    if e.is_timeout() {
        ObjectStoreError::Timeout
    } else {
        wrap(e.to_string())
    }
}

#[async_trait]
impl ObjectStore for SupabaseStorage {
    async fn put(&self, name: &BlobName, bytes: Vec<u8>) -> Result<BlobLocation, ObjectStoreError> {
        let resp = self
            .authed(self.client.post(self.object_url(None, name.as_str())))
            .header("Content-Type", "text/plain;charset=UTF-8")
            .header("Cache-Control", CACHE_CONTROL)
            .header("x-upsert", "false")
            .body(bytes)
            .send()
            .await
            .map_err(|e| transport(e, ObjectStoreError::Upload))?;

        if !resp.status().is_success() {
            let (status, message) = error_message(resp).await;
            return Err(ObjectStoreError::Upload(format!("{}: {}", status.as_u16(), message)));
        }

        tracing::debug!(bucket = %self.bucket, object = %name, "ciphertext uploaded");
        Ok(BlobLocation::new(name.as_str()))
    }

    async fn get(&self, location: &BlobLocation) -> Result<Vec<u8>, ObjectStoreError> {
        // Signed URLs carry their own token
        let req = if location.is_url() {
            self.client.get(location.as_str())
        } else {
            self.authed(
                self.client
                    .get(self.object_url(Some("authenticated"), location.as_str())),
            )
        };

        let resp = req
            .send()
            .await
            .map_err(|e| transport(e, ObjectStoreError::Fetch))?;

        match resp.status() {
            s if s.is_success() => {}
            StatusCode::NOT_FOUND => {
                return Err(ObjectStoreError::NotFound(location.to_string()));
            }
            _ => {
                let (status, message) = error_message(resp).await;
                if message.to_ascii_lowercase().contains("not found") {
                    return Err(ObjectStoreError::NotFound(location.to_string()));
                }
                return Err(ObjectStoreError::Fetch(format!("{}: {}", status.as_u16(), message)));
            }
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| transport(e, ObjectStoreError::Fetch))?;
        Ok(bytes.to_vec())
    }

    async fn delete(&self, location: &BlobLocation) -> Result<(), ObjectStoreError> {
        let name = self.object_name(location)?;
        let resp = self
            .authed(
                self.client
                    .delete(format!("{}/storage/v1/object/{}", self.base_url, self.bucket)),
            )
            .json(&serde_json::json!({ "prefixes": [name] }))
            .send()
            .await
            .map_err(|e| transport(e, ObjectStoreError::Delete))?;

        if !resp.status().is_success() {
            let (status, message) = error_message(resp).await;
            return Err(ObjectStoreError::Delete(format!("{}: {}", status.as_u16(), message)));
        }

        tracing::debug!(bucket = %self.bucket, object = name, "ciphertext deleted");
        Ok(())
    }

    async fn signed_url(
        &self,
        location: &BlobLocation,
        expires_in: Duration,
    ) -> Result<String, ObjectStoreError> {
        // Legacy signed URLs may have expired; sign the object they point at again
        let name = self.object_name(location)?;

        let resp = self
            .authed(self.client.post(self.object_url(Some("sign"), name)))
            .json(&serde_json::json!({ "expiresIn": expires_in.as_secs() }))
            .send()
            .await
            .map_err(|e| transport(e, ObjectStoreError::Sign))?;

        if !resp.status().is_success() {
            let (status, message) = error_message(resp).await;
            return Err(ObjectStoreError::Sign(format!("{}: {}", status.as_u16(), message)));
        }

        let signed: SignedUrlResponse = resp
            .json()
            .await
            .map_err(|e| ObjectStoreError::Sign(e.to_string()))?;

        // Supabase answers with a path relative to /storage/v1
        if signed.signed_url.starts_with("http") {
            Ok(signed.signed_url)
        } else {
            Ok(format!("{}/storage/v1{}", self.base_url, signed.signed_url))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn storage(server: &MockServer) -> SupabaseStorage {
        SupabaseStorage::new(&server.uri(), "vault", SecretString::new("anon-key".into()))
    }

    #[tokio::test]
    async fn test_put_uploads_without_upsert() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/storage/v1/object/vault/abc_insta.txt"))
            .and(header("apikey", "anon-key"))
            .and(header("authorization", "Bearer anon-key"))
            .and(header("x-upsert", "false"))
            .and(header("content-type", "text/plain;charset=UTF-8"))
            .and(header("cache-control", "max-age=3600"))
            .and(body_string("CIPHERTEXT"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({ "Key": "vault/abc_insta.txt" }),
            ))
            .expect(1)
            .mount(&server)
            .await;

        let name = BlobName::new("abc_insta.txt");
        let location = storage(&server)
            .put(&name, b"CIPHERTEXT".to_vec())
            .await
            .unwrap();
        assert_eq!(location.as_str(), "abc_insta.txt");
    }

    #[tokio::test]
    async fn test_put_conflict_is_upload_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(409).set_body_json(serde_json::json!({
                "statusCode": "409",
                "error": "Duplicate",
                "message": "The resource already exists"
            })))
            .mount(&server)
            .await;

        let err = storage(&server)
            .put(&BlobName::new("dup.txt"), vec![1])
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ObjectStoreError::Upload("409: The resource already exists".into())
        );
    }

    #[tokio::test]
    async fn test_get_reads_authenticated_object() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/storage/v1/object/authenticated/vault/abc.txt"))
            .and(header("apikey", "anon-key"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Q0lQSEVS"))
            .mount(&server)
            .await;

        let bytes = storage(&server)
            .get(&BlobLocation::new("abc.txt"))
            .await
            .unwrap();
        assert_eq!(bytes, b"Q0lQSEVS");
    }

    #[tokio::test]
    async fn test_get_follows_legacy_signed_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/storage/v1/object/sign/vault/old.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("OLD"))
            .mount(&server)
            .await;

        let url = format!("{}/storage/v1/object/sign/vault/old.txt?token=t", server.uri());
        let bytes = storage(&server).get(&BlobLocation::new(url)).await.unwrap();
        assert_eq!(bytes, b"OLD");
    }

    #[tokio::test]
    async fn test_get_missing_object() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "statusCode": "404",
                "error": "not_found",
                "message": "Object not found"
            })))
            .mount(&server)
            .await;

        let err = storage(&server)
            .get(&BlobLocation::new("gone.txt"))
            .await
            .unwrap_err();
        assert_eq!(err, ObjectStoreError::NotFound("gone.txt".into()));
    }

    #[tokio::test]
    async fn test_delete_sends_prefixes() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/storage/v1/object/vault"))
            .and(body_json(serde_json::json!({ "prefixes": ["abc.txt"] })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(1)
            .mount(&server)
            .await;

        storage(&server)
            .delete(&BlobLocation::new("abc.txt"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_signed_url_is_absolute() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/storage/v1/object/sign/vault/abc.txt"))
            .and(body_json(serde_json::json!({ "expiresIn": 604800 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "signedURL": "/object/sign/vault/abc.txt?token=tok"
            })))
            .mount(&server)
            .await;

        let url = storage(&server)
            .signed_url(&BlobLocation::new("abc.txt"), Duration::from_secs(7 * 24 * 60 * 60))
            .await
            .unwrap();
        assert_eq!(
            url,
            format!("{}/storage/v1/object/sign/vault/abc.txt?token=tok", server.uri())
        );
    }

    #[tokio::test]
    async fn test_signed_url_resigns_legacy_location() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/storage/v1/object/sign/vault/old_insta.txt"))
            .and(header("apikey", "anon-key"))
            .and(body_json(serde_json::json!({ "expiresIn": 3600 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "signedURL": "/object/sign/vault/old_insta.txt?token=fresh"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let stale = BlobLocation::new(format!(
            "{}/storage/v1/object/sign/vault/old_insta.txt?token=expired",
            server.uri()
        ));
        let url = storage(&server)
            .signed_url(&stale, Duration::from_secs(3600))
            .await
            .unwrap();
        assert_eq!(
            url,
            format!("{}/storage/v1/object/sign/vault/old_insta.txt?token=fresh", server.uri())
        );
    }

    #[tokio::test]
    async fn test_signed_url_rejects_foreign_url() {
        let server = MockServer::start().await;
        let foreign = BlobLocation::new("https://elsewhere.example/files/abc.txt");
        let err = storage(&server)
            .signed_url(&foreign, Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(matches!(err, ObjectStoreError::NotFound(_)));
    }
}
