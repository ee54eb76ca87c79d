//! Wire types for credential records, trustees and blob references

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use hereandalways_crypto::ExportedKey;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Vault categories understood by the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Category {
    #[default]
    Social,
    Bank,
    Email,
    Other,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Social,
        Category::Bank,
        Category::Email,
        Category::Other,
    ];

    /// Wire form, as sent in query strings.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Social => "SOCIAL",
            Category::Bank => "BANK",
            Category::Email => "EMAIL",
            Category::Other => "OTHER",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Category::Social => "Social Media",
            Category::Bank => "Bank Account",
            Category::Email => "Email",
            Category::Other => "Other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SOCIAL" => Ok(Category::Social),
            "BANK" => Ok(Category::Bank),
            "EMAIL" => Ok(Category::Email),
            "OTHER" => Ok(Category::Other),
            other => Err(format!(
                "unknown category '{}' (expected social, bank, email or other)",
                other.to_ascii_lowercase()
            )),
        }
    }
}

/// Collision-resistant object name for a new ciphertext blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobName(String);

impl BlobName {
    /// `{uuid}_{safe_title}.txt`
    pub fn for_title(title: &str) -> Self {
        Self(format!("{}_{}.txt", Uuid::new_v4(), safe_title(title)))
    }

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlobName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whitespace runs become `_`, anything outside `[A-Za-z0-9_.-]` is dropped.
fn safe_title(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut in_space = false;
    for ch in title.chars() {
        if ch.is_whitespace() {
            if !in_space {
                out.push('_');
            }
            in_space = true;
            continue;
        }
        in_space = false;
        if ch.is_ascii_alphanumeric() || matches!(ch, '_' | '.' | '-') {
            out.push(ch.to_ascii_lowercase());
        }
    }
    out
}

/// Where a ciphertext blob lives.
///
/// Normally a bucket-relative object path. Records written by older web
/// clients hold a full signed URL instead.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobLocation(String);

impl BlobLocation {
    pub fn new(location: impl Into<String>) -> Self {
        Self(location.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_url(&self) -> bool {
        self.0.starts_with("https://") || self.0.starts_with("http://")
    }

    /// Bucket-relative object path, recovering it from a signed or public
    /// URL when needed.
    pub fn object_name(&self, bucket: &str) -> Option<&str> {
        if !self.is_url() {
            return Some(&self.0);
        }
        ["sign", "public", "authenticated"].iter().find_map(|kind| {
            let marker = format!("/storage/v1/object/{}/{}/", kind, bucket);
            let start = self.0.find(&marker)? + marker.len();
            let rest = &self.0[start..];
            let end = rest.find('?').unwrap_or(rest.len());
            Some(&rest[..end]).filter(|name| !name.is_empty())
        })
    }
}

impl fmt::Display for BlobLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A stored credential as returned by the backend.
///
/// `passwordOrPin` carries the ciphertext location, never a password.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRecord {
    pub id: Uuid,
    pub title: String,
    pub username_or_card_number: String,
    pub category: Category,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<NaiveDateTime>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub trustee_ids: Vec<Uuid>,
    #[serde(rename = "passwordOrPin")]
    pub ciphertext_location: BlobLocation,
    pub encrypted_key: ExportedKey,
    /// Not part of the response body; filled in by the client that listed it.
    #[serde(default, skip_serializing)]
    pub owner_id: Option<Uuid>,
}

/// Body of create and update requests.
///
/// On update, `None` location and key leave the stored ciphertext untouched.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialPayload {
    pub title: String,
    pub username_or_card_number: String,
    #[serde(rename = "passwordOrPin", skip_serializing_if = "Option::is_none")]
    pub ciphertext_location: Option<BlobLocation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_key: Option<ExportedKey>,
    pub category: Category,
    pub notes: Option<String>,
    pub trustee_ids: Vec<Uuid>,
}

/// A trustee the owner can link credentials to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrusteeSummary {
    pub trustee_id: Uuid,
    #[serde(default)]
    pub trustee_name: Option<String>,
    #[serde(default)]
    pub trustee_email: Option<String>,
}

impl TrusteeSummary {
    pub fn label(&self) -> &str {
        self.trustee_name
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(self.trustee_email.as_deref().filter(|s| !s.is_empty()))
            .unwrap_or("Unnamed")
    }
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| {
        let s = v.as_str()?;
        s.parse::<NaiveDateTime>()
            .ok()
            .or_else(|| {
                chrono::DateTime::parse_from_rfc3339(s)
                    .ok()
                    .map(|dt| dt.naive_utc())
            })
    }))
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_name_shape() {
        let name = BlobName::for_title("My  Bank Login!");
        let (id, rest) = name.as_str().split_once('_').unwrap();
        assert!(Uuid::parse_str(id).is_ok());
        assert_eq!(rest, "my_bank_login.txt");
    }

    #[test]
    fn test_blob_names_do_not_collide() {
        assert_ne!(BlobName::for_title("same"), BlobName::for_title("same"));
    }

    #[test]
    fn test_safe_title_keeps_word_chars() {
        assert_eq!(safe_title("Insta.gram-2 acct"), "insta.gram-2_acct");
        assert_eq!(safe_title("\tÜber/PIN "), "_berpin_");
    }

    #[test]
    fn test_category_parsing() {
        assert_eq!("bank".parse::<Category>().unwrap(), Category::Bank);
        assert_eq!(" EMAIL ".parse::<Category>().unwrap(), Category::Email);
        assert!("crypto".parse::<Category>().is_err());
        assert_eq!(Category::default(), Category::Social);
        assert_eq!(serde_json::to_string(&Category::Other).unwrap(), "\"OTHER\"");
    }

    #[test]
    fn test_object_name_from_legacy_signed_url() {
        let loc = BlobLocation::new(
            "https://abc.supabase.co/storage/v1/object/sign/vault/1234_insta.txt?token=xyz",
        );
        assert!(loc.is_url());
        assert_eq!(loc.object_name("vault"), Some("1234_insta.txt"));
        assert_eq!(loc.object_name("other"), None);

        let plain = BlobLocation::new("1234_insta.txt");
        assert_eq!(plain.object_name("vault"), Some("1234_insta.txt"));
    }

    #[test]
    fn test_record_deserializes_backend_shape() {
        let json = serde_json::json!({
            "id": "7f1b7a9e-1d2c-4c55-8a7e-0d0b9f6f7c11",
            "title": "Instagram",
            "usernameOrCardNumber": "me@example.com",
            "category": "SOCIAL",
            "notes": null,
            "createdAt": "2025-07-01T12:30:45.123456",
            "trusteeIds": null,
            "passwordOrPin": "abc_instagram.txt",
            "encryptedKey": "AAAA",
            "trustees": null
        });
        let record: CredentialRecord = serde_json::from_value(json).unwrap();
        assert_eq!(record.category, Category::Social);
        assert!(record.trustee_ids.is_empty());
        assert!(record.created_at.is_some());
        assert_eq!(record.ciphertext_location.as_str(), "abc_instagram.txt");
        assert_eq!(record.encrypted_key.as_str(), "AAAA");
        assert_eq!(record.owner_id, None);
    }

    #[test]
    fn test_record_tolerates_array_timestamps() {
        let json = serde_json::json!({
            "id": "7f1b7a9e-1d2c-4c55-8a7e-0d0b9f6f7c11",
            "title": "Bank",
            "usernameOrCardNumber": "4111",
            "category": "BANK",
            "createdAt": [2025, 7, 1, 12, 30],
            "passwordOrPin": "x.txt",
            "encryptedKey": "AAAA"
        });
        let record: CredentialRecord = serde_json::from_value(json).unwrap();
        assert_eq!(record.created_at, None);
    }

    #[test]
    fn test_metadata_only_payload_omits_ciphertext_fields() {
        let payload = CredentialPayload {
            title: "Email".into(),
            username_or_card_number: "me".into(),
            ciphertext_location: None,
            encrypted_key: None,
            category: Category::Email,
            notes: None,
            trustee_ids: vec![],
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("passwordOrPin").is_none());
        assert!(json.get("encryptedKey").is_none());
        assert_eq!(json["category"], "EMAIL");
        assert_eq!(json["usernameOrCardNumber"], "me");
    }

    #[test]
    fn test_trustee_label_fallbacks() {
        let mut t = TrusteeSummary {
            trustee_id: Uuid::new_v4(),
            trustee_name: Some("Ada".into()),
            trustee_email: Some("ada@example.com".into()),
        };
        assert_eq!(t.label(), "Ada");
        t.trustee_name = None;
        assert_eq!(t.label(), "ada@example.com");
        t.trustee_email = Some(String::new());
        assert_eq!(t.label(), "Unnamed");
    }
}
