//! Client configuration
//!
//! Read from `~/.hereandalways/config.json`, then overridden by environment
//! variables. The storage key only ever lives in a `SecretString` once loaded.

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub const DEFAULT_API_URL: &str = "http://localhost:8081/api";
pub const DEFAULT_BUCKET: &str = "vault";
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(15);
/// Signed download links last a week.
pub const DEFAULT_SIGNED_URL_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("No home directory")]
    NoHome,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// On-disk shape. Every field is optional so partial files are fine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConfigFile {
    pub api_url: Option<String>,
    pub owner_id: Option<Uuid>,
    pub account: Option<String>,
    pub storage_url: Option<String>,
    pub storage_bucket: Option<String>,
    pub storage_key: Option<String>,
    pub fetch_timeout_secs: Option<u64>,
    pub signed_url_ttl_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_url: String,
    pub owner_id: Option<Uuid>,
    /// Keychain account the session token is stored under.
    pub account: Option<String>,
    pub storage_url: Option<String>,
    pub storage_bucket: String,
    pub storage_key: Option<SecretString>,
    pub fetch_timeout: Duration,
    pub signed_url_ttl: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            owner_id: None,
            account: None,
            storage_url: None,
            storage_bucket: DEFAULT_BUCKET.to_string(),
            storage_key: None,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            signed_url_ttl: DEFAULT_SIGNED_URL_TTL,
        }
    }
}

impl AppConfig {
    /// `~/.hereandalways/config.json`
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        Ok(dirs::home_dir()
            .ok_or(ConfigError::NoHome)?
            .join(".hereandalways")
            .join("config.json"))
    }

    /// Load from `path` (missing file is fine) with process environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let file = read_file(path)?;
        Self::from_sources(file, |key| std::env::var(key).ok())
    }

    pub fn from_sources<E>(file: ConfigFile, env: E) -> Result<Self, ConfigError>
    where
        E: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());
        let defaults = AppConfig::default();

        let owner_id = match env("HAA_OWNER_ID") {
            Some(raw) => Some(Uuid::parse_str(raw.trim()).map_err(|e| ConfigError::Invalid {
                key: "HAA_OWNER_ID",
                reason: e.to_string(),
            })?),
            None => file.owner_id,
        };

        Ok(Self {
            api_url: env("HAA_API_URL")
                .or(file.api_url)
                .unwrap_or(defaults.api_url),
            owner_id,
            account: env("HAA_ACCOUNT").or(file.account),
            storage_url: env("SUPABASE_URL").or(file.storage_url),
            storage_bucket: env("HAA_STORAGE_BUCKET")
                .or(file.storage_bucket)
                .unwrap_or(defaults.storage_bucket),
            storage_key: env("SUPABASE_KEY").or(file.storage_key).map(SecretString::new),
            fetch_timeout: secs(env("HAA_FETCH_TIMEOUT_SECS"), "HAA_FETCH_TIMEOUT_SECS")?
                .or(file.fetch_timeout_secs.map(Duration::from_secs))
                .unwrap_or(defaults.fetch_timeout),
            signed_url_ttl: secs(env("HAA_SIGNED_URL_TTL_SECS"), "HAA_SIGNED_URL_TTL_SECS")?
                .or(file.signed_url_ttl_secs.map(Duration::from_secs))
                .unwrap_or(defaults.signed_url_ttl),
        })
    }

    pub fn require_owner(&self) -> Result<Uuid, ConfigError> {
        self.owner_id.ok_or(ConfigError::Invalid {
            key: "ownerId",
            reason: "not set; run `hereandalways login` or set HAA_OWNER_ID".to_string(),
        })
    }
}

fn secs(raw: Option<String>, key: &'static str) -> Result<Option<Duration>, ConfigError> {
    raw.map(|v| {
        v.trim()
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| ConfigError::Invalid {
                key,
                reason: e.to_string(),
            })
    })
    .transpose()
}

pub fn read_file(path: &Path) -> Result<ConfigFile, ConfigError> {
    if !path.exists() {
        return Ok(ConfigFile::default());
    }
    let data = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

/// Write `file`, creating the parent directory if needed.
pub fn write_file(path: &Path, file: &ConfigFile) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_vec_pretty(file)?)?;
    Ok(())
}
