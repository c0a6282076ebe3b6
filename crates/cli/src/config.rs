//! CLI configuration

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use storefront_http::credentials::CredentialTtl;

/// Environment variable prefix; nested keys use `__`, e.g. `STOREFRONT__API__BASE_URL`
const ENV_PREFIX: &str = "STOREFRONT";

/// Main CLI configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Backend API configuration
    pub api: ApiSettings,

    /// Credential storage configuration
    pub storage: StorageSettings,
}

/// Backend API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSettings {
    /// Base URL of the storefront backend
    pub base_url: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// User agent sent with every request
    pub user_agent: Option<String>,
}

/// Credential storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Directory holding credential files and logs
    pub data_dir: PathBuf,

    /// Cookie lifetime of the access token in seconds
    pub access_cookie_ttl_secs: u64,

    /// Cookie lifetime of the refresh token in seconds
    pub refresh_cookie_ttl_secs: u64,

    /// Lifetime of durable credentials in seconds
    pub durable_ttl_secs: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            timeout_secs: 10,
            user_agent: None,
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        let ttl = CredentialTtl::default();
        Self {
            data_dir: default_data_dir(),
            access_cookie_ttl_secs: ttl.access_cookie.as_secs(),
            refresh_cookie_ttl_secs: ttl.refresh_cookie.as_secs(),
            durable_ttl_secs: ttl.durable.as_secs(),
        }
    }
}

impl StorageSettings {
    pub fn ttl(&self) -> CredentialTtl {
        CredentialTtl {
            access_cookie: Duration::from_secs(self.access_cookie_ttl_secs),
            refresh_cookie: Duration::from_secs(self.refresh_cookie_ttl_secs),
            durable: Duration::from_secs(self.durable_ttl_secs),
        }
    }

    pub fn cookie_file(&self) -> PathBuf {
        self.data_dir.join("cookies.json")
    }

    pub fn durable_file(&self) -> PathBuf {
        self.data_dir.join("credentials.json")
    }
}

impl ApiSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Settings {
    /// Load configuration: built-in defaults, then the optional file, then
    /// environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or a value cannot be parsed
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = Self::default();

        let mut builder = config::Config::builder()
            .set_default("api.base_url", defaults.api.base_url)?
            .set_default("api.timeout_secs", defaults.api.timeout_secs)?
            .set_default(
                "storage.data_dir",
                defaults.storage.data_dir.to_string_lossy().to_string(),
            )?
            .set_default(
                "storage.access_cookie_ttl_secs",
                defaults.storage.access_cookie_ttl_secs,
            )?
            .set_default(
                "storage.refresh_cookie_ttl_secs",
                defaults.storage.refresh_cookie_ttl_secs,
            )?
            .set_default("storage.durable_ttl_secs", defaults.storage.durable_ttl_secs)?;

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        let settings = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .context("failed to build configuration")?;

        settings
            .try_deserialize()
            .context("failed to parse configuration")
    }

    /// Write these settings as TOML
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Platform data directory for the CLI
pub fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "storefront")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".storefront"))
}
