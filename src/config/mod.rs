//! Configuration and credential storage

use anyhow::{ensure, Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::TransportSettings;
use crate::auth::{Credentials, TokenStore};
use crate::models::UserProfile;

/// Application configuration
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub session: SessionConfig,
    pub capture: CaptureConfig,
    /// Stored credentials from the last login
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials: Option<StoredCredentials>,
}

/// Backend connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL every endpoint path is resolved against
    pub base_url: String,
    pub request_timeout_secs: u64,
    /// Retries on connection failure or timeout, per call
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000/".to_string(),
            request_timeout_secs: 10,
            max_retries: 3,
            retry_backoff_ms: 1000,
        }
    }
}

impl ApiConfig {
    pub fn transport_settings(&self) -> TransportSettings {
        TransportSettings {
            timeout: Duration::from_secs(self.request_timeout_secs),
            max_retries: self.max_retries,
            backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }
}

/// Session timer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub screenshot_interval_secs: u64,
    /// A `timer/update` is sent every this many running seconds
    pub update_interval_secs: u64,
    /// Initial state of the auto-screenshot toggle
    pub auto_screenshot: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            screenshot_interval_secs: 180,
            update_interval_secs: 60,
            auto_screenshot: false,
        }
    }
}

impl SessionConfig {
    pub fn screenshot_interval(&self) -> Duration {
        Duration::from_secs(self.screenshot_interval_secs)
    }
}

/// External screen grabber. Must write a PNG to stdout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub command: Vec<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        let argv: &[&str] = if cfg!(target_os = "macos") {
            &["screencapture", "-x", "-t", "png", "/dev/stdout"]
        } else {
            &["import", "-window", "root", "png:-"]
        };
        Self {
            command: argv.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Credentials as persisted on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCredentials {
    pub access_token: String,
    pub refresh_token: String,
    /// User profile (JSON stored as string for TOML compat)
    pub user: String,
}

impl From<&Credentials> for StoredCredentials {
    fn from(creds: &Credentials) -> Self {
        Self {
            access_token: creds.access_token.clone(),
            refresh_token: creds.refresh_token.clone(),
            user: creds.user.as_value().to_string(),
        }
    }
}

impl StoredCredentials {
    fn into_credentials(self) -> Option<Credentials> {
        if self.access_token.is_empty() || self.refresh_token.is_empty() {
            return None;
        }
        let user = serde_json::from_str(&self.user)
            .map(UserProfile::new)
            .unwrap_or_default();
        Some(Credentials::new(self.access_token, self.refresh_token, user))
    }
}

impl Config {
    /// Get config directory path
    fn config_dir() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "worklog", "worklog")
            .context("Could not determine config directory")?;
        Ok(proj_dirs.config_dir().to_path_buf())
    }

    /// Get config file path
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path`, falling back to defaults if absent
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).context("Failed to read config file")?;
        let config: Self = toml::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content).context("Failed to write config file")?;

        // Set restrictive permissions on config file (contains tokens)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(path, perms).context("Failed to set config permissions")?;
        }

        Ok(())
    }

    /// Reject settings that would make the client misbehave
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.api.base_url)
            .with_context(|| format!("Invalid api.base_url '{}'", self.api.base_url))?;
        ensure!(
            self.api.request_timeout_secs > 0,
            "api.request_timeout_secs must be greater than zero"
        );
        ensure!(
            self.session.screenshot_interval_secs > 0,
            "session.screenshot_interval_secs must be greater than zero"
        );
        ensure!(
            self.session.update_interval_secs > 0,
            "session.update_interval_secs must be greater than zero"
        );
        Ok(())
    }
}

/// `TokenStore` backed by the `[credentials]` table of a config file.
///
/// Every operation re-reads the file so other settings edited on disk are
/// preserved.
pub struct ConfigTokenStore {
    path: PathBuf,
}

impl ConfigTokenStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn update(&self, credentials: Option<StoredCredentials>) -> Result<()> {
        let mut config = Config::load_from(&self.path)?;
        if config.credentials.is_none() && credentials.is_none() && !self.path.exists() {
            return Ok(());
        }
        config.credentials = credentials;
        config.save_to(&self.path)
    }
}

impl TokenStore for ConfigTokenStore {
    fn load(&self) -> Result<Option<Credentials>> {
        let config = Config::load_from(&self.path)?;
        Ok(config
            .credentials
            .and_then(StoredCredentials::into_credentials))
    }

    fn save(&self, credentials: &Credentials) -> Result<()> {
        self.update(Some(credentials.into()))
    }

    fn clear(&self) -> Result<()> {
        self.update(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn temp_config(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "worklog-test-{}-{}",
            std::process::id(),
            name
        ));
        let _ = fs::remove_dir_all(&dir);
        dir.join("config.toml")
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.api.base_url, "http://localhost:3000/");
        assert_eq!(config.api.request_timeout_secs, 10);
        assert_eq!(config.api.max_retries, 3);
        assert_eq!(config.session.screenshot_interval_secs, 180);
        assert_eq!(config.session.update_interval_secs, 60);
        assert!(!config.capture.command.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let path = temp_config("missing");
        let config = Config::load_from(&path).unwrap();
        assert!(config.credentials.is_none());
        assert_eq!(config.api.max_retries, 3);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let path = temp_config("partial");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(
            &path,
            "[api]\nbase_url = \"https://tracker.example.com/api/\"\n\n[session]\nauto_screenshot = true\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.api.base_url, "https://tracker.example.com/api/");
        assert_eq!(config.api.request_timeout_secs, 10);
        assert!(config.session.auto_screenshot);
        assert_eq!(config.session.screenshot_interval_secs, 180);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let path = temp_config("zero");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "[session]\nupdate_interval_secs = 0\n").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("update_interval_secs"));
    }

    #[test]
    fn test_token_store_roundtrip_preserves_settings() {
        let path = temp_config("store");
        let mut config = Config::default();
        config.api.max_retries = 7;
        config.save_to(&path).unwrap();

        let store = ConfigTokenStore::new(path.clone());
        let creds = Credentials::new(
            "at",
            "rt",
            UserProfile::new(json!({"id": 5, "firstName": "Lin"})),
        );
        store.save(&creds).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, creds);
        assert_eq!(loaded.user.first_name(), Some("Lin"));
        assert_eq!(Config::load_from(&path).unwrap().api.max_retries, 7);

        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
        assert_eq!(Config::load_from(&path).unwrap().api.max_retries, 7);
    }

    #[test]
    fn test_clear_without_file_does_not_create_it() {
        let path = temp_config("noclear");
        ConfigTokenStore::new(path.clone()).clear().unwrap();
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_saved_file_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let path = temp_config("perms");
        Config::default().save_to(&path).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
