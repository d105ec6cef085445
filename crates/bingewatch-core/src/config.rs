//! Configuration management for bingewatch.
//!
//! Loads configuration from ${BINGEWATCH_HOME}/config.toml with sensible defaults.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

/// Embedded template written by `bingewatch config init`.
fn default_config_template() -> &'static str {
    include_str!("../default_config.toml")
}

pub mod paths {
    //! Path resolution for bingewatch configuration and data directories.
    //!
    //! BINGEWATCH_HOME resolution order:
    //! 1. BINGEWATCH_HOME environment variable (if set)
    //! 2. ~/.config/bingewatch (default)
    //! 3. ./.bingewatch when no home directory can be determined

    use std::path::PathBuf;

    /// Returns the bingewatch home directory.
    pub fn bingewatch_home() -> PathBuf {
        if let Ok(home) = std::env::var("BINGEWATCH_HOME") {
            return PathBuf::from(home);
        }

        dirs::home_dir().map_or_else(
            || PathBuf::from(".bingewatch"),
            |h| h.join(".config").join("bingewatch"),
        )
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> PathBuf {
        bingewatch_home().join("config.toml")
    }

    /// Returns the path to the persisted identity session.
    pub fn session_path() -> PathBuf {
        bingewatch_home().join("session.json")
    }

    /// Returns the directory that holds rolling log files.
    pub fn logs_dir() -> PathBuf {
        bingewatch_home().join("logs")
    }
}

/// Identity provider (Appwrite) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Appwrite API endpoint, e.g. `https://cloud.appwrite.io/v1`.
    pub endpoint: Option<String>,
    /// Appwrite project ID.
    pub project_id: Option<String>,
    /// Platform identifier registered with the project.
    pub platform: String,
    /// OAuth provider used for sign-in.
    pub oauth_provider: String,
    /// How long to wait for the browser callback during login.
    pub login_timeout_secs: u64,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            project_id: None,
            platform: Config::DEFAULT_PLATFORM.to_string(),
            oauth_provider: Config::DEFAULT_OAUTH_PROVIDER.to_string(),
            login_timeout_secs: Config::DEFAULT_LOGIN_TIMEOUT_SECS,
        }
    }
}

impl IdentityConfig {
    /// Returns the effective endpoint (env override first), without a trailing slash.
    pub fn effective_endpoint(&self) -> Option<String> {
        env_override("BINGEWATCH_APPWRITE_ENDPOINT")
            .or_else(|| non_empty(self.endpoint.as_deref()))
            .map(|url| url.trim_end_matches('/').to_string())
    }

    /// Returns the effective project ID (env override first).
    pub fn effective_project_id(&self) -> Option<String> {
        env_override("BINGEWATCH_APPWRITE_PROJECT_ID")
            .or_else(|| non_empty(self.project_id.as_deref()))
    }

    pub fn login_timeout(&self) -> Duration {
        Duration::from_secs(self.login_timeout_secs.max(1))
    }
}

/// Movie catalog (TMDb) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// API base URL.
    pub base_url: String,
    /// Bearer token (API read access token).
    pub api_token: Option<String>,
    /// Base URL for poster images.
    pub image_base_url: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: Config::DEFAULT_CATALOG_URL.to_string(),
            api_token: None,
            image_base_url: Config::DEFAULT_IMAGE_URL.to_string(),
        }
    }
}

impl CatalogConfig {
    /// Returns the effective base URL (env override first), without a trailing slash.
    pub fn effective_base_url(&self) -> String {
        env_override("BINGEWATCH_TMDB_BASE_URL")
            .unwrap_or_else(|| self.base_url.trim().to_string())
            .trim_end_matches('/')
            .to_string()
    }

    /// Returns the effective bearer token if set and non-empty.
    pub fn effective_api_token(&self) -> Option<String> {
        env_override("BINGEWATCH_TMDB_TOKEN").or_else(|| non_empty(self.api_token.as_deref()))
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Timeout for every HTTP request in seconds (0 disables)
    pub request_timeout_secs: u64,

    /// Quiet period before a search query is sent, in milliseconds
    pub search_debounce_ms: u64,

    /// Identity provider settings
    pub identity: IdentityConfig,

    /// Movie catalog settings
    pub catalog: CatalogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            request_timeout_secs: Self::DEFAULT_REQUEST_TIMEOUT_SECS,
            search_debounce_ms: Self::DEFAULT_SEARCH_DEBOUNCE_MS,
            identity: IdentityConfig::default(),
            catalog: CatalogConfig::default(),
        }
    }
}

impl Config {
    const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
    const DEFAULT_SEARCH_DEBOUNCE_MS: u64 = 500;
    const DEFAULT_LOGIN_TIMEOUT_SECS: u64 = 180;
    const DEFAULT_PLATFORM: &str = "com.koirah_technologies.bingewatch";
    const DEFAULT_OAUTH_PROVIDER: &str = "google";
    const DEFAULT_CATALOG_URL: &str = "https://api.themoviedb.org/3";
    const DEFAULT_IMAGE_URL: &str = "https://image.tmdb.org/t/p/w500";

    /// Loads configuration from the default config path.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_path())
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        if self.request_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.request_timeout_secs))
        }
    }

    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }

    /// Builds the HTTP client shared by the identity and catalog clients.
    pub fn http_client(&self) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = self.request_timeout() {
            builder = builder.timeout(timeout);
        }
        builder.build().context("Failed to build HTTP client")
    }

    /// Creates a default config file at the given path.
    /// Returns an error if the file already exists.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            bail!("Config file already exists at {}", path.display());
        }

        Self::write_config(path, default_config_template())
    }

    /// Writes config content to a file, creating parent directories as needed.
    /// Uses atomic write (temp file + rename) to prevent corruption.
    fn write_config(path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let tmp_path = path.with_extension("toml.tmp");
        fs::write(&tmp_path, content)
            .with_context(|| format!("Failed to write config to {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path).with_context(|| {
            format!(
                "Failed to move {} into place at {}",
                tmp_path.display(),
                path.display()
            )
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn env_override(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("nonexistent.toml");

        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(config.search_debounce_ms, 500);
        assert_eq!(config.catalog.base_url, "https://api.themoviedb.org/3");
        assert_eq!(config.identity.endpoint, None);
    }

    #[test]
    fn test_load_partial_config_merges_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");

        fs::write(
            &config_path,
            "search_debounce_ms = 250\n\n[identity]\nproject_id = \"abc123\"\n",
        )
        .unwrap();

        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(config.search_debounce(), Duration::from_millis(250));
        assert_eq!(config.identity.project_id.as_deref(), Some("abc123"));
        assert_eq!(config.identity.oauth_provider, "google");
        assert_eq!(config.request_timeout_secs, 30);
    }

    #[test]
    fn test_load_invalid_toml_fails_with_path() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(&config_path, "search_debounce_ms = [").unwrap();

        let err = Config::load_from(&config_path).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to parse config"));
    }

    #[test]
    fn test_init_creates_config_with_template() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("subdir").join("config.toml");

        Config::init(&config_path).unwrap();

        let contents = fs::read_to_string(&config_path).unwrap();
        assert!(contents.contains("[identity]"));
        assert!(contents.contains("[catalog]"));

        // The template must parse back into a config.
        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(config.search_debounce_ms, 500);
    }

    #[test]
    fn test_init_fails_if_exists() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(&config_path, "# existing").unwrap();

        let err = Config::init(&config_path).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_zero_timeout_disables_request_timeout() {
        let config = Config {
            request_timeout_secs: 0,
            ..Config::default()
        };
        assert_eq!(config.request_timeout(), None);
    }

    #[test]
    fn test_blank_values_are_ignored() {
        assert_eq!(non_empty(Some("  ")), None);
        assert_eq!(non_empty(Some(" tok ")), Some("tok".to_string()));
    }
}
