//! Configuration infrastructure
//!
//! Settings are layered: compiled defaults, an optional config file, then
//! `HARVESTER__*` environment variables (e.g. `HARVESTER__SCRAPER__USER_AGENT`).
//! The [`ConfigManager`] additionally persists a JSON copy in the user's
//! config directory for the CLI.

#![allow(clippy::derivable_impls)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config: {source}")]
    Load {
        #[from]
        source: config::ConfigError,
    },

    #[error("Configuration validation failed: {message}")]
    Validation { message: String },
}

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub scraper: ScraperConfig,
    pub jobs: JobsConfig,
    pub store: StoreConfig,
    pub search: SearchConfig,
    pub logging: LoggingConfig,
}

/// A host that rejects bare requests and expects a matching referer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProtectedDomain {
    pub host: String,
    pub referer: String,
}

/// HTTP fetch and extraction behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub user_agent: String,
    pub accept: String,
    pub accept_language: String,

    /// Per-attempt timeout
    pub request_timeout_seconds: u64,

    /// Attempt ceiling per URL, across every failure kind
    pub max_attempts: u32,

    /// Wait after the n-th blocked (403) attempt is `n * blocked_backoff_seconds`
    pub blocked_backoff_seconds: u64,

    /// Wait after the n-th transport failure is `n * transport_backoff_seconds`
    pub transport_backoff_seconds: u64,

    /// Retry once without certificate validation after a TLS failure
    pub insecure_tls_fallback: bool,

    pub follow_redirects: bool,
    pub max_redirects: usize,

    pub protected_domains: Vec<ProtectedDomain>,

    /// Referers tried, in order, after the first blocked attempt
    pub referer_rotation: Vec<String>,

    /// Host of the publishing platform; links to it are never "external"
    pub platform_domain: String,

    /// Base used to absolutize relative author links
    pub platform_base_url: String,

    /// Host fragment identifying the media CDN whose sizing params are stripped
    pub media_cdn_domain: String,
}

/// Batch job pacing and retention
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    pub default_delay_seconds: f64,
    pub min_delay_seconds: f64,
    pub max_delay_seconds: f64,

    /// Terminal jobs older than this are evicted
    pub retention_seconds: u64,

    /// How often the eviction sweep runs
    pub cleanup_interval_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
}

/// Weighted blend used to rank search results
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub similarity_weight: f64,
    pub popularity_weight: f64,

    /// Claps at or above this count score full popularity
    pub popularity_cap: u64,

    /// Leading body characters indexed per article
    pub body_chars: usize,

    pub default_top_k: usize,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    pub json_format: bool,
    pub console_output: bool,
    pub file_output: bool,

    /// Defaults to `logs/` next to the executable
    pub log_dir: Option<PathBuf>,

    pub file_name: String,

    /// Per-target level caps applied unless the level is "trace"
    pub module_filters: HashMap<String, String>,
}

/// Default configuration values
pub mod defaults {
    pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
    pub const ACCEPT: &str =
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";
    pub const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

    pub const REQUEST_TIMEOUT_SECONDS: u64 = 30;
    pub const MAX_ATTEMPTS: u32 = 3;
    pub const BLOCKED_BACKOFF_SECONDS: u64 = 3;
    pub const TRANSPORT_BACKOFF_SECONDS: u64 = 2;
    pub const MAX_REDIRECTS: usize = 10;

    pub const PLATFORM_DOMAIN: &str = "medium.com";
    pub const PLATFORM_BASE_URL: &str = "https://medium.com";
    pub const PLATFORM_REFERER: &str = "https://medium.com/";
    pub const REFERER_ROTATION: &[&str] = &["https://www.google.com/", "https://www.bing.com/"];

    pub const DEFAULT_DELAY_SECONDS: f64 = 1.0;
    pub const MIN_DELAY_SECONDS: f64 = 0.1;
    pub const MAX_DELAY_SECONDS: f64 = 10.0;
    pub const JOB_RETENTION_SECONDS: u64 = 3600;
    pub const CLEANUP_INTERVAL_SECONDS: u64 = 300;

    pub const STORE_PATH: &str = "scraping_results.csv";

    pub const SIMILARITY_WEIGHT: f64 = 0.7;
    pub const POPULARITY_WEIGHT: f64 = 0.3;
    pub const POPULARITY_CAP: u64 = 10_000;
    pub const SEARCH_BODY_CHARS: usize = 1000;
    pub const SEARCH_TOP_K: usize = 10;

    pub const LOG_LEVEL: &str = "info";
    pub const LOG_FILE_NAME: &str = "harvester.log";
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            scraper: ScraperConfig::default(),
            jobs: JobsConfig::default(),
            store: StoreConfig::default(),
            search: SearchConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::USER_AGENT.to_string(),
            accept: defaults::ACCEPT.to_string(),
            accept_language: defaults::ACCEPT_LANGUAGE.to_string(),
            request_timeout_seconds: defaults::REQUEST_TIMEOUT_SECONDS,
            max_attempts: defaults::MAX_ATTEMPTS,
            blocked_backoff_seconds: defaults::BLOCKED_BACKOFF_SECONDS,
            transport_backoff_seconds: defaults::TRANSPORT_BACKOFF_SECONDS,
            insecure_tls_fallback: true,
            follow_redirects: true,
            max_redirects: defaults::MAX_REDIRECTS,
            protected_domains: vec![ProtectedDomain {
                host: defaults::PLATFORM_DOMAIN.to_string(),
                referer: defaults::PLATFORM_REFERER.to_string(),
            }],
            referer_rotation: defaults::REFERER_ROTATION
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            platform_domain: defaults::PLATFORM_DOMAIN.to_string(),
            platform_base_url: defaults::PLATFORM_BASE_URL.to_string(),
            media_cdn_domain: defaults::PLATFORM_DOMAIN.to_string(),
        }
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            default_delay_seconds: defaults::DEFAULT_DELAY_SECONDS,
            min_delay_seconds: defaults::MIN_DELAY_SECONDS,
            max_delay_seconds: defaults::MAX_DELAY_SECONDS,
            retention_seconds: defaults::JOB_RETENTION_SECONDS,
            cleanup_interval_seconds: defaults::CLEANUP_INTERVAL_SECONDS,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(defaults::STORE_PATH),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            similarity_weight: defaults::SIMILARITY_WEIGHT,
            popularity_weight: defaults::POPULARITY_WEIGHT,
            popularity_cap: defaults::POPULARITY_CAP,
            body_chars: defaults::SEARCH_BODY_CHARS,
            default_top_k: defaults::SEARCH_TOP_K,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: false,
            console_output: true,
            file_output: false,
            log_dir: None,
            file_name: defaults::LOG_FILE_NAME.to_string(),
            module_filters: {
                let mut filters = HashMap::new();
                filters.insert("reqwest".to_string(), "info".to_string());
                filters.insert("hyper".to_string(), "warn".to_string());
                filters.insert("html5ever".to_string(), "warn".to_string());
                filters.insert("selectors".to_string(), "warn".to_string());
                filters
            },
        }
    }
}

impl AppConfig {
    /// Layer an optional config file and the environment over the defaults
    pub fn from_sources(path: Option<&Path>) -> Result<Self, ConfigError> {
        let defaults = config::Config::try_from(&Self::default())?;
        let mut builder = config::Config::builder().add_source(defaults);
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix("HARVESTER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scraper.max_attempts == 0 {
            return Err(ConfigError::Validation {
                message: "scraper.max_attempts must be greater than 0".to_string(),
            });
        }
        if self.scraper.request_timeout_seconds == 0 {
            return Err(ConfigError::Validation {
                message: "scraper.request_timeout_seconds must be greater than 0".to_string(),
            });
        }
        let delays = [
            self.jobs.min_delay_seconds,
            self.jobs.max_delay_seconds,
            self.jobs.default_delay_seconds,
        ];
        if delays.iter().any(|d| !d.is_finite()) {
            return Err(ConfigError::Validation {
                message: "jobs delay settings must be finite numbers".to_string(),
            });
        }
        if self.jobs.min_delay_seconds < 0.0
            || self.jobs.min_delay_seconds > self.jobs.max_delay_seconds
        {
            return Err(ConfigError::Validation {
                message: "jobs.min_delay_seconds must be within [0, max_delay_seconds]".to_string(),
            });
        }
        let weights = self.search.similarity_weight + self.search.popularity_weight;
        if self.search.similarity_weight < 0.0 || self.search.popularity_weight < 0.0 || weights <= 0.0
        {
            return Err(ConfigError::Validation {
                message: "search weights must be non-negative and not both zero".to_string(),
            });
        }
        if self.search.popularity_cap == 0 {
            return Err(ConfigError::Validation {
                message: "search.popularity_cap must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}

/// Per-user settings file under the platform config directory
/// (`~/.config/article-harvester/harvester.json` on Linux)
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    const APP_DIR: &'static str = "article-harvester";
    const FILE_NAME: &'static str = "harvester.json";

    pub fn user_config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join(Self::APP_DIR))
            .context("No per-user configuration directory on this platform")
    }

    pub fn for_user() -> Result<Self> {
        Ok(Self::with_path(Self::user_config_dir()?.join(Self::FILE_NAME)))
    }

    pub fn with_path(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load `local` when it exists, otherwise the file of the manager built
    /// by `user`. `user` is only called when there is no local file.
    pub fn load_preferring_local<F>(local: &Path, user: F) -> Result<AppConfig>
    where
        F: FnOnce() -> Result<Self>,
    {
        if local.exists() {
            return Ok(AppConfig::from_sources(Some(local))?);
        }
        Ok(user()?.load()?)
    }

    /// Defaults, then this file if it exists, then `HARVESTER__*` variables
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        if !self.config_path.exists() {
            warn!("No settings file at {:?}, using defaults", self.config_path);
        }
        AppConfig::from_sources(Some(&self.config_path))
    }

    /// Write the compiled defaults unless the file already exists. Returns
    /// whether anything was written.
    pub async fn write_defaults(&self) -> Result<bool> {
        if self.config_path.exists() {
            info!("Settings file already present: {:?}", self.config_path);
            return Ok(false);
        }
        self.save(&AppConfig::default()).await?;
        Ok(true)
    }

    pub async fn save(&self, config: &AppConfig) -> Result<()> {
        config.validate()?;
        if let Some(parent) = self.config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let content = serde_json::to_string_pretty(config).context("Failed to serialize settings")?;
        fs::write(&self.config_path, content)
            .await
            .with_context(|| format!("Failed to write {}", self.config_path.display()))?;

        info!("Saved settings to {:?}", self.config_path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scraper.max_attempts, 3);
        assert_eq!(config.scraper.protected_domains[0].host, "medium.com");
        assert!((config.search.similarity_weight - 0.7).abs() < f64::EPSILON);
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let mut config = AppConfig::default();
        config.scraper.max_attempts = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Validation { .. })));
    }

    #[rstest]
    #[case(f64::NAN, 10.0, 1.0)]
    #[case(0.1, f64::INFINITY, 1.0)]
    #[case(0.1, 10.0, f64::NAN)]
    #[case(f64::NEG_INFINITY, 10.0, 1.0)]
    fn test_non_finite_delays_rejected(#[case] min: f64, #[case] max: f64, #[case] default: f64) {
        let mut config = AppConfig::default();
        config.jobs.min_delay_seconds = min;
        config.jobs.max_delay_seconds = max;
        config.jobs.default_delay_seconds = default;
        assert!(matches!(config.validate(), Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_local_file_wins_without_touching_user_settings() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("harvester.toml");
        std::fs::write(&local, "[jobs]\nretention_seconds = 60\n").unwrap();

        let config =
            ConfigManager::load_preferring_local(&local, || Err(anyhow::anyhow!("no home directory"))).unwrap();
        assert_eq!(config.jobs.retention_seconds, 60);
    }

    #[test]
    fn test_user_settings_used_when_no_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let user_file = dir.path().join("harvester.json");
        std::fs::write(&user_file, r#"{ "search": { "default_top_k": 7 } }"#).unwrap();

        let config = ConfigManager::load_preferring_local(&dir.path().join("harvester.toml"), || {
            Ok(ConfigManager::with_path(&user_file))
        })
        .unwrap();
        assert_eq!(config.search.default_top_k, 7);

        let missing_home = ConfigManager::load_preferring_local(&dir.path().join("absent.toml"), || {
            Err(anyhow::anyhow!("no home directory"))
        });
        assert!(missing_home.is_err());
    }

    #[test]
    fn test_from_sources_reads_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harvester.json");
        std::fs::write(&path, r#"{ "jobs": { "retention_seconds": 60 } }"#).unwrap();

        let config = AppConfig::from_sources(Some(&path)).unwrap();
        assert_eq!(config.jobs.retention_seconds, 60);
        assert_eq!(config.scraper.max_attempts, defaults::MAX_ATTEMPTS);
    }

    #[tokio::test]
    async fn test_config_manager_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::with_path(dir.path().join("nested").join("harvester.json"));

        assert!(manager.write_defaults().await.unwrap());
        assert!(!manager.write_defaults().await.unwrap());

        let mut changed = manager.load().unwrap();
        changed.store.path = PathBuf::from("other.csv");
        changed.search.default_top_k = 3;
        manager.save(&changed).await.unwrap();

        let reloaded = manager.load().unwrap();
        assert_eq!(reloaded.store.path, PathBuf::from("other.csv"));
        assert_eq!(reloaded.search.default_top_k, 3);
    }

    #[tokio::test]
    async fn test_missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::with_path(dir.path().join("absent.json"));

        let config = manager.load().unwrap();
        assert_eq!(config.jobs.retention_seconds, defaults::JOB_RETENTION_SECONDS);
        assert!(!manager.config_path().exists());
    }

    #[tokio::test]
    async fn test_invalid_settings_are_not_saved() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::with_path(dir.path().join("harvester.json"));
        let mut config = AppConfig::default();
        config.search.popularity_cap = 0;

        assert!(manager.save(&config).await.is_err());
        assert!(!manager.config_path().exists());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harvester.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(ConfigManager::with_path(&path).load().is_err());
    }
}
