//! Application configuration structures.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

use super::{ListingLimits, Tier};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Forum API credentials and HTTP behavior
    #[serde(default)]
    pub reddit: RedditConfig,

    /// Filtering and reconciliation settings
    #[serde(default)]
    pub collector: CollectorConfig,

    /// Collection store selection
    #[serde(default)]
    pub storage: StorageConfig,

    /// Community tiers
    #[serde(default = "defaults::tiers")]
    pub tiers: Vec<Tier>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration, or defaults when the file does not exist.
    ///
    /// A file that exists but cannot be read or parsed is an error.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        match Self::load(&path) {
            Err(AppError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                log::warn!("No config at {:?}. Using defaults.", path.as_ref());
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Override secrets and deployment values from the environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_vars(|name| std::env::var(name).ok())
    }

    fn apply_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("REDDIT_CLIENT_ID") {
            self.reddit.client_id = v;
        }
        if let Some(v) = var("REDDIT_CLIENT_SECRET") {
            self.reddit.client_secret = v;
        }
        if let Some(v) = var("REDDIT_USER_AGENT") {
            self.reddit.user_agent = v;
        }
        if let Some(v) = var("STORAGE_BACKEND") {
            self.storage.backend = v.parse()?;
        }
        if let Some(v) = var("STORAGE_PATH") {
            self.storage.path = v;
        }
        if let Some(v) = var("MONGO_URI") {
            self.storage.uri = Some(v);
        }
        if let Some(v) = var("MONGO_HOST") {
            self.storage.host = Some(v);
        }
        if let Some(v) = var("MONGO_USER") {
            self.storage.user = Some(v);
        }
        if let Some(v) = var("MONGO_PASS") {
            self.storage.password = Some(v);
        }
        if let Some(v) = var("MONGO_DB") {
            self.storage.database = v;
        }
        Ok(())
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.reddit.user_agent.trim().is_empty() {
            return Err(AppError::validation("reddit.user_agent is empty"));
        }
        if self.reddit.timeout_secs == 0 {
            return Err(AppError::validation("reddit.timeout_secs must be > 0"));
        }
        if self.collector.batch_size == 0 {
            return Err(AppError::validation("collector.batch_size must be > 0"));
        }
        if self.collector.write_timeout_secs == 0 {
            return Err(AppError::validation(
                "collector.write_timeout_secs must be > 0",
            ));
        }
        if self.tiers.is_empty() {
            return Err(AppError::validation("No tiers defined"));
        }
        for tier in &self.tiers {
            if tier.name.trim().is_empty() {
                return Err(AppError::validation("Tier with empty name"));
            }
            if tier.subreddits.iter().all(|s| s.trim().is_empty()) {
                return Err(AppError::validation(format!(
                    "Tier {} has no subreddits",
                    tier.name
                )));
            }
        }
        if self.storage.backend == StorageBackend::Mongo
            && self.storage.uri.is_none()
            && self.storage.host.is_none()
        {
            return Err(AppError::validation(
                "storage.backend = \"mongo\" needs storage.uri or storage.host",
            ));
        }
        Ok(())
    }

    /// Check that forum API credentials are present.
    pub fn require_credentials(&self) -> Result<()> {
        if self.reddit.client_id.trim().is_empty() || self.reddit.client_secret.trim().is_empty()
        {
            return Err(AppError::config(
                "reddit.client_id and reddit.client_secret are required (or REDDIT_CLIENT_ID / REDDIT_CLIENT_SECRET)",
            ));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            reddit: RedditConfig::default(),
            collector: CollectorConfig::default(),
            storage: StorageConfig::default(),
            tiers: defaults::tiers(),
        }
    }
}

/// Forum API client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditConfig {
    /// OAuth application id
    #[serde(default)]
    pub client_id: String,

    /// OAuth application secret
    #[serde(default)]
    pub client_secret: String,

    /// User-Agent header for API requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Token endpoint for the client-credentials grant
    #[serde(default = "defaults::auth_url")]
    pub auth_url: String,

    /// Base URL of the authenticated API
    #[serde(default = "defaults::api_base")]
    pub api_base: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Pause taken every `pace_every` scanned items, in milliseconds
    #[serde(default = "defaults::pace_delay")]
    pub pace_delay_ms: u64,

    #[serde(default = "defaults::pace_every")]
    pub pace_every: usize,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            user_agent: defaults::user_agent(),
            auth_url: defaults::auth_url(),
            api_base: defaults::api_base(),
            timeout_secs: defaults::timeout(),
            pace_delay_ms: defaults::pace_delay(),
            pace_every: defaults::pace_every(),
        }
    }
}

/// Filtering and reconciliation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Instructions per bulk submission
    #[serde(default = "defaults::batch_size")]
    pub batch_size: usize,

    /// Wait before the single retry of a failed batch
    #[serde(default = "defaults::retry_backoff")]
    pub retry_backoff_ms: u64,

    /// Deadline for one bulk submission attempt
    #[serde(default = "defaults::write_timeout")]
    pub write_timeout_secs: u64,

    /// Posts older than this are skipped
    #[serde(default = "defaults::window_days")]
    pub window_days: i64,

    #[serde(default)]
    pub include_nsfw: bool,

    #[serde(default = "defaults::enabled")]
    pub skip_bots: bool,

    #[serde(default = "defaults::enabled")]
    pub english_only: bool,

    /// Sample titles/bodies logged at debug level per pass
    #[serde(default = "defaults::debug_samples")]
    pub debug_samples: usize,
}

impl CollectorConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            batch_size: defaults::batch_size(),
            retry_backoff_ms: defaults::retry_backoff(),
            write_timeout_secs: defaults::write_timeout(),
            window_days: defaults::window_days(),
            include_nsfw: false,
            skip_bots: true,
            english_only: true,
            debug_samples: defaults::debug_samples(),
        }
    }
}

/// Which collection store backs a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// JSON files under `storage.path`
    #[default]
    Local,
    /// MongoDB (requires the `mongo` feature)
    Mongo,
}

impl std::str::FromStr for StorageBackend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(StorageBackend::Local),
            "mongo" | "mongodb" => Ok(StorageBackend::Mongo),
            _ => Err(AppError::InvalidMode {
                kind: "storage backend",
                value: s.to_string(),
                expected: "local, mongo",
            }),
        }
    }
}

/// Collection store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Directory for the local store
    #[serde(default = "defaults::storage_path")]
    pub path: String,

    /// Full connection string; takes precedence over `host`
    #[serde(default)]
    pub uri: Option<String>,

    /// Cluster host for an SRV connection string
    #[serde(default)]
    pub host: Option<String>,

    #[serde(default)]
    pub user: Option<String>,

    #[serde(default, skip_serializing)]
    pub password: Option<String>,

    #[serde(default = "defaults::database")]
    pub database: String,
}

impl StorageConfig {
    /// Connection string for the Mongo backend.
    pub fn mongo_uri(&self) -> Option<String> {
        self.uri
            .clone()
            .or_else(|| self.host.as_ref().map(|h| format!("mongodb+srv://{}/", h)))
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Local,
            path: defaults::storage_path(),
            uri: None,
            host: None,
            user: None,
            password: None,
            database: defaults::database(),
        }
    }
}

mod defaults {
    use super::{ListingLimits, Tier};

    // API defaults
    pub fn user_agent() -> String {
        "RedditAITrend by u/unknown".into()
    }
    pub fn auth_url() -> String {
        "https://www.reddit.com/api/v1/access_token".into()
    }
    pub fn api_base() -> String {
        "https://oauth.reddit.com".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn pace_delay() -> u64 {
        200
    }
    pub fn pace_every() -> usize {
        50
    }

    // Collector defaults
    pub fn batch_size() -> usize {
        500
    }
    pub fn retry_backoff() -> u64 {
        500
    }
    pub fn write_timeout() -> u64 {
        30
    }
    pub fn window_days() -> i64 {
        14
    }
    pub fn enabled() -> bool {
        true
    }
    pub fn debug_samples() -> usize {
        3
    }

    // Storage defaults
    pub fn storage_path() -> String {
        "storage".into()
    }
    pub fn database() -> String {
        "reddit_ai".into()
    }

    // Tier defaults
    pub fn tiers() -> Vec<Tier> {
        vec![
            Tier::new(
                "FAST",
                &["DeepSeek", "ChatGPT", "claude", "Copilot"],
                ListingLimits {
                    new: 80,
                    hot: 80,
                    top: 150,
                },
                30,
            ),
            Tier::new(
                "CORE",
                &["artificial", "MachineLearning", "deeplearning"],
                ListingLimits {
                    new: 60,
                    hot: 60,
                    top: 120,
                },
                25,
            ),
            Tier::new(
                "CREATOR",
                &["LocalLLaMA", "StableDiffusion", "generativeAI"],
                ListingLimits {
                    new: 60,
                    hot: 60,
                    top: 120,
                },
                25,
            ),
        ]
    }
}
