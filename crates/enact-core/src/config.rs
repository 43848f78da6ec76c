use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_UPSTREAM_URL: &str = "https://api.openchargemap.io/v3/poi";
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 30;
/// Cadence of the recurring sector fetch spawned by the facade.
pub const DEFAULT_FETCH_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 1_000;
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 60_000;
pub const DEFAULT_LEASE_SECS: u64 = 120; // must outlive the upstream timeout
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
/// Finished one-shot jobs are kept this long, then purged.
pub const DEFAULT_RETENTION_SECS: u64 = 7 * 24 * 60 * 60;

/// Top-level config (enact.toml + ENACT_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnactConfig {
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
}

/// Open Charge Map API access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Sent as the `key` query parameter. Empty means anonymous access.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_upstream_url")]
    pub base_url: String,
    /// Hard bound on every upstream request.
    #[serde(default = "default_upstream_timeout")]
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_upstream_url(),
            timeout_secs: DEFAULT_UPSTREAM_TIMEOUT_SECS,
        }
    }
}

/// Tactical store location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

/// Durable job queue location and retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_queue_path")]
    pub path: String,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    /// How long a claimed job may run before it is considered abandoned.
    #[serde(default = "default_lease_secs")]
    pub lease_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Age after which completed or failed one-shot jobs are deleted.
    /// 0 keeps them forever.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            path: default_queue_path(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            backoff_max_ms: DEFAULT_BACKOFF_MAX_MS,
            lease_secs: DEFAULT_LEASE_SECS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            retention_secs: DEFAULT_RETENTION_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    #[serde(default = "default_fetch_interval")]
    pub fetch_interval_secs: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            fetch_interval_secs: DEFAULT_FETCH_INTERVAL_SECS,
        }
    }
}

fn default_upstream_url() -> String {
    DEFAULT_UPSTREAM_URL.to_string()
}
fn default_upstream_timeout() -> u64 {
    DEFAULT_UPSTREAM_TIMEOUT_SECS
}
fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}
fn default_backoff_base_ms() -> u64 {
    DEFAULT_BACKOFF_BASE_MS
}
fn default_backoff_max_ms() -> u64 {
    DEFAULT_BACKOFF_MAX_MS
}
fn default_lease_secs() -> u64 {
    DEFAULT_LEASE_SECS
}
fn default_retention_secs() -> u64 {
    DEFAULT_RETENTION_SECS
}
fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}
fn default_fetch_interval() -> u64 {
    DEFAULT_FETCH_INTERVAL_SECS
}
fn default_store_path() -> String {
    format!("{}/tactical.db", enact_home())
}
fn default_queue_path() -> String {
    format!("{}/queue.db", enact_home())
}

fn enact_home() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.enact", home)
}

impl EnactConfig {
    /// Load config from a TOML file with ENACT_* env var overrides.
    ///
    /// Nested keys are separated by a double underscore so that field names
    /// keep their own underscores: `ENACT_UPSTREAM__API_KEY`.
    /// A missing file is not an error; every field has a default.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        Self::figment(&path)
            .extract()
            .map_err(|e| crate::error::EnactError::Config(e.to_string()))
    }

    fn figment(path: &str) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("ENACT_").split("__"))
    }
}

fn default_config_path() -> String {
    format!("{}/enact.toml", enact_home())
}
