use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, trace};

use crate::MonitorDefinition;
use crate::queue::MAX_BATCH_SIZE;

/// Storage backend configuration
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (no persistence)
    #[serde(rename = "none")]
    None,

    /// SQLite database
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,

        /// Check history older than this is deleted
        #[serde(default = "default_retention_days")]
        retention_days: u32,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
            retention_days: default_retention_days(),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./pulseguard.db")
}

fn default_retention_days() -> u32 {
    30
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Entries per queue submission, clamped to the queue's limit
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    #[serde(default = "default_registry_page_size")]
    pub registry_page_size: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            max_batch_size: default_max_batch_size(),
            registry_page_size: default_registry_page_size(),
        }
    }
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn batch_size(&self) -> usize {
        self.max_batch_size.clamp(1, MAX_BATCH_SIZE)
    }
}

fn default_interval_secs() -> u64 {
    60
}

fn default_max_batch_size() -> usize {
    MAX_BATCH_SIZE
}

fn default_registry_page_size() -> usize {
    100
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct DispatchConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default = "default_visibility_timeout_secs")]
    pub visibility_timeout_secs: u64,

    /// Deliveries before a task is dead-lettered
    #[serde(default = "default_max_receive_count")]
    pub max_receive_count: u32,

    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            visibility_timeout_secs: default_visibility_timeout_secs(),
            max_receive_count: default_max_receive_count(),
            store_timeout_ms: default_store_timeout_ms(),
        }
    }
}

impl DispatchConfig {
    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_secs)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

fn default_workers() -> usize {
    8
}

fn default_visibility_timeout_secs() -> u64 {
    30
}

fn default_max_receive_count() -> u32 {
    5
}

fn default_store_timeout_ms() -> u64 {
    5000
}

/// Where alerts are delivered
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotifierKind {
    /// Write alerts to the log only
    Log,
    Webhook(Webhook),
    Discord(Discord),
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Webhook {
    pub url: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Discord {
    pub url: String,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct NotifierConfig {
    #[serde(flatten)]
    pub kind: NotifierKind,

    /// Publish attempts per alert, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,

    /// Upper bound for a single publish attempt
    #[serde(default = "default_notify_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            kind: NotifierKind::Log,
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
            timeout_ms: default_notify_timeout_ms(),
        }
    }
}

impl NotifierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(1))
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    500
}

fn default_notify_timeout_ms() -> u64 {
    5000
}

/// Status API configuration
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,

    /// Bearer token required on every request when set
    pub auth_token: Option<String>,

    #[serde(default = "default_enable_cors")]
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            auth_token: None,
            enable_cors: default_enable_cors(),
        }
    }
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_enable_cors() -> bool {
    true
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub monitors: Vec<MonitorDefinition>,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub dispatch: DispatchConfig,

    #[serde(default)]
    pub notifier: NotifierConfig,

    /// Storage configuration (optional - defaults to in-memory)
    pub storage: Option<StorageConfig>,

    /// Status API (optional - disabled when absent)
    pub api: Option<ApiConfig>,
}

impl Config {
    /// Apply `PULSEGUARD_*` environment overrides
    pub fn apply_env_overrides(&mut self) {
        if let Some(workers) = crate::util::get_workers() {
            debug!("worker count overridden from environment: {workers}");
            self.dispatch.workers = workers;
        }

        if let Some(token) = crate::util::get_api_token() {
            debug!("API token overridden from environment");
            self.api.get_or_insert_with(ApiConfig::default).auth_token = Some(token);
        }
    }

    /// Reject monitor definitions that could never be probed
    pub fn validate(&self) -> anyhow::Result<()> {
        for monitor in &self.monitors {
            monitor
                .validate()
                .map_err(|e| anyhow::anyhow!("monitor `{}`: {e}", monitor.id))?;
        }

        let mut ids: Vec<_> = self.monitors.iter().map(|m| m.id.as_str()).collect();
        ids.sort_unstable();
        if let Some(pair) = ids.windows(2).find(|pair| pair[0] == pair[1]) {
            anyhow::bail!("duplicate monitor id `{}`", pair[0]);
        }

        Ok(())
    }
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
