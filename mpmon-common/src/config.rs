//! Configuration loading and cache directory resolution
//!
//! Bootstrap configuration comes from a TOML file. Resolution order for the
//! file itself:
//! 1. `--config` command-line argument (highest priority)
//! 2. `MPMON_CONFIG` environment variable
//! 3. `~/.config/mpmon/config.toml` (platform config dir via `dirs`)
//! 4. Compiled defaults
//!
//! A file named explicitly (1 or 2) that cannot be read or parsed is a fatal
//! configuration error. A missing default-location file is not.
//!
//! The cache directory has its own override chain on top of the file:
//! `--cache-dir` > `MPMON_CACHE_DIR` > `cache_dir` key > OS data dir.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

pub const CONFIG_ENV_VAR: &str = "MPMON_CONFIG";
pub const CACHE_DIR_ENV_VAR: &str = "MPMON_CACHE_DIR";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    /// Root of the cache artifact tree
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    #[serde(default)]
    pub upstream: UpstreamConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Remote API settings
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Tuning for the sync and analytics phases
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Concurrent vote-detail fetches
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Votes per fetch batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Minimum spacing between upstream requests
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    /// Pause between fetch batches
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,

    /// Newest N upstream votes compared against the index
    #[serde(default = "default_detection_window")]
    pub detection_window: usize,

    /// Size of the recent-votes artifact
    #[serde(default = "default_recent_votes_limit")]
    pub recent_votes_limit: usize,

    /// Cap on candidate votes per MP for party-line analysis
    #[serde(default = "default_max_votes_per_mp")]
    pub max_votes_per_mp: usize,

    /// Cap on entries in one MP voting record
    #[serde(default = "default_max_record_len")]
    pub max_record_len: usize,

    #[serde(default = "default_memory_ceiling_mb")]
    pub memory_ceiling_mb: u64,

    /// MPs processed between memory samples
    #[serde(default = "default_memory_check_interval")]
    pub memory_check_interval: usize,

    /// Vote-detail files read per batch during a full view rebuild
    #[serde(default = "default_rebuild_batch")]
    pub rebuild_batch: usize,

    #[serde(default = "default_historical_mp_limit")]
    pub historical_mp_limit: usize,

    #[serde(default = "default_historical_concurrency")]
    pub historical_concurrency: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            batch_size: default_batch_size(),
            request_delay_ms: default_request_delay_ms(),
            batch_delay_ms: default_batch_delay_ms(),
            detection_window: default_detection_window(),
            recent_votes_limit: default_recent_votes_limit(),
            max_votes_per_mp: default_max_votes_per_mp(),
            max_record_len: default_max_record_len(),
            memory_ceiling_mb: default_memory_ceiling_mb(),
            memory_check_interval: default_memory_check_interval(),
            rebuild_batch: default_rebuild_batch(),
            historical_mp_limit: default_historical_mp_limit(),
            historical_concurrency: default_historical_concurrency(),
        }
    }
}

impl SyncConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    /// Reject values that would stall or disable a phase
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("concurrency", self.concurrency),
            ("batch_size", self.batch_size),
            ("detection_window", self.detection_window),
            ("recent_votes_limit", self.recent_votes_limit),
            ("max_votes_per_mp", self.max_votes_per_mp),
            ("max_record_len", self.max_record_len),
            ("memory_check_interval", self.memory_check_interval),
            ("rebuild_batch", self.rebuild_batch),
            ("historical_concurrency", self.historical_concurrency),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(Error::Config(format!("sync.{} must be greater than zero", name)));
            }
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr only if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_base_url() -> String {
    "https://api.openparliament.ca".to_string()
}

fn default_user_agent() -> String {
    format!("mpmon-sync/{}", env!("CARGO_PKG_VERSION"))
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_concurrency() -> usize {
    3
}

fn default_batch_size() -> usize {
    5
}

fn default_request_delay_ms() -> u64 {
    200
}

fn default_batch_delay_ms() -> u64 {
    1000
}

fn default_detection_window() -> usize {
    200
}

fn default_recent_votes_limit() -> usize {
    100
}

fn default_max_votes_per_mp() -> usize {
    5000
}

fn default_max_record_len() -> usize {
    5000
}

fn default_memory_ceiling_mb() -> u64 {
    1024
}

fn default_memory_check_interval() -> usize {
    25
}

fn default_rebuild_batch() -> usize {
    50
}

fn default_historical_mp_limit() -> usize {
    500
}

fn default_historical_concurrency() -> usize {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TomlConfig {
    /// Parse a configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config: TomlConfig = toml::from_str(&content).map_err(|e| {
            Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
        })?;
        config.sync.validate()?;
        Ok(config)
    }

    /// Resolve and load configuration following the priority order
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        // Priority 1: Command-line argument
        if let Some(path) = cli_path {
            info!(path = %path.display(), "Loading configuration from command line path");
            return Self::from_file(path);
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.is_empty() {
                info!(path = %path, "Loading configuration from {}", CONFIG_ENV_VAR);
                return Self::from_file(Path::new(&path));
            }
        }

        // Priority 3: Default location
        if let Some(path) = default_config_path() {
            if path.exists() {
                info!(path = %path.display(), "Loading configuration from default location");
                return Self::from_file(&path);
            }
        }

        // Priority 4: Compiled defaults
        warn!("No configuration file found, using built-in defaults");
        Ok(Self::default())
    }

    /// Resolve the cache directory: CLI > env > TOML > OS default
    pub fn resolve_cache_dir(&self, cli_arg: Option<&Path>) -> PathBuf {
        if let Some(path) = cli_arg {
            return path.to_path_buf();
        }
        if let Ok(path) = std::env::var(CACHE_DIR_ENV_VAR) {
            if !path.is_empty() {
                return PathBuf::from(path);
            }
        }
        if let Some(path) = &self.cache_dir {
            return path.clone();
        }
        default_cache_dir()
    }
}

/// `~/.config/mpmon/config.toml` on Linux, the platform equivalent elsewhere
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("mpmon").join("config.toml"))
}

/// OS-dependent default cache directory
pub fn default_cache_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("mpmon").join("cache"))
        .unwrap_or_else(|| PathBuf::from("./mpmon_cache"))
}
