use coc_audit::{AuditLog, AuditResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Errors loading or saving configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to access config file: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Custody simulation configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustodyConfig {
    /// Per-peer settings
    #[serde(default)]
    pub peer: PeerConfig,
    /// Simulated transport
    #[serde(default)]
    pub network: NetworkConfig,
    /// Audit ledger location
    #[serde(default)]
    pub audit: AuditConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Per-peer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerConfig {
    /// Maximum age of an offline-queued message at drain time
    #[serde(default = "default_message_ttl")]
    pub message_ttl_secs: u64,
    /// Offline queue capacity; 0 means unbounded
    #[serde(default = "default_max_offline_queue")]
    pub max_offline_queue: usize,
    /// Link already-stored children when their parent arrives late
    #[serde(default = "default_true")]
    pub repair_orphans: bool,
}

/// Simulated transport configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Lower bound of the per-message delivery delay
    #[serde(default = "default_min_delay")]
    pub min_delay_ms: u64,
    /// Upper bound of the per-message delivery delay
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
}

/// Audit ledger configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Directory holding `audit.log`
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default functions for PeerConfig
fn default_message_ttl() -> u64 {
    24 * 60 * 60 // 24 hours
}

fn default_max_offline_queue() -> usize {
    10_000
}

// Default functions for NetworkConfig
fn default_min_delay() -> u64 {
    10
}

fn default_max_delay() -> u64 {
    50
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("./data/logs")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            message_ttl_secs: default_message_ttl(),
            max_offline_queue: default_max_offline_queue(),
            repair_orphans: default_true(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: default_min_delay(),
            max_delay_ms: default_max_delay(),
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl PeerConfig {
    pub fn message_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.message_ttl_secs).unwrap_or(i64::MAX))
    }
}

impl NetworkConfig {
    /// Delay bounds in milliseconds, with `max` never below `min`
    pub fn delay_bounds_ms(&self) -> (u64, u64) {
        (self.min_delay_ms, self.max_delay_ms.max(self.min_delay_ms))
    }
}

impl AuditConfig {
    /// Open (or create) the ledger in the configured directory
    pub fn open_log(&self) -> AuditResult<AuditLog> {
        AuditLog::open(&self.log_dir)
    }
}

impl CustodyConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    /// Load configuration, falling back to defaults if the file does not exist
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        match Self::load(&path) {
            Err(ConfigError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.as_ref().display(), "Config file not found, using defaults");
                Ok(Self::default())
            }
            other => other,
        }
    }
}
