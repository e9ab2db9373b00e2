//! Application Configuration
//!
//! This module provides configuration management for the gateway,
//! supporting YAML configuration files with sensible defaults and a handful of
//! environment overrides for secrets and paths.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Default quota ceiling for partitions created without `max-size` (500 MiB)
pub const DEFAULT_PARTITION_SIZE: u64 = 500 * 1024 * 1024;

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Blob storage backend types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub enum StorageBackend {
    #[default]
    LocalFs,
    Mock,
}

/// Metadata backend types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub enum MetadataBackend {
    #[default]
    SQLite,
    Mock,
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Blob storage configuration
    pub storage: StorageConfig,
    /// Metadata configuration
    pub metadata: MetadataConfig,
    /// Orphan sweep configuration
    pub sweep: SweepConfig,
    /// Administrative credentials
    pub auth: AuthConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Number of worker threads
    pub workers: usize,
    /// Largest upload accepted before any bytes are buffered
    pub max_upload_size: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 6050,
            workers: 4,
            max_upload_size: 100 * 1024 * 1024,
        }
    }
}

/// Blob storage backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage backend type
    pub backend: StorageBackend,
    /// Root directory for stored objects
    pub base_path: String,
    /// Staging directory for in-flight writes
    pub temp_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::LocalFs,
            base_path: "./data/storage".to_string(),
            temp_path: "./data/temp".to_string(),
        }
    }
}

/// Metadata backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// Metadata backend type
    pub backend: MetadataBackend,
    /// Database file path
    pub db_path: String,
    /// Enable WAL mode
    pub wal_mode: bool,
    /// How long a writer waits on a locked database
    pub busy_timeout_ms: u64,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            backend: MetadataBackend::SQLite,
            db_path: "./data/metadata.db".to_string(),
            wal_mode: true,
            busy_timeout_ms: 5000,
        }
    }
}

/// Orphan sweep worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Run the background sweep worker
    pub enabled: bool,
    /// Seconds between sweeps
    pub interval_secs: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 3600,
        }
    }
}

/// Administrative credentials
#[derive(Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AuthConfig {
    /// Superuser secret gating key and partition administration
    pub sudo_key: String,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("sudo_key", &"<redacted>")
            .finish()
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Path to log4rs configuration file
    pub config_file: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            config_file: "server_log.yaml".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `GATEWAY_CONFIG` (or `config.yaml`), falling back
    /// to defaults, then apply environment overrides and validate.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = env::var("GATEWAY_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());
        let mut config = Self::from_file(&config_path)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Read a YAML file, using defaults when it does not exist
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        if !Path::new(path).exists() {
            warn!("Config file {} not found, using defaults", path);
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        let config = Self::from_yaml(&content)?;
        info!("Loaded configuration from {}", path);
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Apply environment overrides on top of file values
    pub fn apply_env(&mut self) {
        if let Ok(key) = env::var("GATEWAY_SUDO_KEY") {
            if !key.is_empty() {
                self.auth.sudo_key = key;
            }
        }
        if let Ok(path) = env::var("DB_FILE") {
            info!("Using database path from environment: {}", path);
            self.metadata.db_path = path;
        }
        if let Ok(dir) = env::var("STORAGE_DIRECTORY") {
            info!("Using storage directory from environment: {}", dir);
            self.storage.base_path = dir;
        }
        if let Ok(host) = env::var("HOST") {
            self.server.host = host;
        }
        if let Ok(port) = env::var("PORT") {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => warn!("Ignoring invalid PORT value: {}", port),
            }
        }
    }

    /// Reject configurations the gateway cannot safely start with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.sudo_key.is_empty() {
            return Err(ConfigError::Invalid(
                "GATEWAY_SUDO_KEY is required but not specified".to_string(),
            ));
        }
        if self.server.max_upload_size == 0 {
            return Err(ConfigError::Invalid("server.max_upload_size must be > 0".to_string()));
        }
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("server.port must be > 0".to_string()));
        }
        Ok(())
    }
}
