//! Configuration for the resumable upload server.
//!
//! Configuration loading and process bootstrap are explicitly out of
//! scope for the protocol engine itself (§1), but a complete service still
//! needs somewhere to source its settings from — this follows the
//! original media server's TOML-file-plus-validation pattern.
//!
//! # Configuration sources (in order of priority)
//! 1. `config.local.toml` - local overrides (gitignored)
//! 2. `config.toml` - main configuration file

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub upload: UploadConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Bearer-token authentication (§1: user authentication is an external
/// collaborator; this only configures the pre-handler stub for it).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub tokens: Vec<String>,
    #[serde(default)]
    pub protected_paths: Vec<String>,
    #[serde(default)]
    pub public_paths: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Base URL used to build absolute `Location` URIs when the request
    /// carries no scheme/host information.
    pub base_url: String,
    pub request_timeout: u64,
    pub max_connections: usize,
    /// Interval, in seconds, between runs of the background sweep that
    /// expires sessions and orphaned upload handles (§4.5 Open Question c).
    pub cleanup_interval_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Base directory for durable objects, temp uploads, and the object
    /// index.
    pub data_dir: PathBuf,
    /// Directory nesting levels for file storage (0-4), 2 hex characters
    /// of the uuid per level.
    #[serde(default = "default_directory_levels")]
    pub directory_levels: u8,
}

fn default_directory_levels() -> u8 {
    2
}

impl StorageConfig {
    pub fn objects_path(&self) -> PathBuf {
        self.data_dir.join("objects")
    }

    pub fn temp_path(&self) -> PathBuf {
        self.data_dir.join("temp")
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("rocksdb")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    /// Limit checked against `x-upload-content-length` on the pre-request
    /// (§4.5 step 1).
    pub max_pre_request_announced_size: u64,
    /// Limit checked against each chunk's announced/observed size.
    pub max_chunk_payload_size: u64,
    /// Session TTL in seconds (§3, configured externally per Open
    /// Question c).
    pub session_ttl_seconds: u64,
    /// Age, in seconds, past which an orphaned upload handle is swept by
    /// the background cleaner task.
    pub orphan_sweep_age_seconds: u64,
    /// The `formatVersion` this server currently supports (§3).
    pub current_format_version: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub requests_per_window: u32,
    pub window_seconds: u64,
    pub uploads_per_window: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub file: String,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_default() -> Result<Self, ConfigError> {
        if Path::new("config.local.toml").exists() {
            return Self::load("config.local.toml");
        }

        if Path::new("config.toml").exists() {
            return Self::load("config.toml");
        }

        Err(ConfigError::ValidationError(
            "No configuration file found. Expected config.toml or config.local.toml".to_string(),
        ))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.upload.max_chunk_payload_size < 1024 {
            return Err(ConfigError::ValidationError(
                "max_chunk_payload_size must be at least 1024 bytes".to_string(),
            ));
        }

        if self.upload.max_chunk_payload_size > self.upload.max_pre_request_announced_size {
            return Err(ConfigError::ValidationError(
                "max_chunk_payload_size must be <= max_pre_request_announced_size".to_string(),
            ));
        }

        if self.server.base_url.ends_with('/') {
            return Err(ConfigError::ValidationError(
                "base_url should not have a trailing slash".to_string(),
            ));
        }

        if self.storage.directory_levels > 4 {
            return Err(ConfigError::ValidationError(
                "directory_levels must be between 0 and 4".to_string(),
            ));
        }

        if self.upload.current_format_version == 0 {
            return Err(ConfigError::ValidationError(
                "current_format_version must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_paths_nest_under_data_dir() {
        let storage = StorageConfig {
            data_dir: PathBuf::from("/data"),
            directory_levels: 2,
        };

        assert_eq!(storage.objects_path(), PathBuf::from("/data/objects"));
        assert_eq!(storage.temp_path(), PathBuf::from("/data/temp"));
        assert_eq!(storage.database_path(), PathBuf::from("/data/rocksdb"));
    }

    fn sample_config() -> Config {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".into(),
                port: 8080,
                base_url: "https://upload.example.com".into(),
                request_timeout: 30,
                max_connections: 1024,
                cleanup_interval_seconds: 300,
            },
            storage: StorageConfig {
                data_dir: PathBuf::from("/data"),
                directory_levels: 2,
            },
            upload: UploadConfig {
                max_pre_request_announced_size: 1 << 30,
                max_chunk_payload_size: 8 * 1024 * 1024,
                session_ttl_seconds: 3600,
                orphan_sweep_age_seconds: 86_400,
                current_format_version: 3,
            },
            rate_limit: RateLimitConfig {
                enabled: true,
                requests_per_window: 100,
                window_seconds: 60,
                uploads_per_window: 20,
            },
            logging: LoggingConfig {
                level: "info".into(),
                format: "pretty".into(),
                file: String::new(),
            },
            auth: AuthConfig::default(),
        }
    }

    #[test]
    fn validate_rejects_trailing_slash_base_url() {
        let mut config = sample_config();
        config.server.base_url.push('/');
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_chunk_limit_above_pre_request_limit() {
        let mut config = sample_config();
        config.upload.max_chunk_payload_size = config.upload.max_pre_request_announced_size + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_accepts_sample_config() {
        assert!(sample_config().validate().is_ok());
    }
}
