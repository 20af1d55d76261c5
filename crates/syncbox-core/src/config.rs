use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::SyncError;

pub const MIB: u64 = 1024 * 1024;

/// Top-level configuration, stored at `~/.syncbox/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub upload: UploadConfig,

    #[serde(default)]
    pub walk: WalkConfig,

    #[serde(default)]
    pub retention: RetentionConfig,
}

/// Limits and endpoint for the batch uploader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Maximum number of files in one batch.
    pub max_files_per_batch: usize,
    /// Maximum summed size of one batch in bytes. A single larger file still
    /// forms its own batch.
    pub max_size_per_batch: u64,
    /// Number of batch workers running at once.
    pub max_concurrent_batches: usize,
    /// Reserved: per-file attempt budget recorded on queue items.
    pub retry_attempts: u32,
    /// Reserved: delay between attempts in milliseconds.
    pub retry_delay_ms: u64,
    /// Files at or above this size are sent in chunks of this size.
    pub chunk_size: u64,
    /// Base URL of the remote upload endpoints.
    pub endpoint_base_url: String,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_files_per_batch: 50,
            max_size_per_batch: 50 * MIB,
            max_concurrent_batches: 3,
            retry_attempts: 3,
            retry_delay_ms: 1000,
            chunk_size: 5 * MIB,
            endpoint_base_url: "http://localhost:8000/api/sync".to_string(),
        }
    }
}

/// Filters applied by the file walker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkConfig {
    /// Entries larger than this are reported as walk errors.
    pub max_file_size: u64,
    /// Keep entries whose name starts with `.`.
    pub include_hidden: bool,
    /// Extra patterns on top of the built-in ignore list.
    pub custom_ignore_patterns: Vec<String>,
    /// Emit directory records alongside files.
    pub include_directories: bool,
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            max_file_size: 100 * MIB,
            include_hidden: false,
            custom_ignore_patterns: Vec::new(),
            include_directories: false,
        }
    }
}

/// How long finished bookkeeping is kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Completed batches older than this are eligible for cleanup.
    pub batch_retention_hours: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            batch_retention_hours: 24,
        }
    }
}

impl SyncConfig {
    /// Returns the syncbox home directory (`~/.syncbox/`).
    pub fn home_dir() -> Result<PathBuf, SyncError> {
        let base = dirs::home_dir().ok_or_else(|| SyncError::Config {
            message: "could not determine home directory".into(),
        })?;
        Ok(base.join(".syncbox"))
    }

    /// Returns the path to the config file.
    pub fn config_path() -> Result<PathBuf, SyncError> {
        Ok(Self::home_dir()?.join("config.toml"))
    }

    /// Returns the path to the database file.
    pub fn db_path() -> Result<PathBuf, SyncError> {
        Ok(Self::home_dir()?.join("syncbox.db"))
    }

    /// Load config from the default location, or return defaults if not found.
    pub fn load() -> Result<Self, SyncError> {
        let path = Self::config_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, SyncError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&content).map_err(|e| SyncError::Serialization(e.to_string()))?;
        config.validate()?;
        tracing::debug!("loaded config from {}", path.display());
        Ok(config)
    }

    /// Save config to the default location.
    pub fn save(&self) -> Result<(), SyncError> {
        let path = Self::config_path()?;
        self.save_to(&path)
    }

    /// Save config to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), SyncError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| SyncError::Serialization(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Initialize the syncbox home directory with default config.
    pub fn init() -> Result<PathBuf, SyncError> {
        let home = Self::home_dir()?;
        std::fs::create_dir_all(&home)?;

        let config_path = Self::config_path()?;
        if !config_path.exists() {
            Self::default().save_to(&config_path)?;
        }

        Ok(home)
    }

    /// Reject limits the scheduler cannot make progress with.
    pub fn validate(&self) -> Result<(), SyncError> {
        let upload = &self.upload;
        let invalid = |message: &str| {
            Err(SyncError::Config {
                message: message.to_string(),
            })
        };
        if upload.max_files_per_batch == 0 {
            return invalid("upload.max_files_per_batch must be at least 1");
        }
        if upload.max_size_per_batch == 0 {
            return invalid("upload.max_size_per_batch must be at least 1");
        }
        if upload.max_concurrent_batches == 0 {
            return invalid("upload.max_concurrent_batches must be at least 1");
        }
        if upload.chunk_size == 0 {
            return invalid("upload.chunk_size must be at least 1");
        }
        if upload.endpoint_base_url.trim().is_empty() {
            return invalid("upload.endpoint_base_url is required");
        }
        Ok(())
    }
}
