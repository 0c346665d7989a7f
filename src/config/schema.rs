//! Configuration schema for devstage
//!
//! Configuration is stored at `~/.config/devstage/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Local storage layout
    pub storage: StorageConfig,

    /// Remote object store settings
    pub remote: RemoteConfig,

    /// Staging wait windows
    pub staging: StagingConfig,

    /// Build cache settings
    pub xbuddy: XbuddyConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Local storage layout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory builds are staged under
    pub static_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            static_dir: crate::config::ConfigManager::state_dir().join("static"),
        }
    }
}

/// Remote store backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteBackend {
    /// Shell out to gsutil
    Gsutil,
    /// Local directory tree laid out like the bucket namespace
    Local,
}

/// Remote object store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Which backend to use
    pub backend: RemoteBackend,

    /// gsutil executable
    pub gsutil_bin: String,

    /// Root for the local backend (`gs://bucket/x` maps to `{local_root}/bucket/x`)
    pub local_root: Option<PathBuf>,

    /// Attempts per list/download before giving up
    pub max_attempts: u32,

    /// First backoff delay in milliseconds, doubled after every failure
    pub initial_backoff_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            backend: RemoteBackend::Gsutil,
            gsutil_bin: "gsutil".to_string(),
            local_root: None,
            max_attempts: 5,
            initial_backoff_ms: 1000,
        }
    }
}

/// Staging wait windows
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StagingConfig {
    /// How long background staging waits for an artifact to appear
    pub wait_timeout_secs: u64,

    /// How long foreground staging waits (the build should already be uploaded)
    pub no_wait_timeout_secs: u64,

    /// Delay between listings while waiting
    pub poll_interval_secs: u64,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            wait_timeout_secs: 10,
            no_wait_timeout_secs: 1,
            poll_interval_secs: 10,
        }
    }
}

impl StagingConfig {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }

    pub fn no_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.no_wait_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Build cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct XbuddyConfig {
    /// Number of distinct builds kept on disk
    pub capacity: usize,

    /// Also register and evict locally built images
    pub manage_builds: bool,

    /// Output root of local image builds (`{images_dir}/{board}/{version}`)
    pub images_dir: Option<PathBuf>,

    /// Bucket holding per-build image directories
    pub image_archive: String,

    /// Bucket holding per-channel release directories
    pub release_archive: String,
}

impl Default for XbuddyConfig {
    fn default() -> Self {
        Self {
            capacity: 5,
            manage_builds: false,
            images_dir: None,
            image_archive: "gs://chromeos-image-archive".to_string(),
            release_archive: "gs://chromeos-releases".to_string(),
        }
    }
}
