//! Configuration types for mirror-leech

use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Transfer behaviour configuration (directories, concurrency, teardown timing)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Root directory that holds one working directory per task (default: "./downloads")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Maximum concurrent downloads (default: 4, 0 = unlimited)
    #[serde(default = "default_max_concurrent_downloads")]
    pub max_concurrent_downloads: usize,

    /// Maximum concurrent uploads (default: 4, 0 = unlimited)
    #[serde(default = "default_max_concurrent_uploads")]
    pub max_concurrent_uploads: usize,

    /// Delay between failure notification and purging of working storage (default: 3 seconds)
    #[serde(default = "default_cleanup_grace", with = "duration_serde")]
    pub cleanup_grace: Duration,

    /// Interval of the aggregate status refresher (default: 10 seconds)
    #[serde(default = "default_status_update_interval", with = "duration_serde")]
    pub status_update_interval: Duration,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            max_concurrent_downloads: default_max_concurrent_downloads(),
            max_concurrent_uploads: default_max_concurrent_uploads(),
            cleanup_grace: default_cleanup_grace(),
            status_update_interval: default_status_update_interval(),
        }
    }
}

/// Incomplete-task bookkeeping
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Database path (default: "./mirror-leech.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Record tasks from group chats so they can be reported after a restart
    #[serde(default)]
    pub incomplete_task_notifier: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            incomplete_task_notifier: false,
        }
    }
}

/// Link probing settings used while resolving landing pages
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Timeout for the content-type probe (default: 10 seconds)
    #[serde(default = "default_probe_timeout", with = "duration_serde")]
    pub probe_timeout: Duration,

    /// User agent sent with probe requests
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            probe_timeout: default_probe_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// Main configuration for [`TaskCoordinator`](crate::TaskCoordinator)
///
/// Sub-configs are flattened so the serialized form stays a single flat table,
/// except `persistence`, which is nested.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Directories, concurrency and teardown timing
    #[serde(flatten)]
    pub download: DownloadConfig,

    /// Incomplete-task bookkeeping
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Link probing
    #[serde(flatten)]
    pub links: LinkConfig,
}

impl Config {
    /// Download directory
    pub fn download_dir(&self) -> &PathBuf {
        &self.download.download_dir
    }

    /// Admission limits derived from this configuration
    pub fn limits(&self) -> Limits {
        Limits {
            max_concurrent_downloads: self.download.max_concurrent_downloads,
            max_concurrent_uploads: self.download.max_concurrent_uploads,
        }
    }
}

/// Live admission limits
///
/// A value of `0` disables the limit for that direction. Limits are read on
/// every admission, so changes apply to the next admission without restarting
/// running tasks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    /// Maximum tasks downloading at once
    pub max_concurrent_downloads: usize,
    /// Maximum tasks uploading at once
    pub max_concurrent_uploads: usize,
}

/// Runtime-updatable configuration fields
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ConfigUpdate {
    /// New download limit (0 = unlimited)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrent_downloads: Option<usize>,
    /// New upload limit (0 = unlimited)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrent_uploads: Option<usize>,
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_max_concurrent_downloads() -> usize {
    4
}

fn default_max_concurrent_uploads() -> usize {
    4
}

fn default_cleanup_grace() -> Duration {
    Duration::from_secs(3)
}

fn default_status_update_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./mirror-leech.db")
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_user_agent() -> String {
    concat!("mirror-leech/", env!("CARGO_PKG_VERSION")).to_string()
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
