//! Core types for mirror-leech

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Unique identifier for a task (`mid`)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl TaskId {
    /// Create a new TaskId
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the inner u64 value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for TaskId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Transfer direction of an admission slot
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Fetching the source into the working directory
    Download,
    /// Delivering the output to chat or cloud
    Upload,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Download => f.write_str("download"),
            Direction::Upload => f.write_str("upload"),
        }
    }
}

/// Link button attached to a chat message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    /// Button label
    pub label: String,
    /// Target URL
    pub url: String,
}

impl Button {
    /// Create a button
    pub fn new(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            url: url.into(),
        }
    }
}

/// Lifecycle state of a task
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    /// Accepted, nothing started yet
    Created,
    /// Unwrapping the link into a fetchable resource
    Resolving,
    /// Waiting for an admission slot
    Queued(Direction),
    /// A backend is fetching the source
    Downloading,
    /// Unpacking the downloaded archive
    Extracting,
    /// Per-part media processing
    PostProcessing,
    /// Delivering parts
    Uploading,
    /// Finished successfully
    Completed,
    /// Finished with an error or cancellation
    Failed,
}

impl State {
    /// Whether the state is absorbing
    pub fn is_terminal(&self) -> bool {
        matches!(self, State::Completed | State::Failed)
    }

    /// Label shown in status messages
    pub fn label(&self) -> &'static str {
        match self {
            State::Created => "Created",
            State::Resolving => "Generating Link",
            State::Queued(Direction::Download) => "Queued for Download",
            State::Queued(Direction::Upload) => "Queued for Upload",
            State::Downloading => "Downloading",
            State::Extracting => "Extracting",
            State::PostProcessing => "Processing",
            State::Uploading => "Uploading",
            State::Completed => "Completed",
            State::Failed => "Failed",
        }
    }
}

/// Seeding policy applied by torrent-capable backends after completion
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SeedPolicy {
    /// Share ratio to reach before the backend stops seeding
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ratio: Option<f64>,
    /// Seeding duration in minutes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed_time: Option<u64>,
}

impl SeedPolicy {
    /// Parse the `ratio:minutes` form used by the seed flag (either side may be empty)
    pub fn parse(value: &str) -> Self {
        let mut parts = value.splitn(2, ':');
        let ratio = parts
            .next()
            .filter(|s| !s.is_empty())
            .and_then(|s| s.parse().ok());
        let seed_time = parts
            .next()
            .filter(|s| !s.is_empty())
            .and_then(|s| s.parse().ok());
        Self { ratio, seed_time }
    }
}

/// Event emitted during the task lifecycle
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Task accepted and registered
    Created {
        /// Task ID
        id: TaskId,
        /// Display name
        name: String,
    },

    /// Task is waiting for a slot
    Queued {
        /// Task ID
        id: TaskId,
        /// Which lane it waits in
        direction: Direction,
    },

    /// A queued task was granted its slot
    Promoted {
        /// Task ID
        id: TaskId,
        /// Which lane promoted it
        direction: Direction,
    },

    /// The backend started the transfer
    DownloadStarted {
        /// Task ID
        id: TaskId,
        /// Backend-assigned transfer ID
        gid: String,
    },

    /// The backend finished the transfer
    DownloadComplete {
        /// Task ID
        id: TaskId,
        /// Path of the downloaded file or directory
        path: PathBuf,
    },

    /// Archive extraction started
    Extracting {
        /// Task ID
        id: TaskId,
    },

    /// A part entered the per-part pipeline
    Processing {
        /// Task ID
        id: TaskId,
        /// 1-based part number
        part: u32,
        /// Total number of parts
        total: u32,
    },

    /// One sent record was delivered
    PartUploaded {
        /// Task ID
        id: TaskId,
        /// 1-based part number
        part: u32,
        /// Delivered file name
        name: String,
        /// Delivered size in bytes
        size: u64,
    },

    /// Task completed successfully
    Completed {
        /// Task ID
        id: TaskId,
    },

    /// Task failed
    Failed {
        /// Task ID
        id: TaskId,
        /// Error message reported to the originator
        error: String,
    },

    /// Task was cancelled
    Cancelled {
        /// Task ID
        id: TaskId,
    },

    /// Admission limits changed at runtime
    LimitsChanged {
        /// New download limit (0 = unlimited)
        max_concurrent_downloads: usize,
        /// New upload limit (0 = unlimited)
        max_concurrent_uploads: usize,
    },

    /// Graceful shutdown finished
    Shutdown,
}
