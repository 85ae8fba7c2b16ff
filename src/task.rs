//! Task record: identity, source, flags, and the per-job mutable progress.

use crate::collaborators::MessageRef;
use crate::error::ProcessingError;
use crate::media::{MediaInfo, StreamInfo};
use crate::types::{SeedPolicy, State, TaskId};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Reference to an inbound chat attachment
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    /// Chat the attachment was posted in
    pub chat_id: i64,
    /// Message carrying the attachment
    pub message_id: i64,
    /// File name as announced by the chat platform
    pub file_name: String,
    /// Size in bytes as announced by the chat platform
    pub file_size: u64,
    /// Client session to fetch it with (empty = default session)
    #[serde(default)]
    pub session: String,
}

/// One file of a pre-resolved multi-source download
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectFile {
    /// Direct URL
    pub url: String,
    /// Target file name
    pub filename: String,
    /// Relative sub-path inside the task directory
    #[serde(default)]
    pub path: String,
}

/// Pre-resolved multi-source descriptor (e.g. a shared folder unwrapped into direct links)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectDescriptor {
    /// Folder title
    pub title: String,
    /// Total size in bytes, when known
    #[serde(default)]
    pub total_size: u64,
    /// Files to fetch
    pub contents: Vec<DirectFile>,
    /// Extra request headers
    #[serde(default)]
    pub headers: Vec<String>,
}

/// Where a task fetches its data from
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Source {
    /// URI, magnet, remote-storage path, cloud-drive id or local path
    Link {
        /// The raw link
        link: String,
    },
    /// Inbound chat attachment
    Attachment(AttachmentRef),
    /// Pre-resolved multi-source descriptor
    Direct(DirectDescriptor),
}

impl Source {
    /// Convenience constructor for link sources
    pub fn link(link: impl Into<String>) -> Self {
        Source::Link { link: link.into() }
    }
}

/// Who asked for the task and where replies go
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOrigin {
    /// Chat the command came from
    pub chat_id: i64,
    /// Message the command was sent in
    pub message_id: i64,
    /// Permalink to the command message (key for incomplete-task records)
    #[serde(default)]
    pub message_link: String,
    /// Mention of the requesting user
    #[serde(default)]
    pub tag: String,
    /// Whether the chat is a group/supergroup
    #[serde(default)]
    pub is_super_chat: bool,
}

impl TaskOrigin {
    /// Reference to the command message, for replies
    pub fn message_ref(&self) -> MessageRef {
        MessageRef {
            chat_id: self.chat_id,
            message_id: self.message_id,
        }
    }
}

/// Parsed task flags
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskOptions {
    /// Deliver to chat (leech) instead of cloud (mirror)
    #[serde(default)]
    pub is_leech: bool,
    /// Route to the torrent client backend
    #[serde(default)]
    pub is_qbit: bool,
    /// Route to the link-grabber queue backend
    #[serde(default)]
    pub is_jd: bool,
    /// Route to the newsgroup backend
    #[serde(default)]
    pub is_nzb: bool,
    /// Keep seeding after completion
    #[serde(default)]
    pub seed: Option<SeedPolicy>,
    /// Extract archives after download
    #[serde(default)]
    pub extract: bool,
    /// Compress before upload (skips media filtering)
    #[serde(default)]
    pub compress: bool,
    /// Skip both admission queues
    #[serde(default)]
    pub force_run: bool,
    /// Skip the download queue
    #[serde(default)]
    pub force_download: bool,
    /// Skip the upload queue
    #[serde(default)]
    pub force_upload: bool,
    /// Name override
    #[serde(default)]
    pub name: Option<String>,
    /// Same-directory folder name (stored with a leading '/')
    #[serde(default)]
    pub folder_name: Option<String>,
    /// Number of sibling tasks submitted together
    #[serde(default)]
    pub multi: u32,
    /// Extra request headers for generic downloads
    #[serde(default)]
    pub headers: Vec<String>,
    /// Basic-auth username for generic downloads
    #[serde(default)]
    pub auth_username: Option<String>,
    /// Basic-auth password for generic downloads
    #[serde(default)]
    pub auth_password: Option<String>,
    /// Custom thumbnail removed on failure
    #[serde(default)]
    pub thumbnail: Option<PathBuf>,
    /// Alternate output area purged on completion
    #[serde(default)]
    pub up_dir: Option<PathBuf>,
}

impl TaskOptions {
    /// Whether the download lane may be bypassed
    pub fn bypasses_download_queue(&self) -> bool {
        self.force_run || self.force_download
    }

    /// Whether the upload lane may be bypassed
    pub fn bypasses_upload_queue(&self) -> bool {
        self.force_run || self.force_upload
    }

    /// Whether completion keeps the download around for seeding
    pub fn seeds(&self) -> bool {
        self.seed.is_some() && !self.is_leech
    }
}

/// Part counter for multi-part post-processing
///
/// `current` is 1-based and never exceeds `total`; `total` is fixed once
/// [`Parts::begin`] has been called.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parts {
    current: u32,
    total: u32,
    locked: bool,
}

impl Default for Parts {
    fn default() -> Self {
        Self {
            current: 1,
            total: 1,
            locked: false,
        }
    }
}

impl Parts {
    /// Current part (1-based)
    pub fn current(&self) -> u32 {
        self.current
    }

    /// Total parts
    pub fn total(&self) -> u32 {
        self.total
    }

    /// Fix the part count and rewind to the first part
    pub fn begin(&mut self, total: u32) -> Result<(), ProcessingError> {
        if total == 0 {
            return Err(ProcessingError::Parts(
                "a multi-part run needs at least one part".to_string(),
            ));
        }
        if self.locked && self.total != total {
            return Err(ProcessingError::Parts(format!(
                "part count already fixed at {}, refusing {}",
                self.total, total
            )));
        }
        self.total = total;
        self.current = 1;
        self.locked = true;
        Ok(())
    }

    /// Move to the next part; returns false once the last part was reached
    pub fn advance(&mut self) -> bool {
        if self.current < self.total {
            self.current += 1;
            true
        } else {
            false
        }
    }

    /// Whether the current part is the last one
    pub fn is_last(&self) -> bool {
        self.current == self.total
    }
}

/// Mutable per-task progress
#[derive(Clone, Debug)]
pub struct TaskProgress {
    /// Lifecycle state
    pub state: State,
    /// Backend transfer ID
    pub gid: Option<String>,
    /// Current working name (per part during post-processing)
    pub name: String,
    /// Name of the file the current part came from
    pub original_name: String,
    /// Total size in bytes reported by the backend
    pub size: u64,
    /// Part counter
    pub parts: Parts,
    /// Metadata of the last filtered part
    pub media_info: Option<MediaInfo>,
    /// Streams kept in the last filtered part
    pub streams_kept: Vec<StreamInfo>,
    /// Streams removed from the last filtered part
    pub streams_removed: Vec<StreamInfo>,
    /// Status message shown while the task runs
    pub status_message: Option<MessageRef>,
}

/// Read-only copy of a task handed to collaborators
#[derive(Clone, Debug)]
pub struct TaskSnapshot {
    /// Task ID
    pub mid: TaskId,
    /// Backend transfer ID
    pub gid: Option<String>,
    /// Current working name
    pub name: String,
    /// Total size in bytes
    pub size: u64,
    /// Flags
    pub options: TaskOptions,
    /// Originator
    pub origin: TaskOrigin,
    /// Working directory
    pub dir: PathBuf,
    /// Part counter
    pub parts: Parts,
}

/// One in-flight job
///
/// Immutable identity and flags live directly on the struct; everything the
/// lifecycle mutates sits behind [`Task::progress`].
#[derive(Debug)]
pub struct Task {
    /// Unique task ID
    pub mid: TaskId,
    /// Where data comes from
    pub source: Source,
    /// Flags
    pub options: TaskOptions,
    /// Originator
    pub origin: TaskOrigin,
    /// Working directory (`download_dir/<mid><folder_name>`)
    pub dir: PathBuf,
    /// Root of the task's working storage (`download_dir/<mid>`)
    root: PathBuf,
    /// Cooperative cancellation flag
    pub cancel: CancellationToken,
    progress: Mutex<TaskProgress>,
}

impl Task {
    /// Create a task in the `Created` state
    pub fn new(
        mid: TaskId,
        source: Source,
        options: TaskOptions,
        origin: TaskOrigin,
        download_root: &Path,
    ) -> Self {
        let root = download_root.join(mid.to_string());
        let dir = match options.folder_name.as_deref().map(folder_segment) {
            Some(Some(folder)) => root.join(folder),
            Some(None) => {
                tracing::warn!(
                    task_id = mid.0,
                    folder = options.folder_name.as_deref().unwrap_or_default(),
                    "folder name is not a single path segment, using the task directory"
                );
                root.clone()
            }
            None => root.clone(),
        };
        let name = options.name.clone().unwrap_or_else(|| default_name(&source));

        Self {
            mid,
            source,
            options,
            origin,
            dir,
            root,
            cancel: CancellationToken::new(),
            progress: Mutex::new(TaskProgress {
                state: State::Created,
                gid: None,
                original_name: name.clone(),
                name,
                size: 0,
                parts: Parts::default(),
                media_info: None,
                streams_kept: Vec::new(),
                streams_removed: Vec::new(),
                status_message: None,
            }),
        }
    }

    /// Root of this task's working storage (`download_dir/<mid>`)
    pub fn storage_root(&self) -> PathBuf {
        self.root.clone()
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Lock the mutable progress
    pub async fn progress(&self) -> tokio::sync::MutexGuard<'_, TaskProgress> {
        self.progress.lock().await
    }

    /// Current lifecycle state
    pub async fn state(&self) -> State {
        self.progress.lock().await.state
    }

    /// Transition to a new state; terminal states are never left.
    pub async fn set_state(&self, state: State) -> bool {
        let mut progress = self.progress.lock().await;
        if progress.state.is_terminal() {
            return false;
        }
        progress.state = state;
        true
    }

    /// Read-only copy for collaborators
    pub async fn snapshot(&self) -> TaskSnapshot {
        let progress = self.progress.lock().await;
        TaskSnapshot {
            mid: self.mid,
            gid: progress.gid.clone(),
            name: progress.name.clone(),
            size: progress.size,
            options: self.options.clone(),
            origin: self.origin.clone(),
            dir: self.dir.clone(),
            parts: progress.parts,
        }
    }
}

/// The folder name as one normal path segment, or `None` when it would
/// leave the task directory or nest below it
fn folder_segment(folder_name: &str) -> Option<&str> {
    let folder = folder_name.trim_matches('/');
    let mut components = Path::new(folder).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Some(folder),
        _ => None,
    }
}

fn default_name(source: &Source) -> String {
    match source {
        Source::Link { link } => link
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or(link)
            .to_string(),
        Source::Attachment(attachment) => attachment.file_name.clone(),
        Source::Direct(descriptor) => descriptor.title.clone(),
    }
}
