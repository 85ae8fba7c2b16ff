//! Interfaces the lifecycle calls into.
//!
//! Transfer backends, link unwrapping, extraction, media filtering, uploads,
//! messaging and persistence live outside this crate. Each is a trait object
//! so the coordinator can be wired with production implementations or test
//! doubles.
//!
//! Backends do not call back into task state. They report through a
//! [`DownloadReporter`], a per-task channel the lifecycle awaits.

use crate::error::{NotifyError, ProcessingError, ResolutionError, Result};
use crate::media::MediaInfo;
use crate::task::{AttachmentRef, DirectDescriptor, TaskSnapshot};
use crate::types::{Button, SeedPolicy, TaskId};
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Reference to a chat message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef {
    /// Chat ID
    pub chat_id: i64,
    /// Message ID within the chat
    pub message_id: i64,
}

/// Backend that serves a [`SourceKind`](crate::links::SourceKind)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Chat-native attachment download
    Attachment,
    /// Multi-file direct HTTP download
    Direct,
    /// Link-grabber queue client
    QueueClient,
    /// BitTorrent client with seeding support
    TorrentClient,
    /// Newsgroup retrieval
    Newsgroup,
    /// Remote-storage (rclone-style) copy
    RemoteStorage,
    /// Cloud-drive download
    CloudDrive,
    /// Generic URI downloader (HTTP/FTP/magnet)
    Uri,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BackendKind::Attachment => "attachment",
            BackendKind::Direct => "direct",
            BackendKind::QueueClient => "queue-client",
            BackendKind::TorrentClient => "torrent-client",
            BackendKind::Newsgroup => "newsgroup",
            BackendKind::RemoteStorage => "remote-storage",
            BackendKind::CloudDrive => "cloud-drive",
            BackendKind::Uri => "uri",
        };
        f.write_str(name)
    }
}

/// What a backend is asked to fetch
#[derive(Clone, Debug, PartialEq)]
pub enum DownloadSource {
    /// Chat attachment
    Attachment(AttachmentRef),
    /// Multi-file descriptor
    Direct(DirectDescriptor),
    /// Link, magnet, path or cloud ID
    Link(String),
}

/// Signal reported by a backend for one transfer
#[derive(Clone, Debug, PartialEq)]
pub enum DownloadSignal {
    /// The transfer started and got a backend ID
    Started {
        /// Backend transfer ID
        gid: String,
    },
    /// The transfer finished
    Complete {
        /// Name of the downloaded file or directory inside the working directory
        name: String,
        /// Total size in bytes
        size: u64,
    },
    /// The transfer failed
    Error {
        /// Error text
        message: String,
        /// Optional action button for the originator
        hint: Option<Button>,
    },
}

/// Sending half of a task's download channel
#[derive(Clone, Debug)]
pub struct DownloadReporter {
    tx: mpsc::UnboundedSender<DownloadSignal>,
}

impl DownloadReporter {
    /// Create a reporter and the receiver the lifecycle awaits
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<DownloadSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Report that the transfer started
    pub fn started(&self, gid: impl Into<String>) {
        self.tx
            .send(DownloadSignal::Started { gid: gid.into() })
            .ok();
    }

    /// Report that the transfer finished
    pub fn complete(&self, name: impl Into<String>, size: u64) {
        self.tx
            .send(DownloadSignal::Complete {
                name: name.into(),
                size,
            })
            .ok();
    }

    /// Report that the transfer failed
    pub fn error(&self, message: impl Into<String>, hint: Option<Button>) {
        self.tx
            .send(DownloadSignal::Error {
                message: message.into(),
                hint,
            })
            .ok();
    }
}

/// Everything a backend needs to start a transfer
#[derive(Clone, Debug)]
pub struct DownloadJob {
    /// Task snapshot at dispatch time
    pub task: TaskSnapshot,
    /// What to fetch
    pub source: DownloadSource,
    /// Destination directory
    pub destination: PathBuf,
    /// Extra request headers
    pub headers: Vec<String>,
    /// Seeding policy for torrent-capable backends
    pub seed: Option<SeedPolicy>,
    /// Where to report progress
    pub reporter: DownloadReporter,
}

/// A download backend
#[async_trait]
pub trait TransferBackend: Send + Sync {
    /// Start a transfer; results are reported through `job.reporter`
    ///
    /// Returning an error means the transfer could not be started at all.
    async fn start(&self, job: DownloadJob) -> Result<()>;

    /// Human-readable name for logging
    fn name(&self) -> &str;
}

/// Dispatch table keyed by [`BackendKind`]
#[derive(Clone, Default)]
pub struct Backends {
    table: HashMap<BackendKind, Arc<dyn TransferBackend>>,
}

impl Backends {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the backend for a kind
    pub fn register(mut self, kind: BackendKind, backend: Arc<dyn TransferBackend>) -> Self {
        self.table.insert(kind, backend);
        self
    }

    /// Backend for a kind
    pub fn get(&self, kind: BackendKind) -> Option<Arc<dyn TransferBackend>> {
        self.table.get(&kind).cloned()
    }
}

impl std::fmt::Debug for Backends {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.table.keys().map(ToString::to_string).collect();
        kinds.sort();
        f.debug_struct("Backends").field("kinds", &kinds).finish()
    }
}

/// Outcome of unwrapping a landing-page link
#[derive(Clone, Debug, PartialEq)]
pub enum Resolved {
    /// Direct URL
    Url(String),
    /// Direct URL plus request headers
    WithHeaders(String, Vec<String>),
    /// Folder of direct links
    Direct(DirectDescriptor),
}

/// Probes a link's content type
#[async_trait]
pub trait LinkProber: Send + Sync {
    /// Content type of the resource, or `None` when it could not be determined
    async fn content_type(&self, link: &str) -> Option<String>;
}

/// Unwraps landing pages into direct resources
#[async_trait]
pub trait LinkResolver: Send + Sync {
    /// Resolve a link
    async fn resolve(&self, link: &str) -> std::result::Result<Resolved, ResolutionError>;
}

/// Unpacks archives
#[async_trait]
pub trait ArchiveExtractor: Send + Sync {
    /// Extract `archive` into `destination`; returns the path to continue with
    async fn extract(
        &self,
        archive: &Path,
        destination: &Path,
    ) -> std::result::Result<PathBuf, ProcessingError>;
}

/// Output of the media-stream filter
#[derive(Clone, Debug, PartialEq)]
pub struct Filtered {
    /// File to upload
    pub path: PathBuf,
    /// Metadata of the filtered file
    pub media_info: Option<MediaInfo>,
}

/// Strips or keeps media streams before chat delivery
#[async_trait]
pub trait MediaFilter: Send + Sync {
    /// Process one part; `Ok(None)` means the part is skipped
    async fn process(
        &self,
        path: &Path,
        task: &TaskSnapshot,
    ) -> std::result::Result<Option<Filtered>, ProcessingError>;
}

/// One physically delivered unit
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentRecord {
    /// Delivered file name
    pub name: String,
    /// Delivered size in bytes
    pub size: u64,
    /// Access link (chat message link or cloud URL)
    #[serde(default)]
    pub link: Option<String>,
    /// Message that carries the delivered file, when delivered to chat
    #[serde(default)]
    pub message: Option<MessageRef>,
}

/// What to upload
#[derive(Clone, Debug)]
pub struct UploadRequest {
    /// Task snapshot at upload time
    pub task: TaskSnapshot,
    /// File or directory to deliver
    pub path: PathBuf,
}

/// Delivers output to chat or cloud
pub trait Uploader: Send + Sync {
    /// Upload one part; yields one record per physically delivered unit
    fn upload(&self, request: UploadRequest) -> BoxStream<'static, Result<SentRecord>>;
}

/// Chat messaging sink
///
/// All methods are fire-and-forget from the lifecycle's point of view: errors
/// are logged and never abort a task.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Send a message in reply to `reply_to`
    async fn send_message(
        &self,
        reply_to: MessageRef,
        text: &str,
        button: Option<&Button>,
    ) -> std::result::Result<MessageRef, NotifyError>;

    /// Replace the text of a message
    async fn edit_message(
        &self,
        message: MessageRef,
        text: &str,
    ) -> std::result::Result<(), NotifyError>;

    /// Delete a message
    async fn delete_message(&self, message: MessageRef) -> std::result::Result<(), NotifyError>;

    /// Refresh the aggregate status view of a chat
    async fn update_aggregate_status(&self, chat_id: i64) -> std::result::Result<(), NotifyError>;

    /// Delete every aggregate status view
    async fn delete_aggregate_status(&self) -> std::result::Result<(), NotifyError>;
}

/// Incomplete-task bookkeeping keyed by the originating message link
#[async_trait]
pub trait IncompleteTaskStore: Send + Sync {
    /// Remember a started task
    async fn record_incomplete_task(&self, chat_id: i64, message_link: &str, tag: &str)
    -> Result<()>;

    /// Forget a task that reached a terminal state
    async fn clear_incomplete_task(&self, message_link: &str) -> Result<()>;
}

/// Backend-side bookkeeping purged when the last task ends
#[async_trait]
pub trait TransferBookkeeping: Send + Sync {
    /// Drop completed/errored transfer records held by backend daemons
    async fn purge_completed(&self) -> Result<()>;
}

/// Full set of collaborators handed to the coordinator
#[derive(Clone)]
pub struct Collaborators {
    /// Download backends
    pub backends: Backends,
    /// Content-type prober
    pub prober: Arc<dyn LinkProber>,
    /// Landing-page unwrapper
    pub resolver: Arc<dyn LinkResolver>,
    /// Archive extractor
    pub extractor: Arc<dyn ArchiveExtractor>,
    /// Media-stream filter
    pub media_filter: Arc<dyn MediaFilter>,
    /// Uploader
    pub uploader: Arc<dyn Uploader>,
    /// Messaging sink
    pub messenger: Arc<dyn Messenger>,
    /// Incomplete-task store, when persistence is enabled
    pub store: Option<Arc<dyn IncompleteTaskStore>>,
    /// Backend bookkeeping purged when idle
    pub bookkeeping: Option<Arc<dyn TransferBookkeeping>>,
}

/// Media filter that leaves every file untouched
#[derive(Clone, Copy, Debug, Default)]
pub struct PassthroughMediaFilter;

#[async_trait]
impl MediaFilter for PassthroughMediaFilter {
    async fn process(
        &self,
        path: &Path,
        _task: &TaskSnapshot,
    ) -> std::result::Result<Option<Filtered>, ProcessingError> {
        Ok(Some(Filtered {
            path: path.to_path_buf(),
            media_info: None,
        }))
    }
}

/// Shorthand used by logging call sites
pub(crate) fn log_notify_error(task_id: TaskId, err: &NotifyError) {
    tracing::warn!(task_id = task_id.0, error = %err, "notification failed");
}
