//! Shared test doubles and helpers for coordinator tests.

use crate::collaborators::{
    BackendKind, Backends, Collaborators, DownloadJob, DownloadReporter, DownloadSource, Filtered,
    IncompleteTaskStore, LinkProber, LinkResolver, MediaFilter, MessageRef, Messenger, Resolved,
    SentRecord, TransferBackend, TransferBookkeeping, UploadRequest, Uploader,
};
use crate::config::Config;
use crate::coordinator::TaskCoordinator;
use crate::error::{BackendError, Error, NotifyError, ProcessingError, ResolutionError, Result};
use crate::extraction::DefaultExtractor;
use crate::media::MediaInfo;
use crate::task::{Parts, TaskOptions, TaskOrigin, TaskSnapshot};
use crate::types::{Button, Event, SeedPolicy, TaskId};
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::{Notify, broadcast};

/// One message sent through the [`RecordingMessenger`]
#[derive(Clone, Debug)]
pub(crate) struct SentMessage {
    pub(crate) reply_to: MessageRef,
    pub(crate) text: String,
    pub(crate) button: Option<Button>,
}

/// Messenger that records everything and hands out increasing message IDs
#[derive(Default)]
pub(crate) struct RecordingMessenger {
    pub(crate) sent: Mutex<Vec<SentMessage>>,
    pub(crate) edits: Mutex<Vec<(MessageRef, String)>>,
    pub(crate) deleted: Mutex<Vec<MessageRef>>,
    pub(crate) aggregate_updates: AtomicUsize,
    pub(crate) aggregate_deletes: AtomicUsize,
    pub(crate) reject_buttons: AtomicBool,
    next_id: AtomicI64,
}

impl RecordingMessenger {
    /// Messages other than the initial status message
    pub(crate) fn notifications(&self) -> Vec<SentMessage> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.text != super::status::INITIAL_STATUS)
            .cloned()
            .collect()
    }

    pub(crate) fn status_messages_sent(&self) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.text == super::status::INITIAL_STATUS)
            .count()
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send_message(
        &self,
        reply_to: MessageRef,
        text: &str,
        button: Option<&Button>,
    ) -> std::result::Result<MessageRef, NotifyError> {
        if button.is_some() && self.reject_buttons.load(Ordering::SeqCst) {
            return Err(NotifyError {
                operation: "send",
                reason: "BUTTON_URL_INVALID".to_string(),
            });
        }
        self.sent.lock().unwrap().push(SentMessage {
            reply_to,
            text: text.to_string(),
            button: button.cloned(),
        });
        Ok(MessageRef {
            chat_id: reply_to.chat_id,
            message_id: 1000 + self.next_id.fetch_add(1, Ordering::SeqCst),
        })
    }

    async fn edit_message(
        &self,
        message: MessageRef,
        text: &str,
    ) -> std::result::Result<(), NotifyError> {
        self.edits
            .lock()
            .unwrap()
            .push((message, text.to_string()));
        Ok(())
    }

    async fn delete_message(&self, message: MessageRef) -> std::result::Result<(), NotifyError> {
        self.deleted.lock().unwrap().push(message);
        Ok(())
    }

    async fn update_aggregate_status(&self, _chat_id: i64) -> std::result::Result<(), NotifyError> {
        self.aggregate_updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete_aggregate_status(&self) -> std::result::Result<(), NotifyError> {
        self.aggregate_deletes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// What the [`ScriptedBackend`] does with a job
#[derive(Clone, Debug)]
pub(crate) enum Script {
    /// Write one file of `size` bytes (sparse) and report completion
    File { name: String, size: u64 },
    /// Write a directory of sparse files and report completion
    Dir { name: String, files: Vec<(String, u64)> },
    /// Write `bytes` to `name` and report completion
    Bytes { name: String, bytes: Vec<u8> },
    /// Report an error through the reporter
    Fail { message: String, hint: Option<Button> },
    /// Refuse to start
    Refuse(String),
    /// Keep the reporter; the test finishes the job by hand
    Hold,
    /// Drop the reporter without a terminal signal
    Abandon,
}

/// Job as seen by the backend, minus the reporter (holding it would keep the channel open)
#[derive(Clone, Debug)]
pub(crate) struct DispatchedJob {
    pub(crate) mid: TaskId,
    pub(crate) source: DownloadSource,
    pub(crate) destination: PathBuf,
    pub(crate) headers: Vec<String>,
    pub(crate) seed: Option<SeedPolicy>,
}

/// Backend that follows a script per link (or a default script)
pub(crate) struct ScriptedBackend {
    default: Script,
    scripts: Mutex<HashMap<String, Script>>,
    pub(crate) jobs: Mutex<Vec<DispatchedJob>>,
    held: Mutex<HashMap<TaskId, DownloadJob>>,
}

impl ScriptedBackend {
    pub(crate) fn new(default: Script) -> Self {
        Self {
            default,
            scripts: Mutex::new(HashMap::new()),
            jobs: Mutex::new(Vec::new()),
            held: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn script(&self, link: &str, script: Script) {
        self.scripts
            .lock()
            .unwrap()
            .insert(link.to_string(), script);
    }

    pub(crate) fn dispatched(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }

    pub(crate) fn dispatched_ids(&self) -> Vec<TaskId> {
        self.jobs
            .lock()
            .unwrap()
            .iter()
            .map(|job| job.mid)
            .collect()
    }

    pub(crate) fn held(&self) -> usize {
        self.held.lock().unwrap().len()
    }

    /// Finish a held job with a single sparse file
    pub(crate) fn complete_held(&self, mid: TaskId, name: &str, size: u64) {
        let job = self.held.lock().unwrap().remove(&mid).unwrap();
        write_sparse(&job.destination.join(name), size);
        job.reporter.complete(name, size);
    }

    pub(crate) fn fail_held(&self, mid: TaskId, message: &str) {
        let job = self.held.lock().unwrap().remove(&mid).unwrap();
        job.reporter.error(message, None);
    }
}

fn write_sparse(path: &Path, size: u64) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let file = std::fs::File::create(path).unwrap();
    file.set_len(size).unwrap();
}

#[async_trait]
impl TransferBackend for ScriptedBackend {
    async fn start(&self, job: DownloadJob) -> Result<()> {
        let link = match &job.source {
            DownloadSource::Link(link) => link.clone(),
            DownloadSource::Attachment(attachment) => attachment.file_name.clone(),
            DownloadSource::Direct(descriptor) => descriptor.title.clone(),
        };
        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(&link)
            .cloned()
            .unwrap_or_else(|| self.default.clone());
        self.jobs.lock().unwrap().push(DispatchedJob {
            mid: job.task.mid,
            source: job.source.clone(),
            destination: job.destination.clone(),
            headers: job.headers.clone(),
            seed: job.seed.clone(),
        });

        if let Script::Refuse(message) = &script {
            return Err(Error::Backend(BackendError::Reported {
                message: message.clone(),
                hint: None,
            }));
        }

        let reporter: DownloadReporter = job.reporter.clone();
        reporter.started(format!("gid-{}", job.task.mid));
        match script {
            Script::File { name, size } => {
                write_sparse(&job.destination.join(&name), size);
                reporter.complete(name, size);
            }
            Script::Dir { name, files } => {
                let root = job.destination.join(&name);
                std::fs::create_dir_all(&root).unwrap();
                let mut total = 0;
                for (file, size) in files {
                    write_sparse(&root.join(file), size);
                    total += size;
                }
                reporter.complete(name, total);
            }
            Script::Bytes { name, bytes } => {
                std::fs::create_dir_all(&job.destination).unwrap();
                std::fs::write(job.destination.join(&name), &bytes).unwrap();
                reporter.complete(name, bytes.len() as u64);
            }
            Script::Fail { message, hint } => reporter.error(message, hint),
            Script::Hold => {
                self.held.lock().unwrap().insert(job.task.mid, job);
            }
            Script::Abandon | Script::Refuse(_) => {}
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Prober answering a fixed content type
pub(crate) struct FakeProber {
    pub(crate) content_type: Option<String>,
    pub(crate) calls: AtomicUsize,
}

#[async_trait]
impl LinkProber for FakeProber {
    async fn content_type(&self, _link: &str) -> Option<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.content_type.clone()
    }
}

/// Resolver answering a fixed result
pub(crate) struct FakeResolver {
    pub(crate) result: Mutex<std::result::Result<Resolved, ResolutionError>>,
    pub(crate) calls: AtomicUsize,
}

#[async_trait]
impl LinkResolver for FakeResolver {
    async fn resolve(&self, _link: &str) -> std::result::Result<Resolved, ResolutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.lock().unwrap().clone()
    }
}

/// Media filter that skips files named `*skip*` and attaches fixed metadata
#[derive(Default)]
pub(crate) struct FakeMediaFilter {
    pub(crate) info: Option<MediaInfo>,
    pub(crate) processed: Mutex<Vec<PathBuf>>,
}

#[async_trait]
impl MediaFilter for FakeMediaFilter {
    async fn process(
        &self,
        path: &Path,
        _task: &TaskSnapshot,
    ) -> std::result::Result<Option<Filtered>, ProcessingError> {
        self.processed.lock().unwrap().push(path.to_path_buf());
        let skipped = path
            .file_name()
            .is_some_and(|n| n.to_string_lossy().contains("skip"));
        if skipped {
            return Ok(None);
        }
        Ok(Some(Filtered {
            path: path.to_path_buf(),
            media_info: self.info.clone(),
        }))
    }
}

/// One upload request as seen by the [`FakeUploader`]
#[derive(Clone, Debug)]
pub(crate) struct UploadCall {
    pub(crate) path: PathBuf,
    pub(crate) parts: Parts,
    pub(crate) mid: TaskId,
}

/// Uploader yielding `records_per_part` records per request
pub(crate) struct FakeUploader {
    pub(crate) records_per_part: usize,
    pub(crate) fail_with: Option<String>,
    pub(crate) gate: Option<Arc<Notify>>,
    pub(crate) calls: Mutex<Vec<UploadCall>>,
}

impl Default for FakeUploader {
    fn default() -> Self {
        Self {
            records_per_part: 1,
            fail_with: None,
            gate: None,
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl Uploader for FakeUploader {
    fn upload(&self, request: UploadRequest) -> BoxStream<'static, Result<SentRecord>> {
        self.calls.lock().unwrap().push(UploadCall {
            path: request.path.clone(),
            parts: request.task.parts,
            mid: request.task.mid,
        });

        let items: Vec<Result<SentRecord>> = match &self.fail_with {
            Some(message) => vec![Err(Error::Backend(BackendError::Upload(message.clone())))],
            None => {
                let name = request
                    .path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let size = std::fs::metadata(&request.path).map(|m| m.len()).unwrap_or(0);
                (0..self.records_per_part)
                    .map(|i| {
                        Ok(SentRecord {
                            name: if i == 0 {
                                name.clone()
                            } else {
                                format!("{}.{}", name, i)
                            },
                            size,
                            link: Some(format!("https://cloud.example/{}/{}", request.task.mid, i)),
                            message: None,
                        })
                    })
                    .collect()
            }
        };

        let gate = self.gate.clone();
        futures::stream::iter(items)
            .then(move |item| {
                let gate = gate.clone();
                async move {
                    if let Some(gate) = gate {
                        gate.notified().await;
                    }
                    item
                }
            })
            .boxed()
    }
}

/// Store that records calls in order
#[derive(Default)]
pub(crate) struct FakeStore {
    pub(crate) calls: Mutex<Vec<String>>,
}

#[async_trait]
impl IncompleteTaskStore for FakeStore {
    async fn record_incomplete_task(&self, chat_id: i64, message_link: &str, tag: &str) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("record {} {} {}", chat_id, message_link, tag));
        Ok(())
    }

    async fn clear_incomplete_task(&self, message_link: &str) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("clear {}", message_link));
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakeBookkeeping {
    pub(crate) purges: AtomicUsize,
}

#[async_trait]
impl TransferBookkeeping for FakeBookkeeping {
    async fn purge_completed(&self) -> Result<()> {
        self.purges.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Handles to every double wired into a test coordinator
pub(crate) struct Fakes {
    pub(crate) backend: Arc<ScriptedBackend>,
    pub(crate) prober: Arc<FakeProber>,
    pub(crate) resolver: Arc<FakeResolver>,
    pub(crate) media_filter: Arc<FakeMediaFilter>,
    pub(crate) uploader: Arc<FakeUploader>,
    pub(crate) messenger: Arc<RecordingMessenger>,
    pub(crate) store: Arc<FakeStore>,
    pub(crate) bookkeeping: Arc<FakeBookkeeping>,
}

/// Knobs for [`create_test_coordinator`]
pub(crate) struct TestSetup {
    pub(crate) backend: Script,
    pub(crate) content_type: Option<String>,
    pub(crate) resolved: std::result::Result<Resolved, ResolutionError>,
    pub(crate) uploader: FakeUploader,
    pub(crate) media_info: Option<MediaInfo>,
    pub(crate) max_concurrent_downloads: usize,
    pub(crate) max_concurrent_uploads: usize,
}

impl Default for TestSetup {
    fn default() -> Self {
        Self {
            backend: Script::File {
                name: "file.mkv".to_string(),
                size: 1024,
            },
            content_type: Some("video/x-matroska".to_string()),
            resolved: Ok(Resolved::Url("https://cdn.example/file.mkv".to_string())),
            uploader: FakeUploader::default(),
            media_info: None,
            max_concurrent_downloads: 4,
            max_concurrent_uploads: 4,
        }
    }
}

/// Create a coordinator wired with test doubles
///
/// Returns the coordinator, the doubles and the tempdir (which must be kept alive).
pub(crate) async fn create_test_coordinator(setup: TestSetup) -> (TaskCoordinator, Fakes, TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();

    let mut config = Config::default();
    config.download.download_dir = temp_dir.path().join("downloads");
    config.download.max_concurrent_downloads = setup.max_concurrent_downloads;
    config.download.max_concurrent_uploads = setup.max_concurrent_uploads;
    config.download.cleanup_grace = Duration::ZERO;
    config.persistence.database_path = temp_dir.path().join("test.db");
    config.persistence.incomplete_task_notifier = true;

    let fakes = Fakes {
        backend: Arc::new(ScriptedBackend::new(setup.backend)),
        prober: Arc::new(FakeProber {
            content_type: setup.content_type,
            calls: AtomicUsize::new(0),
        }),
        resolver: Arc::new(FakeResolver {
            result: Mutex::new(setup.resolved),
            calls: AtomicUsize::new(0),
        }),
        media_filter: Arc::new(FakeMediaFilter {
            info: setup.media_info,
            processed: Mutex::new(Vec::new()),
        }),
        uploader: Arc::new(setup.uploader),
        messenger: Arc::new(RecordingMessenger::default()),
        store: Arc::new(FakeStore::default()),
        bookkeeping: Arc::new(FakeBookkeeping::default()),
    };

    let backend: Arc<dyn TransferBackend> = fakes.backend.clone();
    let backends = [
        BackendKind::Attachment,
        BackendKind::Direct,
        BackendKind::QueueClient,
        BackendKind::TorrentClient,
        BackendKind::Newsgroup,
        BackendKind::RemoteStorage,
        BackendKind::CloudDrive,
        BackendKind::Uri,
    ]
    .into_iter()
    .fold(Backends::new(), |backends, kind| {
        backends.register(kind, backend.clone())
    });

    let collaborators = Collaborators {
        backends,
        prober: fakes.prober.clone(),
        resolver: fakes.resolver.clone(),
        extractor: Arc::new(DefaultExtractor),
        media_filter: fakes.media_filter.clone(),
        uploader: fakes.uploader.clone(),
        messenger: fakes.messenger.clone(),
        store: Some(fakes.store.clone() as Arc<dyn IncompleteTaskStore>),
        bookkeeping: Some(fakes.bookkeeping.clone() as Arc<dyn TransferBookkeeping>),
    };

    let coordinator = TaskCoordinator::new(config, collaborators).await.unwrap();
    (coordinator, fakes, temp_dir)
}

pub(crate) fn origin(message_id: i64) -> TaskOrigin {
    TaskOrigin {
        chat_id: -100,
        message_id,
        message_link: format!("https://t.me/c/100/{}", message_id),
        tag: "@alice".to_string(),
        is_super_chat: true,
    }
}

pub(crate) fn leech() -> TaskOptions {
    TaskOptions {
        is_leech: true,
        ..Default::default()
    }
}

/// Wait for the terminal event of `id`
pub(crate) async fn wait_terminal(rx: &mut broadcast::Receiver<Event>, id: TaskId) -> Event {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = rx.recv().await.unwrap();
            let done = match &event {
                Event::Completed { id } | Event::Failed { id, .. } | Event::Cancelled { id } => {
                    Some(*id)
                }
                _ => None,
            };
            if done == Some(id) {
                return event;
            }
        }
    })
    .await
    .expect("task did not reach a terminal state")
}

/// Poll `condition` until it holds
pub(crate) async fn eventually(what: &str, condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {}", what));
}
