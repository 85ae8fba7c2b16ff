//! Shared collaborators for integration tests
//!
//! These stand in for the chat client, the download daemons and the uploader
//! using only the crate's public API.

#![allow(dead_code)]

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use mirror_leech::extraction::DefaultExtractor;
use mirror_leech::links::HttpLinkProber;
use mirror_leech::{
    BackendKind, Backends, Button, Collaborators, Config, DownloadJob, DownloadSource, Event,
    LinkResolver, MessageRef, Messenger, NotifyError, PassthroughMediaFilter, ResolutionError,
    Resolved, SentRecord, TaskCoordinator, TaskId, TaskOrigin, TransferBackend, UploadRequest,
    Uploader,
};
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Messenger that keeps every sent text
#[derive(Default)]
pub struct ChatLog {
    pub sent: Mutex<Vec<(MessageRef, String)>>,
    next_id: AtomicI64,
}

impl ChatLog {
    /// Texts of every message sent, status placeholders included
    pub fn texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, text)| text.clone())
            .collect()
    }
}

#[async_trait]
impl Messenger for ChatLog {
    async fn send_message(
        &self,
        reply_to: MessageRef,
        text: &str,
        _button: Option<&Button>,
    ) -> Result<MessageRef, NotifyError> {
        self.sent.lock().unwrap().push((reply_to, text.to_string()));
        Ok(MessageRef {
            chat_id: reply_to.chat_id,
            message_id: 1000 + self.next_id.fetch_add(1, Ordering::SeqCst),
        })
    }

    async fn edit_message(&self, _message: MessageRef, _text: &str) -> Result<(), NotifyError> {
        Ok(())
    }

    async fn delete_message(&self, _message: MessageRef) -> Result<(), NotifyError> {
        Ok(())
    }

    async fn update_aggregate_status(&self, _chat_id: i64) -> Result<(), NotifyError> {
        Ok(())
    }

    async fn delete_aggregate_status(&self) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Backend that writes a copy of `payload` named after the link's last path segment
pub struct LocalBackend {
    pub payload: Vec<u8>,
    pub jobs: Mutex<Vec<String>>,
}

impl LocalBackend {
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            payload,
            jobs: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl TransferBackend for LocalBackend {
    async fn start(&self, job: DownloadJob) -> mirror_leech::Result<()> {
        let link = match &job.source {
            DownloadSource::Link(link) => link.clone(),
            other => format!("{:?}", other),
        };
        self.jobs.lock().unwrap().push(link.clone());

        let name = link.rsplit('/').next().unwrap_or("download").to_string();
        let payload = self.payload.clone();
        tokio::spawn(async move {
            job.reporter.started(format!("local-{}", job.task.mid));
            tokio::fs::create_dir_all(&job.destination).await.unwrap();
            tokio::fs::write(job.destination.join(&name), &payload)
                .await
                .unwrap();
            job.reporter.complete(name, payload.len() as u64);
        });
        Ok(())
    }

    fn name(&self) -> &str {
        "local"
    }
}

/// Resolver that maps every landing page to a fixed direct URL
pub struct FixedResolver(pub String);

#[async_trait]
impl LinkResolver for FixedResolver {
    async fn resolve(&self, _link: &str) -> Result<Resolved, ResolutionError> {
        Ok(Resolved::Url(self.0.clone()))
    }
}

/// Uploader that reports one record per regular file found under the path
#[derive(Default)]
pub struct ListingUploader {
    pub uploaded: Mutex<Vec<String>>,
}

impl Uploader for ListingUploader {
    fn upload(&self, request: UploadRequest) -> BoxStream<'static, mirror_leech::Result<SentRecord>> {
        let mut records = Vec::new();
        collect_files(&request.path, &mut records);
        records.sort_by(|a, b| a.name.cmp(&b.name));
        self.uploaded
            .lock()
            .unwrap()
            .extend(records.iter().map(|r| r.name.clone()));
        stream::iter(records.into_iter().map(Ok)).boxed()
    }
}

fn collect_files(path: &Path, out: &mut Vec<SentRecord>) {
    if path.is_dir() {
        for entry in std::fs::read_dir(path).unwrap() {
            collect_files(&entry.unwrap().path(), out);
        }
    } else if let Ok(metadata) = std::fs::metadata(path) {
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        out.push(SentRecord {
            link: Some(format!("https://cloud.example/{}", name)),
            name,
            size: metadata.len(),
            message: None,
        });
    }
}

/// Everything a test needs to inspect after wiring a coordinator
pub struct Harness {
    pub coordinator: TaskCoordinator,
    pub chat: Arc<ChatLog>,
    pub backend: Arc<LocalBackend>,
    pub uploader: Arc<ListingUploader>,
    pub temp: TempDir,
}

/// Wire a coordinator with real probing, extraction and persistence
pub async fn harness(payload: Vec<u8>, resolve_to: &str) -> Harness {
    let temp = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.download.download_dir = temp.path().join("downloads");
    config.download.cleanup_grace = Duration::ZERO;
    config.persistence.database_path = temp.path().join("tasks.db");
    config.persistence.incomplete_task_notifier = true;
    config.links.probe_timeout = Duration::from_secs(2);

    let chat = Arc::new(ChatLog::default());
    let backend = Arc::new(LocalBackend::new(payload));
    let uploader = Arc::new(ListingUploader::default());

    let collaborators = Collaborators {
        backends: Backends::new().register(BackendKind::Uri, backend.clone()),
        prober: Arc::new(HttpLinkProber::new(&config.links).unwrap()),
        resolver: Arc::new(FixedResolver(resolve_to.to_string())),
        extractor: Arc::new(DefaultExtractor),
        media_filter: Arc::new(PassthroughMediaFilter),
        uploader: uploader.clone(),
        messenger: chat.clone(),
        store: None,
        bookkeeping: None,
    };
    let coordinator = TaskCoordinator::new(config, collaborators).await.unwrap();

    Harness {
        coordinator,
        chat,
        backend,
        uploader,
        temp,
    }
}

/// Origin in a group chat
pub fn group_origin(message_id: i64) -> TaskOrigin {
    TaskOrigin {
        chat_id: -100200,
        message_id,
        message_link: format!("https://t.me/c/200/{}", message_id),
        tag: "@bob".to_string(),
        is_super_chat: true,
    }
}

/// Wait for the task's terminal event
pub async fn wait_for_terminal(
    events: &mut tokio::sync::broadcast::Receiver<Event>,
    id: TaskId,
) -> Event {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let event = events.recv().await.unwrap();
            let terminal = match &event {
                Event::Completed { id: done }
                | Event::Failed { id: done, .. }
                | Event::Cancelled { id: done } => Some(*done),
                _ => None,
            };
            if terminal == Some(id) {
                return event;
            }
        }
    })
    .await
    .expect("task never reached a terminal state")
}

/// Build a ZIP archive holding the given files
pub fn zip_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    use std::io::Write;

    let mut buffer = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut buffer);
        for (name, data) in files {
            writer
                .start_file(*name, zip::write::FileOptions::default())
                .unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
    }
    buffer.into_inner()
}
