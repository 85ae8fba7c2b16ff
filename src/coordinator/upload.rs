//! Upload streaming and per-record completion notices.

use crate::collaborators::{SentRecord, UploadRequest};
use crate::error::{BackendError, Error, Result};
use crate::notice::{CompletionNotice, NoticeContext};
use crate::task::Task;
use crate::types::{Direction, Event, State};
use futures::StreamExt;
use std::path::PathBuf;

use super::TaskCoordinator;

impl TaskCoordinator {
    /// Upload one part and notify the originator once per delivered unit
    ///
    /// The upload slot is taken before the first part and held until the task
    /// ends.
    pub(crate) async fn upload(&self, task: &Task, path: PathBuf) -> Result<Option<()>> {
        if !self
            .scheduling
            .admission
            .is_running(Direction::Upload, task.mid)
            .await
            && !self.admit(task, Direction::Upload).await
        {
            return Ok(None);
        }
        if task.is_cancelled() {
            return Ok(None);
        }

        task.set_state(State::Uploading).await;
        self.update_status(task).await;

        let request = UploadRequest {
            task: task.snapshot().await,
            path,
        };
        tracing::info!(task_id = task.mid.0, path = %request.path.display(), "Uploading");
        let mut records = self.collaborators.uploader.upload(request);

        loop {
            let next = tokio::select! {
                next = records.next() => next,
                _ = task.cancel.cancelled() => return Ok(None),
            };
            let record = match next {
                None => break,
                Some(Ok(record)) => record,
                Some(Err(e)) => return Err(upload_failure(e)),
            };
            if task.is_cancelled() {
                return Ok(None);
            }

            let part = task.progress().await.parts.current();
            tracing::info!(task_id = task.mid.0, part, name = %record.name, size = record.size, "Part uploaded");
            self.emit_event(Event::PartUploaded {
                id: task.mid,
                part,
                name: record.name.clone(),
                size: record.size,
            });
            self.send_completion_notice(task, &record).await;
        }

        Ok(Some(()))
    }

    async fn send_completion_notice(&self, task: &Task, record: &SentRecord) {
        let notice = {
            let progress = task.progress().await;
            let ctx = NoticeContext {
                name: &progress.name,
                original_name: &progress.original_name,
                total_size: progress.size,
                parts: progress.parts,
                tag: &task.origin.tag,
                media_info: progress.media_info.as_ref(),
                is_leech: task.options.is_leech,
                date: chrono::Local::now().date_naive(),
            };
            CompletionNotice::render(&ctx, record)
        };

        let reply_to = record.message.unwrap_or_else(|| task.origin.message_ref());
        self.send_with_button(task, reply_to, &notice.text, notice.button.as_ref())
            .await;
    }
}

/// Errors raised by the uploader always end the task through the upload-error path
fn upload_failure(e: Error) -> Error {
    match e {
        Error::Processing(_) | Error::Backend(BackendError::Upload(_)) => e,
        other => Error::Backend(BackendError::Upload(other.to_string())),
    }
}

