//! Backend dispatch and download signal handling.

use crate::collaborators::{DownloadJob, DownloadReporter, DownloadSignal};
use crate::error::{BackendError, Error, Result};
use crate::links::SourceKind;
use crate::task::Task;
use crate::types::{Direction, Event, State};
use std::path::PathBuf;

use super::TaskCoordinator;

impl TaskCoordinator {
    /// Admit, dispatch to the backend for `kind` and wait for the download to land
    ///
    /// Returns the path of the downloaded file or directory. The download slot
    /// is released as soon as the backend reports completion.
    pub(crate) async fn download(&self, task: &Task, kind: SourceKind) -> Result<Option<PathBuf>> {
        let backend_kind = kind.backend();
        let backend = self
            .collaborators
            .backends
            .get(backend_kind)
            .ok_or_else(|| BackendError::Unavailable(backend_kind.to_string()))?;

        if !self.admit(task, Direction::Download).await {
            return Ok(None);
        }
        if task.is_cancelled() {
            return Ok(None);
        }

        task.set_state(State::Downloading).await;
        self.update_status(task).await;

        let (reporter, mut signals) = DownloadReporter::channel();
        let job = DownloadJob {
            task: task.snapshot().await,
            source: kind.download_source(),
            destination: task.dir.clone(),
            headers: kind.headers(),
            seed: kind.seed(),
            reporter,
        };

        tracing::info!(task_id = task.mid.0, backend = backend.name(), "Dispatching download");
        backend.start(job).await.map_err(|e| match e {
            Error::Backend(_) => e,
            other => Error::Backend(BackendError::Reported {
                message: other.to_string(),
                hint: None,
            }),
        })?;

        let path = loop {
            let signal = tokio::select! {
                signal = signals.recv() => signal,
                _ = task.cancel.cancelled() => return Ok(None),
            };

            match signal {
                Some(DownloadSignal::Started { gid }) => {
                    tracing::info!(task_id = task.mid.0, gid = %gid, "Download started");
                    task.progress().await.gid = Some(gid.clone());
                    self.emit_event(Event::DownloadStarted { id: task.mid, gid });
                    self.on_download_start(task).await;
                }
                Some(DownloadSignal::Complete { name, size }) => {
                    let mut progress = task.progress().await;
                    if !name.is_empty() {
                        progress.name = name.clone();
                        progress.original_name = name.clone();
                    }
                    progress.size = size;
                    break task.dir.join(name);
                }
                Some(DownloadSignal::Error { message, hint }) => {
                    return Err(BackendError::Reported { message, hint }.into());
                }
                None => {
                    return Err(BackendError::Abandoned {
                        backend: backend.name().to_string(),
                    }
                    .into());
                }
            }
        };

        if task.is_cancelled() {
            return Ok(None);
        }

        tracing::info!(task_id = task.mid.0, path = %path.display(), "Download complete");
        self.emit_event(Event::DownloadComplete {
            id: task.mid,
            path: path.clone(),
        });
        self.leave_same_dir(task).await;
        self.release_slot(Direction::Download, task.mid).await;

        Ok(Some(path))
    }

    /// Remember a started task so it can be reported after a restart
    async fn on_download_start(&self, task: &Task) {
        if !self.records_incomplete(task) {
            return;
        }
        let Some(store) = &self.collaborators.store else {
            return;
        };
        if let Err(e) = store
            .record_incomplete_task(
                task.origin.chat_id,
                &task.origin.message_link,
                &task.origin.tag,
            )
            .await
        {
            tracing::warn!(task_id = task.mid.0, error = %e, "failed to record incomplete task");
        }
    }

    /// Whether this task is tracked in the incomplete-task store
    pub(crate) fn records_incomplete(&self, task: &Task) -> bool {
        task.origin.is_super_chat
            && self.config.persistence.incomplete_task_notifier
            && self.collaborators.store.is_some()
    }

    /// Leave the task's same-directory group, if it joined one
    pub(crate) async fn leave_same_dir(&self, task: &Task) {
        let Some(folder) = task.options.folder_name.as_deref() else {
            return;
        };
        if let Some(outcome) = self.scheduling.same_dir.leave(folder, task.mid).await
            && outcome.finalized
        {
            tracing::info!(task_id = task.mid.0, folder, "Same-directory group finalized");
        }
    }
}
