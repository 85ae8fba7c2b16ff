//! Teardown: error, cancellation and completion paths.
//!
//! Every path starts by removing the task from the registry. Whoever removes
//! it owns the teardown; later calls for the same task are no-ops, which
//! makes all entry points idempotent.

use crate::error::{BackendError, Error, FailureRoute};
use crate::task::Task;
use crate::types::{Button, Direction, Event, State};
use crate::utils::{clean_download, escape_html};

use super::TaskCoordinator;

/// How a task ended
#[derive(Debug)]
enum Ending {
    DownloadError { message: String, hint: Option<Button> },
    UploadError { message: String },
    Cancelled,
}

impl TaskCoordinator {
    /// Route a lifecycle error to the matching teardown entry point
    ///
    /// Returns false if the task had already been torn down.
    pub(crate) async fn on_error(&self, task: &Task, error: Error) -> bool {
        match error.route() {
            FailureRoute::Download => {
                let hint = match &error {
                    Error::Backend(BackendError::Reported { hint, .. }) => hint.clone(),
                    _ => None,
                };
                self.on_download_error(task, &error.to_string(), hint).await
            }
            FailureRoute::Upload | FailureRoute::LogOnly => {
                self.on_upload_error(task, &error.to_string()).await
            }
        }
    }

    /// Fail a task that did not finish downloading
    ///
    /// Returns false if the task had already been torn down.
    pub async fn on_download_error(&self, task: &Task, error: &str, hint: Option<Button>) -> bool {
        self.teardown(
            task,
            Ending::DownloadError {
                message: error.to_string(),
                hint,
            },
        )
        .await
    }

    /// Fail a task during post-processing or upload
    ///
    /// Returns false if the task had already been torn down.
    pub async fn on_upload_error(&self, task: &Task, error: &str) -> bool {
        self.teardown(
            task,
            Ending::UploadError {
                message: error.to_string(),
            },
        )
        .await
    }

    /// Tear down a cancelled task without notifying the originator
    pub(crate) async fn on_cancelled(&self, task: &Task) -> bool {
        self.teardown(task, Ending::Cancelled).await
    }

    async fn teardown(&self, task: &Task, ending: Ending) -> bool {
        let Some(remaining) = self.scheduling.registry.remove(task.mid).await else {
            tracing::debug!(task_id = task.mid.0, "task already torn down");
            return false;
        };
        task.cancel.cancel();
        self.leave_same_dir(task).await;
        task.set_state(State::Failed).await;

        match &ending {
            Ending::DownloadError { message, hint } => {
                tracing::error!(task_id = task.mid.0, error = %message, "Download failed");
                let text = format!("{} Download: {}", task.origin.tag, escape_html(message));
                self.send_with_button(task, task.origin.message_ref(), &text, hint.as_ref())
                    .await;
            }
            Ending::UploadError { message } => {
                tracing::error!(task_id = task.mid.0, error = %message, "Upload failed");
                let text = format!("{} {}", task.origin.tag, escape_html(message));
                self.send_with_button(task, task.origin.message_ref(), &text, None)
                    .await;
            }
            Ending::Cancelled => {
                tracing::info!(task_id = task.mid.0, "Task cancelled");
            }
        }

        self.finish_bookkeeping(task, remaining).await;

        match ending {
            Ending::DownloadError { message, .. } | Ending::UploadError { message } => {
                self.emit_event(Event::Failed {
                    id: task.mid,
                    error: message,
                });
            }
            Ending::Cancelled => self.emit_event(Event::Cancelled { id: task.mid }),
        }

        tokio::time::sleep(self.config.download.cleanup_grace).await;
        clean_download(&task.storage_root()).await;
        self.clean_outputs(task).await;
        true
    }

    /// Finish a task whose every part was delivered
    ///
    /// Seeding tasks keep their working directory for the torrent backend;
    /// only the upload staging directory is purged.
    pub(crate) async fn on_task_complete(&self, task: &Task) -> bool {
        let Some(remaining) = self.scheduling.registry.remove(task.mid).await else {
            tracing::debug!(task_id = task.mid.0, "task already torn down");
            return false;
        };
        self.leave_same_dir(task).await;
        task.set_state(State::Completed).await;
        tracing::info!(task_id = task.mid.0, seeding = task.options.seeds(), "Task completed");

        if task.options.seeds() {
            if let Some(up_dir) = &task.options.up_dir {
                clean_download(up_dir).await;
            }
        } else {
            clean_download(&task.storage_root()).await;
            self.clean_outputs(task).await;
        }

        self.finish_bookkeeping(task, remaining).await;
        self.emit_event(Event::Completed { id: task.mid });
        true
    }

    /// Status message, aggregate view, incomplete-task record and both lanes
    async fn finish_bookkeeping(&self, task: &Task, remaining: usize) {
        self.delete_status_message(task).await;

        if remaining == 0 {
            self.on_idle().await;
        } else if let Err(e) = self
            .collaborators
            .messenger
            .update_aggregate_status(task.origin.chat_id)
            .await
        {
            tracing::warn!(task_id = task.mid.0, error = %e, "aggregate status refresh failed");
        }

        if self.records_incomplete(task)
            && let Some(store) = &self.collaborators.store
            && let Err(e) = store.clear_incomplete_task(&task.origin.message_link).await
        {
            tracing::warn!(task_id = task.mid.0, error = %e, "failed to clear incomplete task");
        }

        for direction in [Direction::Download, Direction::Upload] {
            self.release_slot(direction, task.mid).await;
        }
    }

    /// Upload staging directory and custom thumbnail
    async fn clean_outputs(&self, task: &Task) {
        if let Some(up_dir) = &task.options.up_dir {
            clean_download(up_dir).await;
        }
        if let Some(thumbnail) = &task.options.thumbnail {
            clean_download(thumbnail).await;
        }
    }
}
