//! Per-task status messages and the aggregate status refresher.

use crate::collaborators::{MessageRef, log_notify_error};
use crate::task::Task;
use crate::types::Button;
use std::collections::BTreeSet;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::TaskCoordinator;

/// Text of the status message posted when a task is accepted
pub(crate) const INITIAL_STATUS: &str = "🎬 Analyzing Streams... ⏳";

const MIN_STATUS_INTERVAL: Duration = Duration::from_millis(100);

impl TaskCoordinator {
    /// Post the initial status message in reply to the originating message
    pub(crate) async fn send_status_message(&self, task: &Task) {
        match self
            .collaborators
            .messenger
            .send_message(task.origin.message_ref(), INITIAL_STATUS, None)
            .await
        {
            Ok(message) => task.progress().await.status_message = Some(message),
            Err(e) => log_notify_error(task.mid, &e),
        }
    }

    /// Rewrite the status message with the current state and name
    pub(crate) async fn update_status(&self, task: &Task) {
        let (message, text) = {
            let progress = task.progress().await;
            let Some(message) = progress.status_message else {
                tracing::warn!(task_id = task.mid.0, "no status message to update");
                return;
            };
            (
                message,
                format!(
                    "**{}**\n\n<code>{}</code>",
                    progress.state.label(),
                    progress.name
                ),
            )
        };
        if let Err(e) = self
            .collaborators
            .messenger
            .edit_message(message, &text)
            .await
        {
            log_notify_error(task.mid, &e);
        }
    }

    /// Delete the status message, once
    pub(crate) async fn delete_status_message(&self, task: &Task) {
        let Some(message) = task.progress().await.status_message.take() else {
            return;
        };
        if let Err(e) = self.collaborators.messenger.delete_message(message).await {
            log_notify_error(task.mid, &e);
        }
    }

    /// Send a message; a rejected button is dropped and the send retried without it
    pub(crate) async fn send_with_button(
        &self,
        task: &Task,
        reply_to: MessageRef,
        text: &str,
        button: Option<&Button>,
    ) {
        let messenger = &self.collaborators.messenger;
        match messenger.send_message(reply_to, text, button).await {
            Ok(_) => {}
            Err(e) if button.is_some() => {
                tracing::warn!(task_id = task.mid.0, error = %e, "message with button rejected, retrying without it");
                if let Err(e) = messenger.send_message(reply_to, text, None).await {
                    log_notify_error(task.mid, &e);
                }
            }
            Err(e) => log_notify_error(task.mid, &e),
        }
    }

    /// Start the periodic aggregate status refresh if it is not running
    pub(crate) async fn ensure_status_refresher(&self) {
        let mut slot = self.scheduling.status_refresher.lock().await;
        if slot.is_some() {
            return;
        }
        let token = CancellationToken::new();
        *slot = Some(token.clone());
        drop(slot);

        let coordinator = self.clone();
        let period = self
            .config
            .download
            .status_update_interval
            .max(MIN_STATUS_INTERVAL);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick fires immediately; the status message was just posted.
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => coordinator.refresh_aggregate_status().await,
                }
            }
            tracing::debug!("status refresher stopped");
        });
        tracing::debug!(period_ms = period.as_millis() as u64, "status refresher started");
    }

    async fn refresh_aggregate_status(&self) {
        let chats: BTreeSet<i64> = self
            .scheduling
            .registry
            .all()
            .await
            .iter()
            .map(|task| task.origin.chat_id)
            .collect();
        for chat_id in chats {
            if let Err(e) = self
                .collaborators
                .messenger
                .update_aggregate_status(chat_id)
                .await
            {
                tracing::warn!(chat_id, error = %e, "aggregate status refresh failed");
            }
        }
    }

    /// Everything finished: stop refreshing, purge backend bookkeeping and
    /// drop the aggregate status views
    pub(crate) async fn on_idle(&self) {
        if let Some(token) = self.scheduling.status_refresher.lock().await.take() {
            token.cancel();
        }
        if let Some(bookkeeping) = &self.collaborators.bookkeeping
            && let Err(e) = bookkeeping.purge_completed().await
        {
            tracing::warn!(error = %e, "failed to purge transfer bookkeeping");
        }
        if let Err(e) = self.collaborators.messenger.delete_aggregate_status().await {
            tracing::warn!(error = %e, "failed to delete aggregate status");
        }
        tracing::info!("All tasks finished, coordinator idle");
    }
}
