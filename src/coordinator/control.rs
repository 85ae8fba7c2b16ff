//! Task control and runtime configuration: cancel, limit updates, shutdown.

use crate::config::{ConfigUpdate, Limits};
use crate::error::{Error, Result};
use crate::types::{Direction, Event, TaskId};
use std::sync::atomic::Ordering;
use std::time::Duration;

use super::TaskCoordinator;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

impl TaskCoordinator {
    /// Cancel a live task
    ///
    /// The task stops at its next suspension point and is torn down without
    /// a message to the originator. Queued tasks are woken immediately.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use mirror_leech::{TaskCoordinator, TaskId};
    /// # async fn example(coordinator: TaskCoordinator, id: TaskId) -> mirror_leech::Result<()> {
    /// coordinator.cancel_task(id).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn cancel_task(&self, mid: TaskId) -> Result<()> {
        let task = self
            .scheduling
            .registry
            .get(mid)
            .await
            .ok_or_else(|| Error::NotFound(format!("Task {} not found", mid)))?;

        tracing::info!(task_id = mid.0, "Cancelling task");
        task.cancel.cancel();
        for direction in [Direction::Download, Direction::Upload] {
            self.scheduling
                .admission
                .release_blocked(direction, mid)
                .await;
        }
        Ok(())
    }

    /// Apply runtime limit changes
    ///
    /// Raising a limit promotes queued tasks right away; lowering one only
    /// affects later admissions. Running tasks are never preempted.
    pub async fn update_config(&self, updates: ConfigUpdate) -> Limits {
        let mut limits = self.scheduling.admission.limits().await;
        if let Some(downloads) = updates.max_concurrent_downloads {
            limits.max_concurrent_downloads = downloads;
        }
        if let Some(uploads) = updates.max_concurrent_uploads {
            limits.max_concurrent_uploads = uploads;
        }

        let promoted = self.scheduling.admission.set_limits(limits).await;
        tracing::info!(
            max_concurrent_downloads = limits.max_concurrent_downloads,
            max_concurrent_uploads = limits.max_concurrent_uploads,
            promoted = promoted.len(),
            "Admission limits updated"
        );
        for (direction, id) in promoted {
            self.emit_event(Event::Promoted { id, direction });
        }
        self.emit_event(Event::LimitsChanged {
            max_concurrent_downloads: limits.max_concurrent_downloads,
            max_concurrent_uploads: limits.max_concurrent_uploads,
        });
        limits
    }

    /// Current admission limits
    pub async fn limits(&self) -> Limits {
        *self.scheduling.limits.read().await
    }

    /// Stop accepting tasks, cancel every live task and wait for teardown
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");
        self.scheduling.accepting_new.store(false, Ordering::SeqCst);

        for task in self.scheduling.registry.all().await {
            if let Err(e) = self.cancel_task(task.mid).await {
                tracing::debug!(task_id = task.mid.0, error = %e, "task ended before cancellation");
            }
        }

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.wait_for_idle()).await {
            Ok(()) => tracing::info!("All tasks torn down"),
            Err(_) => tracing::warn!("Timeout waiting for tasks to tear down, proceeding with shutdown"),
        }

        if let Some(token) = self.scheduling.status_refresher.lock().await.take() {
            token.cancel();
        }
        self.emit_event(Event::Shutdown);
        tracing::info!("Graceful shutdown complete");
        Ok(())
    }

    async fn wait_for_idle(&self) {
        while !self.scheduling.registry.is_empty().await {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}
