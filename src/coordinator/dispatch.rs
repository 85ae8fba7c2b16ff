//! Admission waits and slot release.

use crate::admission::{Admission, Wake};
use crate::task::Task;
use crate::types::{Direction, Event, State, TaskId};

use super::TaskCoordinator;

impl TaskCoordinator {
    /// Acquire a slot in `direction`, waiting in the lane's queue if needed
    ///
    /// Returns false when the task was cancelled or released while queued.
    pub(crate) async fn admit(&self, task: &Task, direction: Direction) -> bool {
        let force = match direction {
            Direction::Download => task.options.bypasses_download_queue(),
            Direction::Upload => task.options.bypasses_upload_queue(),
        };

        let wait = match self
            .scheduling
            .admission
            .try_admit(direction, task.mid, force)
            .await
        {
            Admission::Proceed => return self.keep_slot(task, direction).await,
            Admission::Wait(wait) => wait,
        };

        tracing::info!(task_id = task.mid.0, %direction, "Task queued");
        task.set_state(State::Queued(direction)).await;
        self.emit_event(Event::Queued {
            id: task.mid,
            direction,
        });
        self.update_status(task).await;

        // Cancellation may land before the waiter is in the queue, so the
        // token is watched alongside the handle.
        let wake = tokio::select! {
            wake = wait.wait() => wake,
            _ = task.cancel.cancelled() => Wake::Released,
        };

        match wake {
            Wake::Promoted => {
                tracing::info!(task_id = task.mid.0, %direction, "Task left the queue");
                self.keep_slot(task, direction).await
            }
            Wake::Released => {
                tracing::debug!(task_id = task.mid.0, %direction, "Queued task released");
                false
            }
        }
    }

    /// A slot granted to a task that was cancelled meanwhile goes straight back
    async fn keep_slot(&self, task: &Task, direction: Direction) -> bool {
        if !task.is_cancelled() {
            return true;
        }
        tracing::debug!(task_id = task.mid.0, %direction, "Slot granted after cancellation, releasing");
        self.release_slot(direction, task.mid).await;
        false
    }

    /// Release `mid` from a lane and announce whatever the freed slot promoted
    pub(crate) async fn release_slot(&self, direction: Direction, mid: TaskId) {
        let promoted = self.scheduling.admission.release(direction, mid).await;
        self.announce_promotions(direction, promoted);
    }

    pub(crate) fn announce_promotions(&self, direction: Direction, promoted: Vec<TaskId>) {
        for id in promoted {
            tracing::debug!(task_id = id.0, %direction, "Promoted from queue");
            self.emit_event(Event::Promoted { id, direction });
        }
    }
}
