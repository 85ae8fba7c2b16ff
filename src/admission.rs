//! Admission control for download and upload slots.
//!
//! Each [`Direction`] has its own lane behind its own mutex. A lane holds the
//! set of running task IDs and a FIFO of queued task IDs with their
//! wait-handles. Every operation is a single critical section covering
//! "check count → mutate sets → maybe signal", so concurrent admissions and
//! releases never lose an update.

use crate::config::Limits;
use crate::types::{Direction, TaskId};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, oneshot};

/// Why a queued task was woken
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Wake {
    /// The task was moved into the running set and may proceed
    Promoted,
    /// The task was torn down while waiting and must stop
    Released,
}

/// Outcome of an admission request
#[derive(Debug)]
pub enum Admission {
    /// The task holds a slot and may start immediately
    Proceed,
    /// The task was queued; await the handle before starting
    Wait(AdmissionWait),
}

/// Wait-handle for a queued task
#[derive(Debug)]
pub struct AdmissionWait {
    rx: oneshot::Receiver<Wake>,
}

impl AdmissionWait {
    /// Suspend until the task is promoted or released
    ///
    /// A dropped sender (controller gone) counts as a release.
    pub async fn wait(self) -> Wake {
        self.rx.await.unwrap_or(Wake::Released)
    }
}

/// Point-in-time view of one lane
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LaneSnapshot {
    /// Running task IDs, sorted
    pub running: Vec<TaskId>,
    /// Queued task IDs, oldest first
    pub queued: Vec<TaskId>,
}

#[derive(Debug, Default)]
struct Lane {
    running: HashSet<TaskId>,
    queued: VecDeque<(TaskId, oneshot::Sender<Wake>)>,
}

impl Lane {
    fn has_capacity(&self, limit: usize) -> bool {
        limit == 0 || self.running.len() < limit
    }

    fn is_queued(&self, id: TaskId) -> bool {
        self.queued.iter().any(|(queued, _)| *queued == id)
    }

    /// Move queued tasks into the running set while capacity allows, oldest first.
    fn promote(&mut self, limit: usize) -> Vec<TaskId> {
        let mut promoted = Vec::new();
        while self.has_capacity(limit) {
            let Some((id, tx)) = self.queued.pop_front() else {
                break;
            };
            // A receiver dropped without being released means the waiter is
            // gone; skip it so the slot goes to the next task.
            if tx.send(Wake::Promoted).is_ok() {
                self.running.insert(id);
                promoted.push(id);
            } else {
                tracing::debug!(task_id = id.0, "skipping queued task whose waiter is gone");
            }
        }
        promoted
    }
}

/// Shared admission registries for both directions
#[derive(Clone, Debug)]
pub struct AdmissionController {
    limits: Arc<RwLock<Limits>>,
    downloads: Arc<Mutex<Lane>>,
    uploads: Arc<Mutex<Lane>>,
}

impl AdmissionController {
    /// Create a controller reading its limits from `limits` on every admission
    pub fn new(limits: Arc<RwLock<Limits>>) -> Self {
        Self {
            limits,
            downloads: Arc::new(Mutex::new(Lane::default())),
            uploads: Arc::new(Mutex::new(Lane::default())),
        }
    }

    fn lane(&self, direction: Direction) -> &Mutex<Lane> {
        match direction {
            Direction::Download => &self.downloads,
            Direction::Upload => &self.uploads,
        }
    }

    async fn limit(&self, direction: Direction) -> usize {
        let limits = self.limits.read().await;
        match direction {
            Direction::Download => limits.max_concurrent_downloads,
            Direction::Upload => limits.max_concurrent_uploads,
        }
    }

    /// Current live limits
    pub async fn limits(&self) -> Limits {
        *self.limits.read().await
    }

    /// Replace the live limits and fill any capacity they free up
    pub async fn set_limits(&self, limits: Limits) -> Vec<(Direction, TaskId)> {
        *self.limits.write().await = limits;
        let mut promoted = Vec::new();
        for direction in [Direction::Download, Direction::Upload] {
            for id in self.promote(direction).await {
                promoted.push((direction, id));
            }
        }
        promoted
    }

    /// Admit a task into a lane, or queue it behind the running tasks
    ///
    /// `force` bypasses the limit. Admitting a task that is already running or
    /// queued in this lane is answered with `Proceed` / a fresh wait-handle
    /// respectively, without duplicating it.
    pub async fn try_admit(&self, direction: Direction, id: TaskId, force: bool) -> Admission {
        let limit = self.limit(direction).await;
        let mut lane = self.lane(direction).lock().await;

        if lane.running.contains(&id) {
            return Admission::Proceed;
        }

        if force || (lane.queued.is_empty() && lane.has_capacity(limit)) {
            // A forced task may have been sitting in the queue already.
            lane.queued.retain(|(queued, _)| *queued != id);
            lane.running.insert(id);
            tracing::debug!(task_id = id.0, %direction, force, "admitted");
            return Admission::Proceed;
        }

        let (tx, rx) = oneshot::channel();
        if let Some(slot) = lane.queued.iter_mut().find(|(queued, _)| *queued == id) {
            slot.1 = tx;
        } else {
            lane.queued.push_back((id, tx));
        }
        tracing::info!(
            task_id = id.0,
            %direction,
            running = lane.running.len(),
            queued = lane.queued.len(),
            limit,
            "queued"
        );
        Admission::Wait(AdmissionWait { rx })
    }

    /// Remove a task from a lane and promote the oldest queued tasks into the freed capacity
    ///
    /// A task that was still queued is woken with [`Wake::Released`]. Releasing
    /// an unknown task only runs promotion.
    pub async fn release(&self, direction: Direction, id: TaskId) -> Vec<TaskId> {
        let limit = self.limit(direction).await;
        let mut lane = self.lane(direction).lock().await;

        if !lane.running.remove(&id)
            && let Some(pos) = lane.queued.iter().position(|(queued, _)| *queued == id)
            && let Some((_, tx)) = lane.queued.remove(pos)
        {
            tx.send(Wake::Released).ok();
        }

        let promoted = lane.promote(limit);
        for promoted_id in &promoted {
            tracing::info!(task_id = promoted_id.0, %direction, released = id.0, "promoted from queue");
        }
        promoted
    }

    /// Wake a task blocked in a lane's queue with [`Wake::Released`], if it is queued
    pub async fn release_blocked(&self, direction: Direction, id: TaskId) -> bool {
        let mut lane = self.lane(direction).lock().await;
        match lane.queued.iter().position(|(queued, _)| *queued == id) {
            Some(pos) => {
                if let Some((_, tx)) = lane.queued.remove(pos) {
                    tx.send(Wake::Released).ok();
                }
                true
            }
            None => false,
        }
    }

    /// Fill free capacity from the head of a lane's queue
    pub async fn promote(&self, direction: Direction) -> Vec<TaskId> {
        let limit = self.limit(direction).await;
        let mut lane = self.lane(direction).lock().await;
        lane.promote(limit)
    }

    /// Whether a task holds a slot in a lane
    pub async fn is_running(&self, direction: Direction, id: TaskId) -> bool {
        self.lane(direction).lock().await.running.contains(&id)
    }

    /// Whether a task waits in a lane's queue
    pub async fn is_queued(&self, direction: Direction, id: TaskId) -> bool {
        self.lane(direction).lock().await.is_queued(id)
    }

    /// Point-in-time view of a lane
    pub async fn snapshot(&self, direction: Direction) -> LaneSnapshot {
        let lane = self.lane(direction).lock().await;
        let mut running: Vec<_> = lane.running.iter().copied().collect();
        running.sort();
        LaneSnapshot {
            running,
            queued: lane.queued.iter().map(|(id, _)| *id).collect(),
        }
    }
}
