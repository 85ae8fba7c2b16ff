//! Task lifecycle coordinator split into focused submodules.
//!
//! The `TaskCoordinator` struct and its methods are organized by stage:
//! - [`resolve`] - Content-type probing and landing-page unwrapping
//! - [`dispatch`] - Admission waits and slot release
//! - [`download`] - Backend dispatch and download signals
//! - [`post_process`] - Extraction, part enumeration and media filtering
//! - [`upload`] - Upload streaming and completion notices
//! - [`cleanup`] - Error, cancellation and completion teardown
//! - [`status`] - Per-task status messages and the aggregate refresher
//! - [`control`] - Cancellation, runtime limits and shutdown

mod cleanup;
mod control;
mod dispatch;
mod download;
mod post_process;
mod resolve;
mod status;
mod upload;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use crate::admission::AdmissionController;
use crate::collaborators::{Collaborators, IncompleteTaskStore};
use crate::config::{Config, Limits};
use crate::db::Database;
use crate::error::{Error, Result};
use crate::registry::TaskRegistry;
use crate::same_dir::SameDirectoryGroups;
use crate::task::{Source, Task, TaskOptions, TaskOrigin};
use crate::types::{Direction, Event, TaskId};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, RwLock, broadcast};
use tokio_util::sync::CancellationToken;

/// Shared scheduling state
#[derive(Clone)]
pub(crate) struct SchedulingState {
    /// Live tasks
    pub(crate) registry: TaskRegistry,
    /// Download and upload lanes
    pub(crate) admission: AdmissionController,
    /// Sibling cohorts sharing a destination folder
    pub(crate) same_dir: SameDirectoryGroups,
    /// Live admission limits (shared with the admission controller)
    pub(crate) limits: Arc<RwLock<Limits>>,
    /// Cancels the aggregate status refresher; `None` while idle
    pub(crate) status_refresher: Arc<Mutex<Option<CancellationToken>>>,
    /// Whether new tasks are accepted (cleared during shutdown)
    pub(crate) accepting_new: Arc<AtomicBool>,
}

/// Drives every task from submission to a terminal state (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct TaskCoordinator {
    /// Static configuration
    pub(crate) config: Arc<Config>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: broadcast::Sender<Event>,
    /// External interfaces
    pub(crate) collaborators: Collaborators,
    /// Registries and lanes
    pub(crate) scheduling: SchedulingState,
}

impl TaskCoordinator {
    /// Create a new coordinator
    ///
    /// Creates the download directory. When the incomplete-task notifier is
    /// enabled and no store was supplied, the SQLite store at
    /// `persistence.database_path` is opened and used.
    pub async fn new(config: Config, mut collaborators: Collaborators) -> Result<Self> {
        tokio::fs::create_dir_all(&config.download.download_dir)
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create download directory '{}': {}",
                        config.download.download_dir.display(),
                        e
                    ),
                ))
            })?;

        if config.persistence.incomplete_task_notifier && collaborators.store.is_none() {
            let db = Database::new(&config.persistence.database_path).await?;
            collaborators.store = Some(Arc::new(db) as Arc<dyn IncompleteTaskStore>);
        }

        let (event_tx, _rx) = broadcast::channel(1000);
        let limits = Arc::new(RwLock::new(config.limits()));

        tracing::info!(
            download_dir = %config.download.download_dir.display(),
            max_concurrent_downloads = config.download.max_concurrent_downloads,
            max_concurrent_uploads = config.download.max_concurrent_uploads,
            backends = ?collaborators.backends,
            "Task coordinator initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            event_tx,
            collaborators,
            scheduling: SchedulingState {
                registry: TaskRegistry::new(),
                admission: AdmissionController::new(limits.clone()),
                same_dir: SameDirectoryGroups::new(),
                limits,
                status_refresher: Arc::new(Mutex::new(None)),
                accepting_new: Arc::new(AtomicBool::new(true)),
            },
        })
    }

    /// Subscribe to lifecycle events
    ///
    /// Each subscriber receives all events independently. A subscriber that
    /// falls more than 1000 events behind gets `RecvError::Lagged`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use mirror_leech::{Collaborators, Config, TaskCoordinator};
    /// # async fn example(collaborators: Collaborators) -> mirror_leech::Result<()> {
    /// let coordinator = TaskCoordinator::new(Config::default(), collaborators).await?;
    /// let mut events = coordinator.subscribe();
    /// tokio::spawn(async move {
    ///     while let Ok(event) = events.recv().await {
    ///         tracing::info!(?event, "task event");
    ///     }
    /// });
    /// # Ok(())
    /// # }
    /// ```
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Emit an event to all subscribers; dropped when nobody listens
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    /// Accept a new task and start its lifecycle in the background
    ///
    /// The task is registered before this returns, so it is visible to
    /// [`TaskCoordinator::task`] and [`TaskCoordinator::cancel_task`]
    /// immediately. Multi-task batches join their same-directory group here.
    pub async fn submit(
        &self,
        source: Source,
        options: TaskOptions,
        origin: TaskOrigin,
    ) -> Result<TaskId> {
        if !self.scheduling.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let mid = self.scheduling.registry.next_id();
        let task = Arc::new(Task::new(
            mid,
            source,
            options,
            origin,
            &self.config.download.download_dir,
        ));

        if task.options.multi > 0 {
            match task.options.folder_name.as_deref() {
                Some(folder) => {
                    self.scheduling
                        .same_dir
                        .join(folder, mid, task.options.multi)
                        .await
                }
                None => self.scheduling.same_dir.shrink_all().await,
            }
        }

        let count = self.scheduling.registry.insert(task.clone()).await;
        let name = task.progress().await.name.clone();
        tracing::info!(task_id = mid.0, name = %name, live_tasks = count, "Task submitted");
        self.emit_event(Event::Created { id: mid, name });

        self.send_status_message(&task).await;
        self.ensure_status_refresher().await;

        let coordinator = self.clone();
        tokio::spawn(async move {
            coordinator.run(task).await;
        });

        Ok(mid)
    }

    /// Live task by ID
    pub async fn task(&self, mid: TaskId) -> Option<Arc<Task>> {
        self.scheduling.registry.get(mid).await
    }

    /// Number of live tasks
    pub async fn task_count(&self) -> usize {
        self.scheduling.registry.len().await
    }

    /// Run one task to a terminal state
    ///
    /// Every stage returns `Ok(None)` when the task was cancelled or torn down
    /// elsewhere; errors are routed to the matching teardown entry point.
    async fn run(&self, task: Arc<Task>) {
        let tore_down = match self.drive(&task).await {
            Ok(Some(())) => self.on_task_complete(&task).await,
            Ok(None) => self.on_cancelled(&task).await,
            Err(e) => self.on_error(&task, e).await,
        };
        if !tore_down {
            // Teardown ran elsewhere, possibly before this lifecycle took a
            // slot; whatever it holds now is released here.
            for direction in [Direction::Download, Direction::Upload] {
                self.release_slot(direction, task.mid).await;
            }
        }
    }

    async fn drive(&self, task: &Arc<Task>) -> Result<Option<()>> {
        let Some(kind) = self.resolve(task).await? else {
            return Ok(None);
        };
        let Some(downloaded) = self.download(task, kind).await? else {
            return Ok(None);
        };
        self.post_process(task, downloaded).await
    }
}
