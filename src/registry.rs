//! Live task registry: the authoritative set of active tasks.

use crate::task::Task;
use crate::types::TaskId;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

/// Mapping task ID → task, plus the monotonic ID allocator
#[derive(Clone, Debug)]
pub struct TaskRegistry {
    tasks: Arc<Mutex<HashMap<TaskId, Arc<Task>>>>,
    next_id: Arc<AtomicU64>,
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRegistry {
    /// Create an empty registry; IDs start at 1
    pub fn new() -> Self {
        Self {
            tasks: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Allocate the next task ID
    pub fn next_id(&self) -> TaskId {
        TaskId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Register a task; returns the registry size after insertion
    pub async fn insert(&self, task: Arc<Task>) -> usize {
        let mut tasks = self.tasks.lock().await;
        tasks.insert(task.mid, task);
        tasks.len()
    }

    /// Remove a task under the registry lock
    ///
    /// Returns `None` when the task was already gone, otherwise the number of
    /// tasks still registered.
    pub async fn remove(&self, id: TaskId) -> Option<usize> {
        let mut tasks = self.tasks.lock().await;
        tasks.remove(&id).map(|_| tasks.len())
    }

    /// Look up a live task
    pub async fn get(&self, id: TaskId) -> Option<Arc<Task>> {
        self.tasks.lock().await.get(&id).cloned()
    }

    /// Whether a task is live
    pub async fn contains(&self, id: TaskId) -> bool {
        self.tasks.lock().await.contains_key(&id)
    }

    /// Number of live tasks
    pub async fn len(&self) -> usize {
        self.tasks.lock().await.len()
    }

    /// Whether no task is live
    pub async fn is_empty(&self) -> bool {
        self.tasks.lock().await.is_empty()
    }

    /// All live tasks, ordered by ID
    pub async fn all(&self) -> Vec<Arc<Task>> {
        let tasks = self.tasks.lock().await;
        let mut all: Vec<_> = tasks.values().cloned().collect();
        all.sort_by_key(|t| t.mid);
        all
    }
}
