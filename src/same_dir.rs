//! Same-directory grouping of sibling tasks.
//!
//! Tasks submitted together with a shared folder name download into one
//! destination. The folder is only finalized once every declared sibling has
//! landed, so the aggregator tracks, per folder, how many members are still
//! expected and which have joined. Pure bookkeeping: no I/O happens here.

use crate::types::TaskId;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Default, Clone)]
struct Group {
    total: u32,
    tasks: HashSet<TaskId>,
}

impl Group {
    /// Shrink the expected total by one, never below the members already joined.
    fn shrink(&mut self) {
        if self.total as usize > self.tasks.len() {
            self.total -= 1;
        }
    }
}

/// Result of a member leaving its group
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LeaveOutcome {
    /// Members still pending in the group
    pub remaining: usize,
    /// Whether the group was deleted because no members are expected any more
    pub finalized: bool,
}

/// Folder name → sibling cohort
#[derive(Clone, Debug, Default)]
pub struct SameDirectoryGroups {
    groups: Arc<Mutex<HashMap<String, Group>>>,
}

impl SameDirectoryGroups {
    /// Create an empty aggregator
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `id` as a member of `folder`
    ///
    /// When the folder already exists the task simply joins it. A new folder is
    /// created with `expected_total` members. In both cases every *other* group
    /// gives up one expected member, since the task belongs to this cohort only.
    pub async fn join(&self, folder: &str, id: TaskId, expected_total: u32) {
        let mut groups = self.groups.lock().await;

        match groups.get_mut(folder) {
            Some(group) => {
                group.tasks.insert(id);
                if group.total < group.tasks.len() as u32 {
                    group.total = group.tasks.len() as u32;
                }
            }
            None => {
                groups.insert(
                    folder.to_string(),
                    Group {
                        total: expected_total.max(1),
                        tasks: HashSet::from([id]),
                    },
                );
            }
        }

        for (name, group) in groups.iter_mut() {
            if name != folder {
                group.shrink();
            }
        }
        groups.retain(|_, group| group.total > 0);

        tracing::debug!(task_id = id.0, folder, groups = groups.len(), "joined same-directory group");
    }

    /// A multi-task batch without a folder gives up one expected member in every group
    pub async fn shrink_all(&self) {
        let mut groups = self.groups.lock().await;
        for group in groups.values_mut() {
            group.shrink();
        }
        groups.retain(|_, group| group.total > 0);
    }

    /// Remove `id` from `folder`, shrinking the expected total
    ///
    /// Safe to call for tasks that never joined; returns `None` in that case.
    pub async fn leave(&self, folder: &str, id: TaskId) -> Option<LeaveOutcome> {
        let mut groups = self.groups.lock().await;
        let group = groups.get_mut(folder)?;
        if !group.tasks.remove(&id) {
            return None;
        }
        group.total = group.total.saturating_sub(1);
        let remaining = group.tasks.len();
        let finalized = group.total == 0;
        if finalized {
            groups.remove(folder);
        }

        tracing::debug!(task_id = id.0, folder, remaining, finalized, "left same-directory group");
        Some(LeaveOutcome {
            remaining,
            finalized,
        })
    }

    /// Members that joined and have not left yet
    pub async fn pending(&self, folder: &str) -> usize {
        self.groups
            .lock()
            .await
            .get(folder)
            .map(|g| g.tasks.len())
            .unwrap_or(0)
    }

    /// Expected member count, if the group exists
    pub async fn total(&self, folder: &str) -> Option<u32> {
        self.groups.lock().await.get(folder).map(|g| g.total)
    }

    /// Whether a member is registered in the folder
    pub async fn contains(&self, folder: &str, id: TaskId) -> bool {
        self.groups
            .lock()
            .await
            .get(folder)
            .is_some_and(|g| g.tasks.contains(&id))
    }

    /// Number of live groups
    pub async fn len(&self) -> usize {
        self.groups.lock().await.len()
    }

    /// Whether no group is live
    pub async fn is_empty(&self) -> bool {
        self.groups.lock().await.is_empty()
    }
}
