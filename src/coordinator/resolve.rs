//! Link resolution: probe the content type and unwrap landing pages.

use crate::collaborators::Resolved;
use crate::error::Result;
use crate::links::{SourceKind, classify, is_landing_page, needs_probe};
use crate::task::{Source, Task};
use crate::types::State;

use super::TaskCoordinator;

impl TaskCoordinator {
    /// Turn the task's source into a dispatchable [`SourceKind`]
    ///
    /// Links that are not a recognized transfer scheme are probed; a missing
    /// or text/html content type means a landing page that the resolver has
    /// to unwrap first. Resolution failures surface as
    /// [`Error::Resolution`](crate::Error::Resolution).
    pub(crate) async fn resolve(&self, task: &Task) -> Result<Option<SourceKind>> {
        if !needs_probe(&task.source, &task.options) {
            return Ok(Some(classify(&task.source, &task.options, Vec::new())));
        }
        let Source::Link { link } = &task.source else {
            return Ok(Some(classify(&task.source, &task.options, Vec::new())));
        };

        task.set_state(State::Resolving).await;
        self.update_status(task).await;

        let content_type = self.collaborators.prober.content_type(link).await;
        if task.is_cancelled() {
            return Ok(None);
        }
        if !is_landing_page(content_type.as_deref()) {
            tracing::debug!(task_id = task.mid.0, content_type = ?content_type, "link is a direct resource");
            return Ok(Some(classify(&task.source, &task.options, Vec::new())));
        }

        let resolved = match self.collaborators.resolver.resolve(link).await {
            Ok(resolved) => resolved,
            Err(e) => {
                if e.should_log() {
                    tracing::info!(task_id = task.mid.0, error = %e, "link resolution failed");
                }
                return Err(e.into());
            }
        };
        if task.is_cancelled() {
            return Ok(None);
        }

        let (source, headers) = match resolved {
            Resolved::Url(url) => (Source::link(url), Vec::new()),
            Resolved::WithHeaders(url, headers) => (Source::link(url), headers),
            Resolved::Direct(descriptor) => {
                if task.options.name.is_none() && !descriptor.title.is_empty() {
                    let mut progress = task.progress().await;
                    progress.name = descriptor.title.clone();
                    progress.original_name = descriptor.title.clone();
                }
                (Source::Direct(descriptor), Vec::new())
            }
        };
        tracing::info!(task_id = task.mid.0, "Generated link");

        Ok(Some(classify(&source, &task.options, headers)))
    }
}
