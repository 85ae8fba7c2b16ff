//! Post-download pipeline: extraction, part enumeration and media filtering.

use crate::error::{Error, ProcessingError, Result};
use crate::extraction::is_archive;
use crate::media::{find_videos, order_by_size_desc};
use crate::task::Task;
use crate::types::{Event, State};
use std::path::{Path, PathBuf};

use super::TaskCoordinator;

impl TaskCoordinator {
    /// Process the downloaded path and hand every part to the uploader
    ///
    /// Archives are extracted when requested. A directory is split into one
    /// part per video file, largest first; a single file is one part.
    pub(crate) async fn post_process(&self, task: &Task, downloaded: PathBuf) -> Result<Option<()>> {
        let mut up_path = downloaded;

        if task.options.extract && is_archive(&up_path) {
            task.set_state(State::Extracting).await;
            self.emit_event(Event::Extracting { id: task.mid });
            self.update_status(task).await;

            let folder = task
                .progress()
                .await
                .gid
                .clone()
                .unwrap_or_else(|| task.mid.to_string());
            let destination = task.dir.join(folder);
            tracing::info!(
                task_id = task.mid.0,
                archive = %up_path.display(),
                destination = %destination.display(),
                "Extracting archive"
            );
            up_path = self
                .collaborators
                .extractor
                .extract(&up_path, &destination)
                .await?;
            if task.is_cancelled() {
                return Ok(None);
            }
        }

        let is_dir = tokio::fs::metadata(&up_path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);

        if !is_dir {
            return self.process_part(task, &up_path).await;
        }

        let mut videos = find_videos(&up_path).await.map_err(Error::Io)?;
        if videos.is_empty() {
            return Err(ProcessingError::NoVideoFiles { path: up_path }.into());
        }
        order_by_size_desc(&mut videos);

        let total = u32::try_from(videos.len())
            .map_err(|_| ProcessingError::Parts(format!("too many parts: {}", videos.len())))?;
        task.progress().await.parts.begin(total)?;
        tracing::info!(task_id = task.mid.0, parts = total, "Processing multi-part output");

        for (index, (path, size)) in videos.iter().enumerate() {
            {
                let mut progress = task.progress().await;
                if index > 0 {
                    progress.parts.advance();
                }
                let file_name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                progress.name = file_name.clone();
                progress.original_name = file_name;
            }
            tracing::debug!(task_id = task.mid.0, part = index + 1, path = %path.display(), size, "part");

            if self.process_part(task, path).await?.is_none() {
                return Ok(None);
            }
        }

        Ok(Some(()))
    }

    /// Filter one part (leech only) and upload it
    async fn process_part(&self, task: &Task, path: &Path) -> Result<Option<()>> {
        let parts = task.progress().await.parts;
        task.set_state(State::PostProcessing).await;
        self.emit_event(Event::Processing {
            id: task.mid,
            part: parts.current(),
            total: parts.total(),
        });

        let upload_path = if task.options.is_leech && !task.options.compress {
            self.update_status(task).await;
            let snapshot = task.snapshot().await;
            let filtered = self
                .collaborators
                .media_filter
                .process(path, &snapshot)
                .await?;
            if task.is_cancelled() {
                return Ok(None);
            }

            let Some(filtered) = filtered else {
                tracing::info!(task_id = task.mid.0, path = %path.display(), "Media filter skipped part");
                return Ok(Some(()));
            };

            let mut progress = task.progress().await;
            if let Some(info) = &filtered.media_info {
                progress.streams_kept = info.streams_kept.clone();
                progress.streams_removed = info.streams_removed.clone();
            }
            progress.media_info = filtered.media_info;
            filtered.path
        } else {
            path.to_path_buf()
        };

        self.upload(task, upload_path).await
    }
}
