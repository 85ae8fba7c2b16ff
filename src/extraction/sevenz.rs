use crate::error::ProcessingError;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::io_failure;

/// Archive extractor for 7z files
pub struct SevenZipExtractor;

impl SevenZipExtractor {
    /// Extract a 7z archive into `dest_path`, returning the extracted files
    pub fn try_extract(
        archive_path: &Path,
        dest_path: &Path,
    ) -> Result<Vec<PathBuf>, ProcessingError> {
        debug!(?archive_path, ?dest_path, "attempting 7z extraction");

        std::fs::create_dir_all(dest_path)
            .map_err(|e| io_failure(archive_path, "failed to create destination", e))?;

        sevenz_rust::decompress_file(archive_path, dest_path)
            .map_err(|e| io_failure(archive_path, "failed to extract 7z archive", e))?;

        Self::validate_extracted_paths(archive_path, dest_path)?;
        let mut files = Vec::new();
        Self::collect_files(archive_path, dest_path, &mut files)?;
        Ok(files)
    }

    /// Every extracted entry must stay inside the destination directory
    fn validate_extracted_paths(archive_path: &Path, dest_path: &Path) -> Result<(), ProcessingError> {
        let canonical_dest = dest_path
            .canonicalize()
            .map_err(|e| io_failure(archive_path, "failed to canonicalize destination", e))?;

        let mut pending = vec![dest_path.to_path_buf()];
        while let Some(dir) = pending.pop() {
            let entries = std::fs::read_dir(&dir)
                .map_err(|e| io_failure(archive_path, "failed to read directory", e))?;
            for entry in entries {
                let path = entry
                    .map_err(|e| io_failure(archive_path, "failed to read entry", e))?
                    .path();
                let canonical = path
                    .canonicalize()
                    .map_err(|e| io_failure(archive_path, "failed to canonicalize entry", e))?;
                if !canonical.starts_with(&canonical_dest) {
                    return Err(ProcessingError::ExtractionFailed {
                        archive: archive_path.to_path_buf(),
                        reason: format!(
                            "path traversal detected: {:?} is outside destination",
                            canonical
                        ),
                    });
                }
                if path.is_dir() {
                    pending.push(path);
                }
            }
        }
        Ok(())
    }

    fn collect_files(
        archive_path: &Path,
        dir: &Path,
        files: &mut Vec<PathBuf>,
    ) -> Result<(), ProcessingError> {
        let entries = std::fs::read_dir(dir)
            .map_err(|e| io_failure(archive_path, "failed to read directory", e))?;
        for entry in entries {
            let path = entry
                .map_err(|e| io_failure(archive_path, "failed to read entry", e))?
                .path();
            if path.is_dir() {
                Self::collect_files(archive_path, &path, files)?;
            } else {
                files.push(path);
            }
        }
        Ok(())
    }
}
