use crate::error::ProcessingError;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::io_failure;

/// Archive extractor for ZIP files
pub struct ZipExtractor;

impl ZipExtractor {
    /// Extract a single ZIP entry to disk, creating directories as needed
    fn extract_entry(
        mut file: ::zip::read::ZipFile<'_>,
        dest_path: &Path,
        archive_path: &Path,
    ) -> Result<Option<PathBuf>, ProcessingError> {
        let file_path = match file.enclosed_name() {
            Some(path) => dest_path.join(path),
            None => {
                warn!(?archive_path, "skipping entry with unsafe path");
                return Ok(None);
            }
        };

        if file.is_dir() {
            std::fs::create_dir_all(&file_path)
                .map_err(|e| io_failure(archive_path, "failed to create directory", e))?;
            return Ok(None);
        }

        if let Some(parent) = file_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| io_failure(archive_path, "failed to create parent directories", e))?;
        }
        let mut outfile = std::fs::File::create(&file_path)
            .map_err(|e| io_failure(archive_path, "failed to create output file", e))?;
        std::io::copy(&mut file, &mut outfile)
            .map_err(|e| io_failure(archive_path, "failed to extract file", e))?;

        Ok(Some(file_path))
    }

    /// Extract a ZIP archive into `dest_path`, returning the extracted files
    pub fn try_extract(
        archive_path: &Path,
        dest_path: &Path,
    ) -> Result<Vec<PathBuf>, ProcessingError> {
        debug!(?archive_path, ?dest_path, "attempting ZIP extraction");

        std::fs::create_dir_all(dest_path)
            .map_err(|e| io_failure(archive_path, "failed to create destination", e))?;

        let file = std::fs::File::open(archive_path)
            .map_err(|e| io_failure(archive_path, "failed to open ZIP archive", e))?;
        let mut archive = ::zip::ZipArchive::new(file)
            .map_err(|e| io_failure(archive_path, "failed to read ZIP archive", e))?;

        let mut extracted_files = Vec::new();
        for i in 0..archive.len() {
            let entry = archive
                .by_index(i)
                .map_err(|e| io_failure(archive_path, "failed to read ZIP entry", e))?;
            if let Some(path) = Self::extract_entry(entry, dest_path, archive_path)? {
                extracted_files.push(path);
            }
        }

        Ok(extracted_files)
    }
}
