//! Archive extraction
//!
//! The lifecycle unpacks a downloaded archive when the task asks for it and
//! the download is a recognized archive. ZIP and 7z are handled in-process;
//! other formats are recognized but rejected so the task fails with a clear
//! message instead of uploading the raw archive.

mod sevenz;
mod zip;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use sevenz::SevenZipExtractor;
pub use zip::ZipExtractor;

use crate::collaborators::ArchiveExtractor;
use crate::error::ProcessingError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::task::spawn_blocking;
use tracing::info;

/// Archive formats recognized by extension
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArchiveType {
    /// ZIP
    Zip,
    /// 7-Zip
    SevenZip,
    /// RAR (recognized, not extracted in-process)
    Rar,
    /// Tarball, optionally compressed (recognized, not extracted in-process)
    Tar,
}

/// Detect archive type by file extension
pub fn detect_archive_type(path: &Path) -> Option<ArchiveType> {
    let name = path.file_name()?.to_str()?.to_lowercase();
    if name.ends_with(".tar.gz") || name.ends_with(".tar.bz2") || name.ends_with(".tar.xz") {
        return Some(ArchiveType::Tar);
    }
    let ext = path.extension()?.to_str()?.to_lowercase();

    match ext.as_str() {
        "zip" => Some(ArchiveType::Zip),
        "7z" => Some(ArchiveType::SevenZip),
        "rar" | "r00" => Some(ArchiveType::Rar),
        "tar" | "tgz" | "tbz2" | "txz" => Some(ArchiveType::Tar),
        _ => None,
    }
}

/// Whether a downloaded path is an archive worth extracting
pub fn is_archive(path: &Path) -> bool {
    detect_archive_type(path).is_some()
}

/// Default [`ArchiveExtractor`]: dispatches on the archive type and runs the
/// blocking extraction off the async runtime
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultExtractor;

#[async_trait]
impl ArchiveExtractor for DefaultExtractor {
    async fn extract(
        &self,
        archive: &Path,
        destination: &Path,
    ) -> Result<PathBuf, ProcessingError> {
        let archive_type =
            detect_archive_type(archive).ok_or_else(|| ProcessingError::ExtractionFailed {
                archive: archive.to_path_buf(),
                reason: "unknown archive type".to_string(),
            })?;

        let try_extract: fn(&Path, &Path) -> Result<Vec<PathBuf>, ProcessingError> =
            match archive_type {
                ArchiveType::Zip => ZipExtractor::try_extract,
                ArchiveType::SevenZip => SevenZipExtractor::try_extract,
                ArchiveType::Rar | ArchiveType::Tar => {
                    return Err(ProcessingError::ExtractionFailed {
                        archive: archive.to_path_buf(),
                        reason: format!("{:?} archives are not supported", archive_type),
                    });
                }
            };

        let archive_owned = archive.to_path_buf();
        let destination_owned = destination.to_path_buf();
        let files = spawn_blocking(move || try_extract(&archive_owned, &destination_owned))
            .await
            .map_err(|e| ProcessingError::ExtractionFailed {
                archive: archive.to_path_buf(),
                reason: format!("extraction task panicked: {}", e),
            })??;

        info!(
            ?archive,
            ?destination,
            extracted_count = files.len(),
            "archive extracted"
        );
        Ok(destination.to_path_buf())
    }
}

pub(crate) fn io_failure(archive: &Path, what: &str, e: impl std::fmt::Display) -> ProcessingError {
    ProcessingError::ExtractionFailed {
        archive: archive.to_path_buf(),
        reason: format!("{}: {}", what, e),
    }
}
