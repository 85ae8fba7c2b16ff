use crate::collaborators::ArchiveExtractor;
use crate::error::ProcessingError;
use crate::extraction::*;
use std::path::Path;
use tempfile::TempDir;

/// Create a valid ZIP archive containing the given files
fn create_zip_archive(archive_path: &Path, files: &[(&str, &[u8])]) {
    let file = std::fs::File::create(archive_path).unwrap();
    let mut writer = ::zip::ZipWriter::new(file);
    let options =
        ::zip::write::FileOptions::default().compression_method(::zip::CompressionMethod::Stored);
    for (name, content) in files {
        writer.start_file(*name, options).unwrap();
        std::io::Write::write_all(&mut writer, content).unwrap();
    }
    writer.finish().unwrap();
}

#[test]
fn test_detect_archive_type() {
    assert_eq!(detect_archive_type(Path::new("a.ZIP")), Some(ArchiveType::Zip));
    assert_eq!(detect_archive_type(Path::new("a.7z")), Some(ArchiveType::SevenZip));
    assert_eq!(detect_archive_type(Path::new("a.r00")), Some(ArchiveType::Rar));
    assert_eq!(detect_archive_type(Path::new("a.tar.gz")), Some(ArchiveType::Tar));
    assert_eq!(detect_archive_type(Path::new("a.mkv")), None);
    assert!(is_archive(Path::new("/dl/1/Show.zip")));
    assert!(!is_archive(Path::new("/dl/1/Show")));
}

#[tokio::test]
async fn test_zip_extraction_returns_destination() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("Show.zip");
    create_zip_archive(
        &archive,
        &[
            ("Show/E01.mkv", b"episode one"),
            ("Show/E02.mkv", b"episode two"),
        ],
    );
    let dest = temp.path().join("gid-1");

    let out = DefaultExtractor.extract(&archive, &dest).await.unwrap();

    assert_eq!(out, dest);
    assert_eq!(
        std::fs::read(dest.join("Show/E01.mkv")).unwrap(),
        b"episode one"
    );
    assert!(dest.join("Show/E02.mkv").exists());
}

#[tokio::test]
async fn test_corrupt_zip_fails_with_extraction_error() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("broken.zip");
    std::fs::write(&archive, b"definitely not a zip").unwrap();

    let err = DefaultExtractor
        .extract(&archive, &temp.path().join("out"))
        .await
        .unwrap_err();

    assert!(matches!(err, ProcessingError::ExtractionFailed { .. }));
}

#[tokio::test]
async fn test_unsupported_format_is_rejected() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("movie.rar");
    std::fs::write(&archive, b"Rar!").unwrap();

    let err = DefaultExtractor
        .extract(&archive, &temp.path().join("out"))
        .await
        .unwrap_err();

    match err {
        ProcessingError::ExtractionFailed { reason, .. } => {
            assert!(reason.contains("not supported"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_zip_skips_unsafe_entry_paths() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("evil.zip");
    create_zip_archive(&archive, &[("../escape.txt", b"x"), ("ok.txt", b"y")]);
    let dest = temp.path().join("out");

    let files = ZipExtractor::try_extract(&archive, &dest).unwrap();

    assert_eq!(files, vec![dest.join("ok.txt")]);
    assert!(!temp.path().join("escape.txt").exists());
}
