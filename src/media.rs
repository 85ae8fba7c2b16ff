//! Media metadata returned by the stream filter, and video file discovery.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Kind of a media stream
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    /// Video track (including attached cover pictures)
    Video,
    /// Audio track
    Audio,
    /// Subtitle track
    Subtitle,
    /// Anything else (data, attachments)
    #[default]
    #[serde(other)]
    Other,
}

/// One stream as described by the prober
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    /// Stream index inside the container
    #[serde(default)]
    pub index: Option<u32>,
    /// Stream kind
    #[serde(rename = "codec_type", default)]
    pub kind: StreamKind,
    /// Codec name, e.g. "h264", "aac"
    #[serde(default)]
    pub codec_name: Option<String>,
    /// Codec profile
    #[serde(default)]
    pub profile: Option<String>,
    /// Frame height for video streams
    #[serde(default)]
    pub height: Option<u32>,
    /// Frame rate as a fraction string, e.g. "24000/1001"
    #[serde(default)]
    pub r_frame_rate: Option<String>,
    /// Channel layout for audio streams
    #[serde(default)]
    pub channel_layout: Option<String>,
    /// Bit rate in bits per second, as reported
    #[serde(default)]
    pub bit_rate: Option<String>,
    /// Container tags (language, BPS, ...)
    #[serde(default)]
    pub tags: HashMap<String, String>,
    /// Disposition flags (default, attached_pic, ...)
    #[serde(default)]
    pub disposition: HashMap<String, u8>,
}

impl StreamInfo {
    /// Upper-cased language tag, or "N/A"
    pub fn language(&self) -> String {
        self.tags
            .get("language")
            .map(|l| l.to_uppercase())
            .unwrap_or_else(|| "N/A".to_string())
    }

    /// Bit rate in kbps, from the stream or its tags
    pub fn bitrate_kbps(&self) -> Option<u64> {
        self.bit_rate
            .as_deref()
            .or_else(|| self.tags.get("BPS").map(String::as_str))
            .or_else(|| self.tags.get("bitrate").map(String::as_str))
            .filter(|s| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|s| s.parse::<u64>().ok())
            .map(|bps| bps / 1000)
    }

    /// Whether this is an embedded cover picture rather than a real video track
    pub fn is_attached_picture(&self) -> bool {
        self.disposition.get("attached_pic").copied().unwrap_or(0) != 0
    }

    /// Whether this stream is flagged as the default track
    pub fn is_default(&self) -> bool {
        self.disposition.get("default").copied().unwrap_or(0) != 0
    }

    /// Integer part of the frame rate
    pub fn fps(&self) -> Option<&str> {
        self.r_frame_rate
            .as_deref()
            .and_then(|r| r.split('/').next())
    }
}

/// Container-level metadata
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FormatInfo {
    /// Duration in seconds, as reported
    #[serde(default)]
    pub duration: Option<String>,
}

/// Metadata produced by the media-stream filter for one part
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Container metadata
    #[serde(default)]
    pub format: FormatInfo,
    /// Streams retained in the output
    #[serde(default)]
    pub streams_kept: Vec<StreamInfo>,
    /// Streams dropped from the output
    #[serde(default)]
    pub streams_removed: Vec<StreamInfo>,
}

impl MediaInfo {
    /// Duration in seconds, if parseable
    pub fn duration_secs(&self) -> Option<f64> {
        self.format
            .duration
            .as_deref()
            .and_then(|d| d.parse::<f64>().ok())
    }

    /// First kept stream of a kind
    pub fn first_kept(&self, kind: StreamKind) -> Option<&StreamInfo> {
        self.streams_kept.iter().find(|s| s.kind == kind)
    }
}

const VIDEO_EXTENSIONS: &[&str] = &[
    "mkv", "mp4", "avi", "mov", "wmv", "flv", "webm", "m4v", "ts", "m2ts", "mpg", "mpeg", "3gp",
    "ogv", "vob",
];

/// Whether a path looks like a video file (by extension, case-insensitive)
pub fn is_video(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()))
}

/// Recursively collect video files under `root` with their sizes, in discovery order.
pub async fn find_videos(root: &Path) -> std::io::Result<Vec<(PathBuf, u64)>> {
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        let mut children = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            children.push(entry.path());
        }
        children.sort();

        let mut subdirs = Vec::new();
        for path in children {
            let meta = tokio::fs::metadata(&path).await?;
            if meta.is_dir() {
                subdirs.push(path);
            } else if is_video(&path) {
                found.push((path, meta.len()));
            }
        }
        // Reverse so the stack pops subdirectories in name order.
        pending.extend(subdirs.into_iter().rev());
    }

    Ok(found)
}

/// Order videos by size, largest first; equal sizes keep discovery order.
pub fn order_by_size_desc(videos: &mut [(PathBuf, u64)]) {
    videos.sort_by(|a, b| b.1.cmp(&a.1));
}
