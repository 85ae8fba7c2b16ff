//! Utility functions for sizes, durations, auth headers and storage cleanup

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::path::Path;

const SIZE_UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];

/// Human-readable byte count (`1.50GB`)
///
/// # Examples
///
/// ```
/// use mirror_leech::utils::readable_file_size;
///
/// assert_eq!(readable_file_size(0), "0B");
/// assert_eq!(readable_file_size(1536), "1.50KB");
/// ```
pub fn readable_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0B".to_string();
    }
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{}B", bytes)
    } else {
        format!("{:.2}{}", size, SIZE_UNITS[unit])
    }
}

/// Human-readable duration (`1h2m3s`); fractional seconds are truncated
pub fn readable_time(seconds: f64) -> String {
    let mut remaining = if seconds.is_finite() && seconds > 0.0 {
        seconds as u64
    } else {
        0
    };
    let mut out = String::new();
    for (period, suffix) in [(86_400, "d"), (3_600, "h"), (60, "m")] {
        if remaining >= period {
            out.push_str(&format!("{}{}", remaining / period, suffix));
            remaining %= period;
        }
    }
    if remaining > 0 || out.is_empty() {
        out.push_str(&format!("{}s", remaining));
    }
    out
}

/// `authorization: Basic …` header line for generic URI downloads
pub fn basic_auth_header(username: &str, password: &str) -> String {
    let token = STANDARD.encode(format!("{}:{}", username, password));
    format!("authorization: Basic {}", token)
}

/// Replace the `.partNN` marker of `name` with another (1-based, two-digit) part number
pub fn neighbour_part_name(name: &str, current: u32, neighbour: u32) -> String {
    name.replace(
        &format!(".part{:02}", current),
        &format!(".part{:02}", neighbour),
    )
}

/// Escape text for HTML-formatted chat messages
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            c => out.push(c),
        }
    }
    out
}

/// Remove a file or directory tree; missing paths are not an error
pub async fn clean_target(path: &Path) -> std::io::Result<()> {
    let metadata = match tokio::fs::symlink_metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    let result = if metadata.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    };
    match result {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Best-effort [`clean_target`] that logs instead of failing
pub async fn clean_download(path: &Path) {
    if let Err(e) = clean_target(path).await {
        tracing::warn!(path = %path.display(), error = %e, "failed to clean working storage");
    } else {
        tracing::debug!(path = %path.display(), "cleaned working storage");
    }
}
