//! Completion notices sent to the originator, one per delivered unit.

use crate::collaborators::SentRecord;
use crate::media::{MediaInfo, StreamInfo, StreamKind};
use crate::task::Parts;
use crate::types::Button;
use crate::utils::{neighbour_part_name, readable_file_size, readable_time};
use chrono::NaiveDate;

/// Everything a notice needs from the task
#[derive(Clone, Debug)]
pub struct NoticeContext<'a> {
    /// Current working name of the task
    pub name: &'a str,
    /// Name of the file the part came from
    pub original_name: &'a str,
    /// Total task size in bytes
    pub total_size: u64,
    /// Part counter at the time of delivery
    pub parts: Parts,
    /// Mention of the requesting user
    pub tag: &'a str,
    /// Metadata of the filtered part, if the media filter ran
    pub media_info: Option<&'a MediaInfo>,
    /// Chat delivery (leech) or cloud delivery (mirror)
    pub is_leech: bool,
    /// Date stamped on detailed notices
    pub date: NaiveDate,
}

/// Rendered notice text plus an optional link button
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletionNotice {
    /// Message body (HTML-ish markup understood by the chat platform)
    pub text: String,
    /// Link button
    pub button: Option<Button>,
}

impl CompletionNotice {
    /// Render the notice for one sent record
    ///
    /// A detailed notice is produced when media metadata is present,
    /// otherwise a generic "task completed" notice.
    pub fn render(ctx: &NoticeContext<'_>, record: &SentRecord) -> Self {
        let text = match ctx.media_info {
            Some(info) => detailed(ctx, info, record),
            None => generic(ctx.tag, &record.name, record.size),
        };
        let label = if ctx.is_leech {
            "Download Link"
        } else {
            "Cloud Link"
        };
        let button = record.link.as_ref().map(|link| Button::new(label, link.clone()));
        Self { text, button }
    }
}

fn generic(tag: &str, name: &str, size: u64) -> String {
    format!(
        "🎉 <b>Task Completed by {tag}</b>\n\n<b>Name:</b> <code>{name}</code>\n<b>Size:</b> {}\n\n<b>cc:</b> {tag}",
        readable_file_size(size)
    )
}

fn detailed(ctx: &NoticeContext<'_>, info: &MediaInfo, record: &SentRecord) -> String {
    let current = ctx.parts.current();
    let total = ctx.parts.total();
    let mut msg = String::new();

    msg.push_str(&format!(
        "🎬 <code>{}</code>\n📁 Part {current} of {total} | 📂 Total: {}",
        ctx.name,
        readable_file_size(ctx.total_size),
    ));
    if let Some(duration) = info.duration_secs() {
        msg.push_str(&format!(" | ⏱️ {}", readable_time(duration)));
    }

    if let Some(video) = info.first_kept(StreamKind::Video) {
        msg.push_str(&format!(
            "\n📊 {}p • {} • ",
            display_or_na(video.height),
            video.codec_name.as_deref().unwrap_or("N/A"),
        ));
    }
    if let Some(audio) = info.first_kept(StreamKind::Audio) {
        // "Split" is a fixed label, not a pipeline stage.
        msg.push_str(&format!(
            "{}A • {} • Split",
            info.streams_kept.len(),
            audio.language(),
        ));
    }

    msg.push_str(&format!("\n📡 Source: {}", ctx.tag));
    msg.push_str(&format!("\n\n📽️ <code>{}</code>", ctx.original_name));
    msg.push_str(&format!(
        "\n📏 {} | 📅 {}",
        readable_file_size(record.size),
        ctx.date.format("%d %b %Y"),
    ));

    msg.push_str("\n\n**Streams Kept:**");
    if let Some(video) = info
        .streams_kept
        .iter()
        .find(|s| s.kind == StreamKind::Video && !s.is_attached_picture())
    {
        msg.push_str(&format!("\n🎥 {}", format_video(video)));
    }
    for audio in info.streams_kept.iter().filter(|s| s.kind == StreamKind::Audio) {
        msg.push_str(&format!("\n🔊 {}", format_audio(audio)));
    }

    if !info.streams_removed.is_empty() {
        msg.push_str("\n\n**Streams Removed:**");
        for audio in info
            .streams_removed
            .iter()
            .filter(|s| s.kind == StreamKind::Audio)
        {
            msg.push_str(&format!("\n🚫 {}", format_audio(audio)));
        }
        for subtitle in info
            .streams_removed
            .iter()
            .filter(|s| s.kind == StreamKind::Subtitle)
        {
            msg.push_str(&format!("\n🚫 {}", format_subtitle(subtitle)));
        }
    }

    if current > 1 {
        msg.push_str(&format!(
            "\n⬅️ Prev Part: <code>{}</code>",
            neighbour_part_name(&record.name, current, current - 1),
        ));
    }
    if current < total {
        msg.push_str(&format!(
            "\n➡️ Next Part: <code>{}</code>",
            neighbour_part_name(&record.name, current, current + 1),
        ));
    }

    msg.push_str(&format!("\n\n✅ Upload Complete (Part {current}/{total})"));
    if ctx.parts.is_last() {
        msg.push_str(&format!(
            "\n✨ All parts uploaded successfully!\n🔗 Files are now available in your chat.\n⚡️ {}",
            ctx.tag,
        ));
    }
    msg
}

fn display_or_na<T: std::fmt::Display>(value: Option<T>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| "N/A".to_string())
}

fn index_of(stream: &StreamInfo) -> String {
    display_or_na(stream.index)
}

fn format_video(stream: &StreamInfo) -> String {
    let mut details = vec![stream.codec_name.clone().unwrap_or_else(|| "N/A".to_string())];
    if let Some(profile) = &stream.profile {
        details.push(profile.clone());
    }
    details.push(format!("{}p", display_or_na(stream.height)));
    if let Some(fps) = stream.fps() {
        details.push(format!("{}fps", fps));
    }
    format!("<code>{}</code>", details.join(", "))
}

fn format_audio(stream: &StreamInfo) -> String {
    let bitrate = stream
        .bitrate_kbps()
        .map(|kbps| format!("{}kbps", kbps))
        .unwrap_or_else(|| "N/A".to_string());
    format!(
        "<code>{}. {} {}, {}, {}</code>",
        index_of(stream),
        stream.codec_name.as_deref().unwrap_or("N/A"),
        stream.language(),
        stream.channel_layout.as_deref().unwrap_or("N/A"),
        bitrate
    )
}

fn format_subtitle(stream: &StreamInfo) -> String {
    let default = if stream.is_default() { "Default" } else { "" };
    format!(
        "<code>{}. {} {}, {}</code>",
        index_of(stream),
        stream.codec_name.as_deref().unwrap_or("N/A"),
        stream.language(),
        default
    )
}
