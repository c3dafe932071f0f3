//! Media classification
//!
//! Decides how a fetched attachment should be delivered: audio goes out
//! as a voice note, video as an MP4 (transcoding first if needed),
//! everything else as a generic file.

use crate::types::{AttachmentKind, AttachmentRef};

/// Filename extensions treated as video containers
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "m4v", "mov", "3gp", "webm", "mkv", "avi"];

/// How an attachment will be handed to the transport
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaClass {
    /// Delivered as a voice note
    Audio,
    /// Delivered as MP4, transcoding first when needed
    Video,
    /// Delivered as a generic file
    Other,
}

/// Classify a fetched attachment.
///
/// Video is detected from any of: the provider-declared type, the
/// resolved content type, or a known container extension. Audio is
/// trusted only from the provider-declared type; sniffing audio from
/// content types misfires on voice-note containers served as
/// `application/octet-stream`.
pub fn classify(att: &AttachmentRef, content_type: &str, filename: &str) -> MediaClass {
    if att.kind == AttachmentKind::Audio {
        return MediaClass::Audio;
    }

    if att.kind == AttachmentKind::Video
        || content_type.to_ascii_lowercase().starts_with("video/")
        || has_video_extension(filename)
        || att
            .filename
            .as_deref()
            .is_some_and(has_video_extension)
    {
        return MediaClass::Video;
    }

    MediaClass::Other
}

fn has_video_extension(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    VIDEO_EXTENSIONS
        .iter()
        .any(|ext| lower.ends_with(&format!(".{ext}")))
}

/// Whether a video file is already a transport-compatible MP4.
///
/// Matches on a `video/mp4` content type or an `.mp4` extension; only
/// files failing both get transcoded.
pub fn is_compatible_mp4(filename: &str, content_type: &str) -> bool {
    let ct = content_type.to_ascii_lowercase();
    ct == "video/mp4"
        || ct.starts_with("video/mp4;")
        || filename.to_ascii_lowercase().ends_with(".mp4")
}
