//! Media handling: classification and video normalization

pub mod classify;
pub mod transcode;

pub use classify::{MediaClass, classify, is_compatible_mp4};
pub use transcode::Transcoder;

/// Best-known MIME type for an inline `data:` URL.
///
/// Prefers the server-reported content type, then a handful of
/// extension mappings for the media kinds the pipeline handles, then
/// the octet-stream catch-all.
pub fn guess_mime(filename: &str, content_type: &str) -> String {
    if !content_type.is_empty() && content_type != "application/octet-stream" {
        return content_type.to_string();
    }
    let lower = filename.to_ascii_lowercase();
    let mapped = match lower.rsplit('.').next() {
        Some("mp4") | Some("m4v") => "video/mp4",
        Some("webm") => "video/webm",
        Some("mov") => "video/quicktime",
        Some("3gp") => "video/3gpp",
        Some("mkv") => "video/x-matroska",
        Some("avi") => "video/x-msvideo",
        Some("ogg") | Some("oga") => "audio/ogg",
        Some("mp3") => "audio/mpeg",
        Some("m4a") => "audio/mp4",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    };
    mapped.to_string()
}
