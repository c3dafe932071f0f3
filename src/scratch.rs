//! Scratch storage for in-flight downloads
//!
//! Every fetch gets its own uniquely named directory under the
//! configured scratch root, so concurrent tasks never collide and
//! cleanup is a single recursive remove. Scratch space is released on
//! every task exit path, success or failure.

use rand::Rng;
use rand::distributions::Alphanumeric;
use std::path::{Path, PathBuf};

/// Create a fresh scratch directory for one download.
///
/// The directory name carries a random suffix; uniqueness across
/// concurrent tasks comes from the suffix, not from locking.
pub async fn create_scratch_dir(root: &Path) -> std::io::Result<PathBuf> {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(char::from)
        .collect();
    let dir = root.join(format!("relay-{suffix}"));
    tokio::fs::create_dir_all(&dir).await?;
    Ok(dir)
}

/// Remove a scratch directory and everything in it.
///
/// Failures are logged, not propagated; cleanup must never turn a
/// completed task into a failed one.
pub async fn remove_scratch(dir: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(dir = %dir.display(), error = %e, "Failed to remove scratch directory");
        }
    }
}

/// Pick the filename to store a download under.
///
/// Preference order: the caller-supplied name from the event payload,
/// then the `Content-Disposition` header, then the last URL path
/// segment, then the caller's fallback name.
pub fn choose_filename(
    declared: Option<&str>,
    content_disposition: Option<&str>,
    url: &str,
    fallback: &str,
) -> String {
    if let Some(name) = declared.map(str::trim).filter(|s| !s.is_empty()) {
        return name.to_string();
    }

    if let Some(value) = content_disposition {
        for part in value.split(';') {
            let part = part.trim();
            if let Some(name) = part.strip_prefix("filename=") {
                let name = name.trim_matches('"');
                if !name.is_empty() {
                    return name.to_string();
                }
            }
        }
    }

    if let Ok(parsed) = url::Url::parse(url)
        && let Some(mut segments) = parsed.path_segments()
        && let Some(last) = segments.next_back()
        && !last.is_empty()
    {
        return last.to_string();
    }

    fallback.to_string()
}
