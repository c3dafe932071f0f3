//! Outbound transport seam
//!
//! The relay never manages messaging sessions itself; it hands content
//! to an already-authenticated transport client behind this trait. The
//! trait exists so the pipeline can be exercised end to end against an
//! in-memory transport in tests.

use async_trait::async_trait;
use std::path::Path;

/// How an attachment is handed to [`Transport::send_file`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FilePayload {
    /// Filesystem path to the file in scratch storage
    Path(std::path::PathBuf),
    /// Base64 `data:` URL carrying the whole file inline
    DataUrl(String),
}

impl FilePayload {
    /// Wrap a scratch path as a direct-path payload
    pub fn path(p: &Path) -> Self {
        FilePayload::Path(p.to_path_buf())
    }
}

/// An authenticated, session-bound messaging client.
///
/// All calls are addressed to a destination identifier in the
/// transport's own format. Errors are opaque strings; the transport
/// does not classify its failures.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send plain text
    async fn send_text(&self, destination: &str, text: &str) -> Result<(), String>;

    /// Send an audio file as a voice note
    async fn send_voice_note(
        &self,
        destination: &str,
        path: &Path,
        filename: &str,
        caption: &str,
    ) -> Result<(), String>;

    /// Send a file, addressed by path or by inline data
    async fn send_file(
        &self,
        destination: &str,
        payload: &FilePayload,
        filename: &str,
        caption: &str,
    ) -> Result<(), String>;

    /// Whether the underlying session is currently usable
    async fn is_connected(&self) -> bool;
}
