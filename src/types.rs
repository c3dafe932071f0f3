//! Core types and events

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use utoipa::ToSchema;

/// What kind of conversation event a webhook describes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A new message was created
    Created,
    /// A message changed status (read, delivered, ...)
    StatusChanged,
    /// Anything else the provider emits
    Other,
}

/// Message direction relative to the conversation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Message from the contact into the conversation
    Incoming,
    /// Message from an agent, to be relayed out
    Outgoing,
}

/// Attachment kind as declared by the provider
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    /// Audio clip, delivered as a voice note
    Audio,
    /// Video, normalized to MP4 if necessary
    Video,
    /// Still image
    Image,
    /// Document (PDF, spreadsheet, ...)
    Document,
    /// Anything the provider did not label
    Unknown,
}

impl AttachmentKind {
    /// Parse the provider's `file_type` field
    pub fn from_provider(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "audio" => AttachmentKind::Audio,
            "video" => AttachmentKind::Video,
            "image" => AttachmentKind::Image,
            "document" | "file" => AttachmentKind::Document,
            _ => AttachmentKind::Unknown,
        }
    }
}

/// One attachment referenced by an inbound event
///
/// Owned by the [`InboundEvent`]; read-only after parsing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttachmentRef {
    /// Provider-declared kind
    pub kind: AttachmentKind,
    /// Original filename, when the provider supplied one
    pub filename: Option<String>,
    /// Content type declared by the provider, when present
    pub declared_content_type: Option<String>,
    /// Raw locator: absolute URL, relative path, or inline-data token
    pub locator: String,
}

/// One parsed webhook notification
///
/// Immutable once parsed; its lifetime is the webhook call plus the
/// background task it spawns.
#[derive(Clone, Debug)]
pub struct InboundEvent {
    /// Provider event identity, when present (dedup key)
    pub event_id: Option<String>,
    /// Event kind
    pub kind: EventKind,
    /// Message direction
    pub direction: Direction,
    /// Whether this is a private/internal note
    pub private: bool,
    /// Contact phone number with any leading `+` stripped
    pub source_phone: Option<String>,
    /// Message body text
    pub body: Option<String>,
    /// Attachments, in provider order
    pub attachments: Vec<AttachmentRef>,
    /// Display name of the sending agent, when resolvable
    pub sender_display_name: Option<String>,
}

/// A fetched attachment sitting in scratch storage
///
/// Exclusively owned by the background task that created it. The task
/// must remove the scratch directory on every exit path; see
/// [`crate::scratch::remove_scratch`].
#[derive(Debug)]
pub struct ResolvedMedia {
    /// Path of the downloaded file inside its scratch directory
    pub scratch_path: PathBuf,
    /// Filename to present to the transport
    pub filename: String,
    /// Content type reported by the server (may be empty)
    pub content_type: String,
    /// Downloaded size in bytes
    pub byte_size: u64,
}

/// One specific technique for invoking the transport's send capability
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStrategy {
    /// Hand the transport a filesystem path
    DirectPath,
    /// Hand the transport a base64 `data:` URL
    InlineData,
    /// Plain text send (no attachment)
    Text,
    /// Audio sent as a voice note
    VoiceNote,
}

impl DeliveryStrategy {
    /// Short label used in logs and error messages
    pub fn label(&self) -> &'static str {
        match self {
            DeliveryStrategy::DirectPath => "direct-path",
            DeliveryStrategy::InlineData => "inline-data",
            DeliveryStrategy::Text => "text",
            DeliveryStrategy::VoiceNote => "voice-note",
        }
    }
}

/// Synchronous outcome of one webhook call
///
/// This is the only thing the webhook caller ever learns; delivery
/// results are reported through [`Event`]s and logs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookDisposition {
    /// Event accepted; a background task was spawned
    Queued {
        /// Event identity echoed back to the caller
        message_id: Option<String>,
    },
    /// Event identity seen within the dedup window
    Duplicate {
        /// The duplicated event identity
        message_id: String,
    },
    /// Event rejected by a policy filter before any work began
    Ignored {
        /// Machine-readable reason (e.g., "client-not-connected")
        reason: &'static str,
    },
}

impl WebhookDisposition {
    /// Status string for the webhook response envelope
    pub fn status(&self) -> &'static str {
        match self {
            WebhookDisposition::Queued { .. } => "queued",
            WebhookDisposition::Duplicate { .. } => "duplicate",
            WebhookDisposition::Ignored { .. } => "ignored",
        }
    }
}

/// Pipeline events emitted on the broadcast channel
///
/// Subscribers receive every stage transition; this is the relay's only
/// outcome reporting besides logs.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Event accepted and queued for background processing
    Queued {
        /// Event identity, when present
        event_id: Option<String>,
    },

    /// Event rejected as a duplicate within the dedup window
    Duplicate {
        /// The duplicated event identity
        event_id: String,
    },

    /// Event dropped by a policy filter
    Filtered {
        /// Event identity, when present
        event_id: Option<String>,
        /// Which filter matched
        reason: String,
    },

    /// Attachment download started
    FetchStarted {
        /// Event identity, when present
        event_id: Option<String>,
        /// Resolved download URL
        url: String,
    },

    /// Attachment download finished
    FetchComplete {
        /// Event identity, when present
        event_id: Option<String>,
        /// Filename stored in scratch
        filename: String,
        /// Downloaded size in bytes
        byte_size: u64,
    },

    /// Attachment download failed after retries
    FetchFailed {
        /// Event identity, when present
        event_id: Option<String>,
        /// Failure description
        error: String,
    },

    /// Video normalization started
    TranscodeStarted {
        /// Event identity, when present
        event_id: Option<String>,
        /// Input filename
        filename: String,
    },

    /// Video normalization failed; the original file is sent instead
    TranscodeFailed {
        /// Event identity, when present
        event_id: Option<String>,
        /// Failure description
        error: String,
    },

    /// One destination received the content
    Delivered {
        /// Event identity, when present
        event_id: Option<String>,
        /// Destination that was delivered to
        destination: String,
        /// Strategy that succeeded
        strategy: DeliveryStrategy,
    },

    /// One destination could not be delivered to by any strategy
    DeliveryFailed {
        /// Event identity, when present
        event_id: Option<String>,
        /// Destination that failed
        destination: String,
        /// Last strategy error
        error: String,
    },

    /// Background task reached its terminal state; scratch space released
    TaskDone {
        /// Event identity, when present
        event_id: Option<String>,
        /// Unix timestamp of completion
        completed_at: i64,
    },
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachment_kind_parses_provider_labels() {
        assert_eq!(AttachmentKind::from_provider("audio"), AttachmentKind::Audio);
        assert_eq!(AttachmentKind::from_provider("VIDEO"), AttachmentKind::Video);
        assert_eq!(AttachmentKind::from_provider("image"), AttachmentKind::Image);
        assert_eq!(AttachmentKind::from_provider("file"), AttachmentKind::Document);
        assert_eq!(
            AttachmentKind::from_provider("sticker"),
            AttachmentKind::Unknown
        );
    }

    #[test]
    fn disposition_status_strings() {
        assert_eq!(
            WebhookDisposition::Queued { message_id: None }.status(),
            "queued"
        );
        assert_eq!(
            WebhookDisposition::Duplicate {
                message_id: "1".into()
            }
            .status(),
            "duplicate"
        );
        assert_eq!(
            WebhookDisposition::Ignored {
                reason: "client-not-connected"
            }
            .status(),
            "ignored"
        );
    }

    #[test]
    fn event_serializes_with_type_tag() {
        let event = Event::Duplicate {
            event_id: "m1".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "duplicate");
        assert_eq!(json["event_id"], "m1");
    }
}
