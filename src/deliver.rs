//! Delivery strategies
//!
//! The transport accepts files either by filesystem path or as inline
//! base64 data, and some of its code paths reject one while accepting
//! the other. Delivery therefore runs a strategy chain: the cheap
//! direct-path send first, then the memory-heavy inline fallback. Every
//! strategy is wrapped in the same retry policy, and failures are
//! scoped to one destination at a time.

use crate::config::RetryConfig;
use crate::error::DeliveryError;
use crate::media::{self, MediaClass};
use crate::retry::with_retry_always;
use crate::transport::{FilePayload, Transport};
use crate::types::{DeliveryStrategy, ResolvedMedia};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::sync::Arc;

/// Compose the outbound caption.
///
/// A known sender name becomes a `*<name>:*` prefix on its own line; an
/// empty body leaves just the signed prefix. With no name the body
/// passes through untouched.
pub fn signed_caption(sender_name: Option<&str>, body: Option<&str>) -> String {
    let body = body.unwrap_or("").trim();
    match sender_name {
        Some(name) if !name.trim().is_empty() => {
            let prefix = format!("*{}:*", name.trim());
            if body.is_empty() {
                prefix
            } else {
                format!("{prefix}\n{body}")
            }
        }
        _ => body.to_string(),
    }
}

/// Drives delivery of one piece of content to one destination.
pub struct DeliveryStrategist {
    transport: Arc<dyn Transport>,
    retry: RetryConfig,
}

impl DeliveryStrategist {
    /// Wrap a transport with the standard per-strategy retry policy
    pub fn new(transport: Arc<dyn Transport>, retry: RetryConfig) -> Self {
        Self { transport, retry }
    }

    /// Send plain text, under the standard retry policy.
    pub async fn deliver_text(
        &self,
        destination: &str,
        text: &str,
    ) -> Result<DeliveryStrategy, DeliveryError> {
        with_retry_always(&self.retry, || async {
            self.transport.send_text(destination, text).await
        })
        .await
        .map_err(|reason| DeliveryError::SendFailed {
            destination: destination.to_string(),
            strategy: DeliveryStrategy::Text.label().to_string(),
            reason,
        })?;
        Ok(DeliveryStrategy::Text)
    }

    /// Send a fetched attachment, choosing the call and strategy chain
    /// by media class.
    ///
    /// Audio goes out as a voice note. Everything else tries the
    /// direct-path file send and, if that fails for any reason, falls
    /// back to re-sending the file as an inline base64 `data:` URL.
    pub async fn deliver_media(
        &self,
        destination: &str,
        media: &ResolvedMedia,
        class: MediaClass,
        caption: &str,
    ) -> Result<DeliveryStrategy, DeliveryError> {
        if class == MediaClass::Audio {
            with_retry_always(&self.retry, || async {
                self.transport
                    .send_voice_note(destination, &media.scratch_path, &media.filename, caption)
                    .await
            })
            .await
            .map_err(|reason| DeliveryError::SendFailed {
                destination: destination.to_string(),
                strategy: DeliveryStrategy::VoiceNote.label().to_string(),
                reason,
            })?;
            return Ok(DeliveryStrategy::VoiceNote);
        }

        let direct = FilePayload::path(&media.scratch_path);
        let direct_err = match with_retry_always(&self.retry, || async {
            self.transport
                .send_file(destination, &direct, &media.filename, caption)
                .await
        })
        .await
        {
            Ok(()) => return Ok(DeliveryStrategy::DirectPath),
            Err(reason) => reason,
        };

        tracing::warn!(
            destination = %destination,
            filename = %media.filename,
            error = %direct_err,
            "Direct-path send failed, falling back to inline data"
        );

        let inline = self
            .inline_payload(media, class)
            .await
            .map_err(|e| DeliveryError::SendFailed {
                destination: destination.to_string(),
                strategy: DeliveryStrategy::InlineData.label().to_string(),
                reason: format!("could not read file for inline fallback: {e}"),
            })?;

        with_retry_always(&self.retry, || async {
            self.transport
                .send_file(destination, &inline, &media.filename, caption)
                .await
        })
        .await
        .map_err(|reason| DeliveryError::AllStrategiesFailed {
            destination: destination.to_string(),
            last_error: reason,
        })?;

        Ok(DeliveryStrategy::InlineData)
    }

    /// Deliver one piece of content to every destination in turn.
    ///
    /// Destinations are independent: each gets the full strategy chain,
    /// and one destination's failure never stops the rest. Results are
    /// returned per destination for the caller to report.
    pub async fn deliver_media_to_each(
        &self,
        destinations: &[String],
        media: &ResolvedMedia,
        class: MediaClass,
        caption: &str,
    ) -> Vec<(String, Result<DeliveryStrategy, DeliveryError>)> {
        let mut results = Vec::with_capacity(destinations.len());
        for destination in destinations {
            results.push((
                destination.clone(),
                self.deliver_media(destination, media, class, caption).await,
            ));
        }
        results
    }

    /// Read the whole file and wrap it as a base64 `data:` URL.
    ///
    /// Strictly the fallback path: this buffers the entire file in
    /// memory, which the streaming fetch deliberately avoided.
    async fn inline_payload(
        &self,
        media: &ResolvedMedia,
        class: MediaClass,
    ) -> std::io::Result<FilePayload> {
        let bytes = tokio::fs::read(&media.scratch_path).await?;
        let mut mime = media::guess_mime(&media.filename, &media.content_type);
        if class == MediaClass::Video && !mime.starts_with("video/") {
            // The transport refuses video payloads with a non-video type
            mime = "video/mp4".to_string();
        }
        let encoded = STANDARD.encode(&bytes);
        Ok(FilePayload::DataUrl(format!("data:{mime};base64,{encoded}")))
    }
}
