//! Per-event background processing
//!
//! Everything after the webhook acknowledgment happens here: policy
//! filters, attachment resolution, download, classification, optional
//! transcoding, and delivery. The task owns one scratch directory for
//! its whole lifetime and releases it on every exit path, including a
//! configured task deadline.

use crate::fetch::FileNaming;
use crate::media::{self, MediaClass};
use crate::relay::{Relay, filters};
use crate::resolver;
use crate::scratch;
use crate::types::{AttachmentKind, Event, InboundEvent, ResolvedMedia};
use std::path::Path;
use std::sync::Arc;

const FETCH_FAILURE_NOTICE: &str = "The attachment could not be downloaded.";

pub(crate) async fn run(relay: Arc<Relay>, event: InboundEvent) {
    let event_id = event.event_id.clone();

    let scratch_dir = match scratch::create_scratch_dir(&relay.config.relay.scratch_dir).await {
        Ok(dir) => dir,
        Err(e) => {
            tracing::error!(
                event_id = ?event_id,
                error = %e,
                "Could not create scratch directory, dropping event"
            );
            return;
        }
    };

    match relay.config.relay.task_deadline {
        Some(deadline) => {
            if tokio::time::timeout(deadline, process(&relay, &event, &scratch_dir))
                .await
                .is_err()
            {
                tracing::error!(
                    event_id = ?event_id,
                    deadline_secs = deadline.as_secs(),
                    "Background task exceeded its deadline and was abandoned"
                );
            }
        }
        None => process(&relay, &event, &scratch_dir).await,
    }

    // Scratch space is released no matter how processing ended
    scratch::remove_scratch(&scratch_dir).await;

    relay.emit(Event::TaskDone {
        event_id,
        completed_at: chrono::Utc::now().timestamp(),
    });
}

async fn process(relay: &Relay, event: &InboundEvent, scratch_dir: &Path) {
    let event_id = event.event_id.clone();

    // The session may have dropped between ACK and now
    if !relay.transport.is_connected().await {
        tracing::warn!(event_id = ?event_id, "Transport lost connection before send");
        return;
    }

    if let Some(reason) = filters::post_ack(event, &relay.config.relay) {
        tracing::info!(event_id = ?event_id, reason, "Event filtered after acknowledgment");
        relay.emit(Event::Filtered {
            event_id,
            reason: reason.to_string(),
        });
        return;
    }

    // post_ack guarantees the phone is present
    let Some(destination) = event.source_phone.clone() else {
        return;
    };
    let destinations = vec![destination];

    let caption = crate::deliver::signed_caption(
        event.sender_display_name.as_deref(),
        event.body.as_deref(),
    );

    // Only the first attachment of a multi-attachment event is
    // processed; the provider sends one caption per message and every
    // further attachment would repeat it
    let Some(att) = event.attachments.first() else {
        if caption.is_empty() {
            tracing::debug!(event_id = ?event_id, "Nothing to deliver, ending task");
            return;
        }
        for destination in &destinations {
            deliver_text(relay, &event_id, destination, &caption).await;
        }
        return;
    };

    if event.attachments.len() > 1 {
        tracing::warn!(
            event_id = ?event_id,
            total = event.attachments.len(),
            "Multiple attachments received, only the first is relayed"
        );
    }

    let target = match resolver::resolve(&att.locator, &relay.config.provider) {
        Ok(target) => target,
        Err(e) => {
            tracing::warn!(event_id = ?event_id, error = %e, "Attachment locator not resolvable");
            notify_failure(relay, event, &destinations).await;
            return;
        }
    };

    relay.emit(Event::FetchStarted {
        event_id: event_id.clone(),
        url: target.url.clone(),
    });

    let is_video = att.kind == AttachmentKind::Video;
    let naming = FileNaming {
        declared: att.filename.as_deref(),
        fallback: match att.kind {
            AttachmentKind::Audio => "Voice.ogg",
            AttachmentKind::Video => "video.mp4",
            _ => "file",
        },
    };
    let mut media = match relay
        .fetcher
        .fetch(&target, &naming, is_video, scratch_dir)
        .await
    {
        Ok(media) => media,
        Err(e) => {
            tracing::error!(
                event_id = ?event_id,
                url = %target.url,
                error = %e,
                "Attachment download failed"
            );
            relay.emit(Event::FetchFailed {
                event_id: event_id.clone(),
                error: e.to_string(),
            });
            notify_failure(relay, event, &destinations).await;
            return;
        }
    };

    relay.emit(Event::FetchComplete {
        event_id: event_id.clone(),
        filename: media.filename.clone(),
        byte_size: media.byte_size,
    });

    let class = media::classify(att, &media.content_type, &media.filename);
    if class == MediaClass::Video && !media::is_compatible_mp4(&media.filename, &media.content_type)
    {
        normalize_video(relay, &event_id, &mut media).await;
    }

    let results = relay
        .deliverer
        .deliver_media_to_each(&destinations, &media, class, &caption)
        .await;
    for (destination, result) in results {
        match result {
            Ok(strategy) => {
                tracing::info!(
                    event_id = ?event_id,
                    destination = %destination,
                    strategy = strategy.label(),
                    filename = %media.filename,
                    "Attachment delivered"
                );
                relay.emit(Event::Delivered {
                    event_id: event_id.clone(),
                    destination,
                    strategy,
                });
            }
            Err(e) => {
                tracing::error!(
                    event_id = ?event_id,
                    destination = %destination,
                    error = %e,
                    "Delivery failed on every strategy"
                );
                relay.emit(Event::DeliveryFailed {
                    event_id: event_id.clone(),
                    destination,
                    error: e.to_string(),
                });
            }
        }
    }
}

/// Rewrite a video in place, degrading to the original file when the
/// transcoder is unavailable or fails.
async fn normalize_video(relay: &Relay, event_id: &Option<String>, media: &mut ResolvedMedia) {
    let Some(transcoder) = &relay.transcoder else {
        tracing::warn!(
            event_id = ?event_id,
            filename = %media.filename,
            "No ffmpeg available, sending video as fetched"
        );
        return;
    };

    relay.emit(Event::TranscodeStarted {
        event_id: event_id.clone(),
        filename: media.filename.clone(),
    });

    match transcoder.normalize(&media.scratch_path).await {
        Ok(output) => {
            media.scratch_path = output;
            if !media.filename.to_ascii_lowercase().ends_with(".mp4") {
                media.filename.push_str(".mp4");
            }
            media.content_type = "video/mp4".to_string();
        }
        Err(e) => {
            tracing::error!(
                event_id = ?event_id,
                filename = %media.filename,
                error = %e,
                "Transcode failed, sending the original file"
            );
            relay.emit(Event::TranscodeFailed {
                event_id: event_id.clone(),
                error: e.to_string(),
            });
        }
    }
}

/// Best-effort signed notice that the attachment was lost.
async fn notify_failure(relay: &Relay, event: &InboundEvent, destinations: &[String]) {
    let notice = crate::deliver::signed_caption(
        event.sender_display_name.as_deref(),
        Some(FETCH_FAILURE_NOTICE),
    );
    for destination in destinations {
        deliver_text(relay, &event.event_id, destination, &notice).await;
    }
}

async fn deliver_text(
    relay: &Relay,
    event_id: &Option<String>,
    destination: &str,
    text: &str,
) {
    match relay.deliverer.deliver_text(destination, text).await {
        Ok(strategy) => {
            relay.emit(Event::Delivered {
                event_id: event_id.clone(),
                destination: destination.to_string(),
                strategy,
            });
        }
        Err(e) => {
            tracing::error!(
                event_id = ?event_id,
                destination = %destination,
                error = %e,
                "Text delivery failed"
            );
            relay.emit(Event::DeliveryFailed {
                event_id: event_id.clone(),
                destination: destination.to_string(),
                error: e.to_string(),
            });
        }
    }
}
