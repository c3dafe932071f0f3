//! Event relay pipeline
//!
//! Owns the full path from webhook body to transport send: parse,
//! filter, dedupe, acknowledge, then hand the event to a fire-and-forget
//! background task for the media work. The webhook caller only ever
//! learns the acknowledgment; outcomes are reported through the
//! broadcast [`Event`] channel and logs.

pub mod filters;
mod task;

use crate::config::Config;
use crate::dedup::Deduplicator;
use crate::deliver::DeliveryStrategist;
use crate::error::Result;
use crate::fetch::Fetcher;
use crate::media::Transcoder;
use crate::payload;
use crate::transport::Transport;
use crate::types::{Event, WebhookDisposition};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Capacity of the broadcast event channel; slow subscribers lag rather
/// than block the pipeline
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// The relay pipeline.
///
/// Shared behind an [`Arc`]; every accepted webhook spawns one
/// background task holding a clone.
pub struct Relay {
    pub(crate) config: Config,
    pub(crate) fetcher: Fetcher,
    pub(crate) transcoder: Option<Transcoder>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) deliverer: DeliveryStrategist,
    dedup: Deduplicator,
    event_tx: broadcast::Sender<Event>,
}

impl Relay {
    /// Assemble the pipeline from configuration and a transport client.
    pub fn new(config: Config, transport: Arc<dyn Transport>) -> Result<Arc<Self>> {
        let fetcher = Fetcher::new(config.fetch.clone())?;
        let transcoder = Transcoder::from_config(&config.transcode);
        if transcoder.is_none() {
            tracing::warn!("ffmpeg not found, videos will be sent without normalization");
        }
        let deliverer = DeliveryStrategist::new(transport.clone(), config.delivery.retry.clone());
        let dedup = Deduplicator::new(config.relay.dedup_ttl);
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Arc::new(Self {
            config,
            fetcher,
            transcoder,
            transport,
            deliverer,
            dedup,
            event_tx,
        }))
    }

    /// The configuration this pipeline was built with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Subscribe to pipeline events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    pub(crate) fn emit(&self, event: Event) {
        // Send fails only when no subscriber exists, which is fine
        let _ = self.event_tx.send(event);
    }

    /// Handle one webhook body.
    ///
    /// Runs the synchronous gates (connection, policy filters, dedup)
    /// and returns the disposition for the HTTP response. An accepted
    /// event has its background task spawned before this returns, but
    /// no media work happens on the caller's clock.
    pub async fn handle_webhook(self: &Arc<Self>, body: &serde_json::Value) -> WebhookDisposition {
        let event = payload::parse_event(body);
        let event_id = event.event_id.clone();

        if !self.transport.is_connected().await {
            tracing::info!(event_id = ?event_id, "Webhook ignored, transport not connected");
            return WebhookDisposition::Ignored {
                reason: "client-not-connected",
            };
        }

        if let Some(reason) = filters::pre_ack(&event, &self.config.relay) {
            tracing::debug!(event_id = ?event_id, reason, "Webhook ignored by policy");
            return WebhookDisposition::Ignored { reason };
        }

        if let Some(id) = event_id.as_deref()
            && !self.dedup.accept(id)
        {
            tracing::info!(event_id = %id, "Duplicate event rejected");
            self.emit(Event::Duplicate {
                event_id: id.to_string(),
            });
            return WebhookDisposition::Duplicate {
                message_id: id.to_string(),
            };
        }

        self.emit(Event::Queued {
            event_id: event_id.clone(),
        });
        tracing::info!(
            event_id = ?event_id,
            attachments = event.attachments.len(),
            "Event queued for background processing"
        );

        let relay = self.clone();
        tokio::spawn(task::run(relay, event));

        WebhookDisposition::Queued {
            message_id: event_id,
        }
    }
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("transcoder", &self.transcoder.is_some())
            .finish_non_exhaustive()
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RetryConfig, TranscodeConfig};
    use crate::transport::FilePayload;
    use crate::transport::mock::{MockTransport, SentCall};
    use serde_json::{Value, json};
    use std::path::Path;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(scratch: &Path, base_url: Option<String>) -> Config {
        let mut config = Config::default();
        config.provider.base_url = base_url;
        config.fetch.retry = RetryConfig {
            max_attempts: 2,
            base_delay: Duration::from_millis(5),
        };
        config.delivery.retry = RetryConfig {
            max_attempts: 2,
            base_delay: Duration::from_millis(5),
        };
        // No ffmpeg in the test environment
        config.transcode = TranscodeConfig {
            ffmpeg_path: None,
            search_path: false,
            ..TranscodeConfig::default()
        };
        config.relay.scratch_dir = scratch.to_path_buf();
        config
    }

    fn outgoing_event(id: &str, content: &str, attachments: Value) -> Value {
        json!({
            "event": "message_created",
            "message_type": "outgoing",
            "message": {
                "id": id,
                "content": content,
                "sender": { "name": "Alice" },
                "attachments": attachments
            },
            "conversation": {
                "meta": { "sender": { "phone_number": "+5511999990000" } }
            }
        })
    }

    async fn wait_for_task_done(rx: &mut broadcast::Receiver<Event>) {
        collect_until_task_done(rx).await;
    }

    async fn collect_until_task_done(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
        let mut events = Vec::new();
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("timed out waiting for task completion")
                .expect("event channel closed");
            let done = matches!(event, Event::TaskDone { .. });
            events.push(event);
            if done {
                return events;
            }
        }
    }

    /// Install an executable standing in for ffmpeg.
    #[cfg(unix)]
    fn stub_ffmpeg(dir: &Path, script: &str) -> std::path::PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("ffmpeg-stub");
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// Stub that "transcodes" by copying the `-i` argument to the last
    /// argument, the way the real invocation is shaped.
    #[cfg(unix)]
    const COPYING_FFMPEG: &str = "#!/bin/sh\n\
        input=\"\"\n\
        prev=\"\"\n\
        for arg in \"$@\"; do\n\
          if [ \"$prev\" = \"-i\" ]; then input=\"$arg\"; fi\n\
          prev=\"$arg\"\n\
        done\n\
        cp \"$input\" \"$prev\"\n";

    #[cfg(unix)]
    const FAILING_FFMPEG: &str = "#!/bin/sh\nexit 1\n";

    #[tokio::test]
    async fn text_only_event_is_queued_and_delivered() {
        let scratch = tempfile::tempdir().unwrap();
        let transport = Arc::new(MockTransport::new());
        let relay = Relay::new(test_config(scratch.path(), None), transport.clone()).unwrap();
        let mut rx = relay.subscribe();

        let disposition = relay
            .handle_webhook(&outgoing_event("m1", "hello", json!([])))
            .await;
        assert_eq!(
            disposition,
            WebhookDisposition::Queued {
                message_id: Some("m1".to_string())
            }
        );

        wait_for_task_done(&mut rx).await;
        assert_eq!(
            transport.sent(),
            vec![SentCall::Text {
                destination: "5511999990000".to_string(),
                text: "*Alice:*\nhello".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn duplicate_event_is_rejected_within_window() {
        let scratch = tempfile::tempdir().unwrap();
        let transport = Arc::new(MockTransport::new());
        let relay = Relay::new(test_config(scratch.path(), None), transport.clone()).unwrap();
        let mut rx = relay.subscribe();

        let body = outgoing_event("m1", "hello", json!([]));
        let first = relay.handle_webhook(&body).await;
        assert!(matches!(first, WebhookDisposition::Queued { .. }));

        let second = relay.handle_webhook(&body).await;
        assert_eq!(
            second,
            WebhookDisposition::Duplicate {
                message_id: "m1".to_string()
            }
        );

        wait_for_task_done(&mut rx).await;
        assert_eq!(transport.sent().len(), 1, "one delivery for one event");
    }

    #[tokio::test]
    async fn identityless_events_are_never_deduplicated() {
        let scratch = tempfile::tempdir().unwrap();
        let transport = Arc::new(MockTransport::new());
        let relay = Relay::new(test_config(scratch.path(), None), transport.clone()).unwrap();
        let mut rx = relay.subscribe();

        let body = json!({
            "event": "message_created",
            "message_type": "outgoing",
            "message": { "content": "no id here" },
            "conversation": {
                "meta": { "sender": { "phone_number": "+5511999990000" } }
            }
        });

        for _ in 0..2 {
            let disposition = relay.handle_webhook(&body).await;
            assert_eq!(
                disposition,
                WebhookDisposition::Queued { message_id: None }
            );
            wait_for_task_done(&mut rx).await;
        }
        assert_eq!(transport.sent().len(), 2, "both submissions must deliver");
    }

    #[tokio::test]
    async fn mismatched_events_are_ignored_without_work() {
        let scratch = tempfile::tempdir().unwrap();
        let transport = Arc::new(MockTransport::new());
        let relay = Relay::new(test_config(scratch.path(), None), transport.clone()).unwrap();

        let incoming = json!({
            "event": "message_created",
            "message_type": "incoming",
            "message": { "id": "m1", "content": "hi" }
        });
        assert_eq!(
            relay.handle_webhook(&incoming).await,
            WebhookDisposition::Ignored {
                reason: "event-or-type-mismatch"
            }
        );

        let status_change = json!({
            "event": "message_updated",
            "message_type": "outgoing",
            "message": { "id": "m2" }
        });
        assert_eq!(
            relay.handle_webhook(&status_change).await,
            WebhookDisposition::Ignored {
                reason: "event-or-type-mismatch"
            }
        );
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn disconnected_transport_ignores_the_event() {
        let scratch = tempfile::tempdir().unwrap();
        let transport = Arc::new(MockTransport::new());
        transport
            .connected
            .store(false, std::sync::atomic::Ordering::SeqCst);
        let relay = Relay::new(test_config(scratch.path(), None), transport.clone()).unwrap();

        let disposition = relay
            .handle_webhook(&outgoing_event("m1", "hello", json!([])))
            .await;
        assert_eq!(
            disposition,
            WebhookDisposition::Ignored {
                reason: "client-not-connected"
            }
        );
    }

    #[tokio::test]
    async fn acknowledgment_precedes_any_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/blobs/slow.png"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"png".to_vec())
                    .set_delay(Duration::from_millis(300)),
            )
            .mount(&server)
            .await;

        let scratch = tempfile::tempdir().unwrap();
        let transport = Arc::new(MockTransport::new());
        let relay = Relay::new(test_config(scratch.path(), None), transport.clone()).unwrap();
        let mut rx = relay.subscribe();

        let body = outgoing_event(
            "m1",
            "look",
            json!([{
                "file_type": "image",
                "filename": "slow.png",
                "download_url": format!("{}/blobs/slow.png", server.uri())
            }]),
        );

        let started = std::time::Instant::now();
        let disposition = relay.handle_webhook(&body).await;
        let ack_latency = started.elapsed();

        assert!(matches!(disposition, WebhookDisposition::Queued { .. }));
        assert!(
            ack_latency < Duration::from_millis(200),
            "acknowledgment must not wait for the download, took {ack_latency:?}"
        );
        assert!(
            transport.sent().is_empty(),
            "nothing may be delivered before the ACK returns"
        );

        wait_for_task_done(&mut rx).await;
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn attachment_flows_to_transport_and_scratch_is_cleaned() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/blobs/photo.png"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"png bytes".to_vec())
                    .insert_header("content-type", "image/png"),
            )
            .mount(&server)
            .await;

        let scratch = tempfile::tempdir().unwrap();
        let transport = Arc::new(MockTransport::new());
        let relay = Relay::new(test_config(scratch.path(), None), transport.clone()).unwrap();
        let mut rx = relay.subscribe();

        let body = outgoing_event(
            "m1",
            "look at this",
            json!([{
                "file_type": "image",
                "filename": "photo.png",
                "download_url": format!("{}/blobs/photo.png", server.uri())
            }]),
        );
        relay.handle_webhook(&body).await;
        wait_for_task_done(&mut rx).await;

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        match &sent[0] {
            SentCall::File {
                destination,
                payload: FilePayload::Path(_),
                filename,
                caption,
            } => {
                assert_eq!(destination, "5511999990000");
                assert_eq!(filename, "photo.png");
                assert_eq!(caption, "*Alice:*\nlook at this");
            }
            other => panic!("expected a direct-path file send, got {other:?}"),
        }

        let mut entries = tokio::fs::read_dir(scratch.path()).await.unwrap();
        assert!(
            entries.next_entry().await.unwrap().is_none(),
            "scratch root must be empty after the task completes"
        );
    }

    #[tokio::test]
    async fn fetch_failure_sends_a_signed_notice_and_cleans_up() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/blobs/gone.png"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let scratch = tempfile::tempdir().unwrap();
        let transport = Arc::new(MockTransport::new());
        let relay = Relay::new(test_config(scratch.path(), None), transport.clone()).unwrap();
        let mut rx = relay.subscribe();

        let body = outgoing_event(
            "m1",
            "look",
            json!([{
                "file_type": "image",
                "download_url": format!("{}/blobs/gone.png", server.uri())
            }]),
        );
        relay.handle_webhook(&body).await;
        wait_for_task_done(&mut rx).await;

        assert_eq!(
            transport.sent(),
            vec![SentCall::Text {
                destination: "5511999990000".to_string(),
                text: "*Alice:*\nThe attachment could not be downloaded.".to_string(),
            }]
        );

        let mut entries = tokio::fs::read_dir(scratch.path()).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn inline_data_locator_sends_a_notice_without_fetching() {
        let scratch = tempfile::tempdir().unwrap();
        let transport = Arc::new(MockTransport::new());
        let relay = Relay::new(test_config(scratch.path(), None), transport.clone()).unwrap();
        let mut rx = relay.subscribe();

        let body = outgoing_event(
            "m1",
            "",
            json!([{
                "file_type": "image",
                "data_url": "data:image/png;base64,AAAA"
            }]),
        );
        relay.handle_webhook(&body).await;
        wait_for_task_done(&mut rx).await;

        assert_eq!(
            transport.sent(),
            vec![SentCall::Text {
                destination: "5511999990000".to_string(),
                text: "*Alice:*\nThe attachment could not be downloaded.".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn bot_marker_filters_after_acknowledgment() {
        let scratch = tempfile::tempdir().unwrap();
        let transport = Arc::new(MockTransport::new());
        let mut config = test_config(scratch.path(), None);
        config.relay.bot_marker = Some("@arqos".to_string());
        let relay = Relay::new(config, transport.clone()).unwrap();
        let mut rx = relay.subscribe();

        let disposition = relay
            .handle_webhook(&outgoing_event("m1", "@arqos status", json!([])))
            .await;
        // Accepted at the webhook, filtered in the background
        assert!(matches!(disposition, WebhookDisposition::Queued { .. }));

        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap()
                .unwrap();
            match event {
                Event::Filtered { reason, .. } => {
                    assert_eq!(reason, "bot-marker");
                }
                Event::TaskDone { .. } => break,
                _ => {}
            }
        }
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn missing_phone_ends_the_task_silently() {
        let scratch = tempfile::tempdir().unwrap();
        let transport = Arc::new(MockTransport::new());
        let relay = Relay::new(test_config(scratch.path(), None), transport.clone()).unwrap();
        let mut rx = relay.subscribe();

        let body = json!({
            "event": "message_created",
            "message_type": "outgoing",
            "message": { "id": "m1", "content": "hello" }
        });
        let disposition = relay.handle_webhook(&body).await;
        assert!(matches!(disposition, WebhookDisposition::Queued { .. }));

        wait_for_task_done(&mut rx).await;
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn multi_attachment_event_only_relays_the_first() {
        let server = MockServer::start().await;
        for name in ["first.png", "second.png"] {
            Mock::given(method("GET"))
                .and(path(format!("/blobs/{name}")))
                .respond_with(
                    ResponseTemplate::new(200).set_body_bytes(b"png".to_vec()),
                )
                .mount(&server)
                .await;
        }

        let scratch = tempfile::tempdir().unwrap();
        let transport = Arc::new(MockTransport::new());
        let relay = Relay::new(test_config(scratch.path(), None), transport.clone()).unwrap();
        let mut rx = relay.subscribe();

        let body = outgoing_event(
            "m1",
            "two files",
            json!([
                {
                    "file_type": "image",
                    "filename": "first.png",
                    "download_url": format!("{}/blobs/first.png", server.uri())
                },
                {
                    "file_type": "image",
                    "filename": "second.png",
                    "download_url": format!("{}/blobs/second.png", server.uri())
                }
            ]),
        );
        relay.handle_webhook(&body).await;
        wait_for_task_done(&mut rx).await;

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert!(matches!(
            &sent[0],
            SentCall::File { filename, .. } if filename == "first.png"
        ));
    }

    #[tokio::test]
    async fn audio_attachment_is_delivered_as_voice_note() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/blobs/voice"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"ogg bytes".to_vec())
                    .insert_header("content-type", "audio/ogg"),
            )
            .mount(&server)
            .await;

        let scratch = tempfile::tempdir().unwrap();
        let transport = Arc::new(MockTransport::new());
        let relay = Relay::new(test_config(scratch.path(), None), transport.clone()).unwrap();
        let mut rx = relay.subscribe();

        let body = outgoing_event(
            "m1",
            "",
            json!([{
                "file_type": "audio",
                "filename": "Voice.ogg",
                "download_url": format!("{}/blobs/voice", server.uri())
            }]),
        );
        relay.handle_webhook(&body).await;
        wait_for_task_done(&mut rx).await;

        assert!(matches!(
            &transport.sent()[0],
            SentCall::VoiceNote { filename, caption, .. }
                if filename == "Voice.ogg" && caption == "*Alice:*"
        ));
    }

    #[cfg(unix)]
    async fn mount_video(server: &MockServer, name: &str, content_type: &str) -> Value {
        Mock::given(method("GET"))
            .and(path(format!("/blobs/{name}")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"video bytes".to_vec())
                    .insert_header("content-type", content_type),
            )
            .mount(server)
            .await;
        outgoing_event(
            "m1",
            "",
            json!([{
                "file_type": "video",
                "filename": name,
                "download_url": format!("{}/blobs/{name}", server.uri())
            }]),
        )
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn incompatible_video_is_transcoded_before_sending() {
        let server = MockServer::start().await;
        let body = mount_video(&server, "clip.mov", "video/quicktime").await;

        let scratch = tempfile::tempdir().unwrap();
        let transport = Arc::new(MockTransport::new());
        let mut config = test_config(scratch.path(), None);
        config.transcode.ffmpeg_path = Some(stub_ffmpeg(scratch.path(), COPYING_FFMPEG));
        let relay = Relay::new(config, transport.clone()).unwrap();
        let mut rx = relay.subscribe();

        relay.handle_webhook(&body).await;
        let events = collect_until_task_done(&mut rx).await;

        assert!(
            events
                .iter()
                .any(|e| matches!(e, Event::TranscodeStarted { filename, .. } if filename == "clip.mov"))
        );
        assert!(matches!(
            &transport.sent()[0],
            SentCall::File { filename, .. } if filename == "clip.mov.mp4"
        ));

        // Only the stub binary survives; the task directory and the
        // transcoded file inside it are gone
        let mut entries = tokio::fs::read_dir(scratch.path()).await.unwrap();
        let only = entries.next_entry().await.unwrap().unwrap();
        assert_eq!(only.file_name(), "ffmpeg-stub");
        assert!(entries.next_entry().await.unwrap().is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn compatible_mp4_skips_the_transcoder() {
        let server = MockServer::start().await;
        let body = mount_video(&server, "clip.mp4", "video/mp4").await;

        let scratch = tempfile::tempdir().unwrap();
        let transport = Arc::new(MockTransport::new());
        let mut config = test_config(scratch.path(), None);
        // If this ever ran the task would report a failed transcode
        config.transcode.ffmpeg_path = Some(stub_ffmpeg(scratch.path(), FAILING_FFMPEG));
        let relay = Relay::new(config, transport.clone()).unwrap();
        let mut rx = relay.subscribe();

        relay.handle_webhook(&body).await;
        let events = collect_until_task_done(&mut rx).await;

        assert!(
            !events
                .iter()
                .any(|e| matches!(e, Event::TranscodeStarted { .. }))
        );
        assert!(matches!(
            &transport.sent()[0],
            SentCall::File { filename, .. } if filename == "clip.mp4"
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failed_transcode_degrades_to_the_original_file() {
        let server = MockServer::start().await;
        let body = mount_video(&server, "clip.webm", "video/webm").await;

        let scratch = tempfile::tempdir().unwrap();
        let transport = Arc::new(MockTransport::new());
        let mut config = test_config(scratch.path(), None);
        config.transcode.ffmpeg_path = Some(stub_ffmpeg(scratch.path(), FAILING_FFMPEG));
        let relay = Relay::new(config, transport.clone()).unwrap();
        let mut rx = relay.subscribe();

        relay.handle_webhook(&body).await;
        let events = collect_until_task_done(&mut rx).await;

        assert!(
            events
                .iter()
                .any(|e| matches!(e, Event::TranscodeFailed { .. }))
        );
        assert!(matches!(
            &transport.sent()[0],
            SentCall::File { filename, .. } if filename == "clip.webm"
        ));

        let mut entries = tokio::fs::read_dir(scratch.path()).await.unwrap();
        let only = entries.next_entry().await.unwrap().unwrap();
        assert_eq!(only.file_name(), "ffmpeg-stub");
        assert!(entries.next_entry().await.unwrap().is_none());
    }
}
