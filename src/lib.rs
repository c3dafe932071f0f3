//! # chatwoot-relay
//!
//! Relay pipeline from Chatwoot conversation-event webhooks to a
//! WhatsApp-style messaging transport.
//!
//! ## Design Philosophy
//!
//! chatwoot-relay is designed to be:
//! - **Ack-first** - The webhook caller is answered before any media work begins
//! - **At-most-once** - A time-windowed deduplicator absorbs provider retries
//! - **Best-effort outward** - Downloads retry, transcodes degrade, deliveries fall back
//! - **Event-driven** - Consumers subscribe to pipeline events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use chatwoot_relay::{Config, Relay};
//! use std::sync::Arc;
//!
//! # fn transport_client() -> Arc<dyn chatwoot_relay::Transport> { unimplemented!() }
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.provider.base_url = Some("https://chatwoot.example.com".to_string());
//!
//!     let relay = Relay::new(config, transport_client())?;
//!
//!     // Subscribe to pipeline events
//!     let mut events = relay.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     // Serve the webhook endpoint until a termination signal
//!     chatwoot_relay::run_with_shutdown(relay).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Webhook HTTP server
pub mod api;
/// Configuration types
pub mod config;
/// Time-windowed event deduplication
pub mod dedup;
/// Delivery strategies and caption signing
pub mod deliver;
/// Error types
pub mod error;
/// Attachment downloading
pub mod fetch;
/// Media classification and video normalization
pub mod media;
/// Webhook payload parsing
pub mod payload;
/// The relay pipeline
pub mod relay;
/// Attachment locator resolution
pub mod resolver;
/// Retry logic with linear backoff
pub mod retry;
/// Scratch storage for in-flight downloads
pub mod scratch;
/// Outbound transport seam
pub mod transport;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use config::{Config, ProviderConfig, RelayConfig, RetryConfig};
pub use error::{DeliveryError, Error, FetchError, Result};
pub use relay::Relay;
pub use transport::{FilePayload, Transport};
pub use types::{
    AttachmentKind, AttachmentRef, DeliveryStrategy, Direction, Event, EventKind, InboundEvent,
    ResolvedMedia, WebhookDisposition,
};

/// Run the webhook server with graceful signal handling.
///
/// Serves the API until SIGTERM/SIGINT (Ctrl+C on non-Unix), then
/// returns. In-flight background tasks are fire-and-forget and are
/// abandoned at process exit.
pub async fn run_with_shutdown(relay: std::sync::Arc<Relay>) -> Result<()> {
    tokio::select! {
        result = api::start_api_server(relay) => result,
        () = wait_for_signal() => {
            tracing::info!("Shutting down webhook server");
            Ok(())
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Signal registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
