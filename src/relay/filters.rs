//! Policy filters over inbound events
//!
//! Filters run in two phases. Pre-ACK filters are cheap, synchronous
//! checks whose verdict is reported in the webhook response. Post-ACK
//! filters run inside the background task, after the caller has already
//! been answered, and end the task silently.

use crate::config::RelayConfig;
use crate::types::{Direction, EventKind, InboundEvent};

/// Synchronous checks answered in the webhook response.
///
/// Returns the ignore reason when the event should not be processed.
pub fn pre_ack(event: &InboundEvent, config: &RelayConfig) -> Option<&'static str> {
    if !config.enabled {
        return Some("relay-disabled");
    }
    if event.kind != EventKind::Created || event.direction != Direction::Outgoing {
        return Some("event-or-type-mismatch");
    }
    if config.ignore_private && event.private {
        return Some("private-message");
    }
    None
}

/// Checks that run inside the background task, after acknowledgment.
///
/// Returns the reason the task should end without delivering.
pub fn post_ack(event: &InboundEvent, config: &RelayConfig) -> Option<&'static str> {
    if event.source_phone.is_none() {
        return Some("missing-phone");
    }
    if let Some(marker) = config.bot_marker.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
        let body = event.body.as_deref().unwrap_or("").trim_start();
        if body.to_lowercase().starts_with(&marker.to_lowercase()) {
            return Some("bot-marker");
        }
    }
    None
}
