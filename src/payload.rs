//! Webhook payload parsing
//!
//! The provider schema is loosely structured; the same fact can live
//! under several paths depending on provider version and event shape.
//! Each accessor tries its known paths in a fixed priority order.

use crate::types::{AttachmentKind, AttachmentRef, Direction, EventKind, InboundEvent};
use serde_json::Value;

/// Parse a raw webhook body into an [`InboundEvent`].
///
/// Never fails: missing fields become `None`/empty, and downstream
/// filters decide what to do with an underspecified event. Only the
/// HTTP layer rejects bodies that are not JSON at all.
pub fn parse_event(body: &Value) -> InboundEvent {
    let msg = message_node(body);

    InboundEvent {
        event_id: event_id(body, msg),
        kind: event_kind(body),
        direction: direction(body),
        private: is_private(body, msg),
        source_phone: source_phone(body),
        body: msg
            .and_then(|m| m.get("content"))
            .and_then(Value::as_str)
            .map(str::to_string),
        attachments: attachments(msg),
        sender_display_name: sender_display_name(body, msg),
    }
}

/// The message object usually arrives under `message`; some event
/// shapes only carry it as the head of `conversation.messages`.
fn message_node(body: &Value) -> Option<&Value> {
    body.get("message")
        .filter(|m| m.is_object())
        .or_else(|| body.pointer("/conversation/messages/0"))
}

fn event_id(body: &Value, msg: Option<&Value>) -> Option<String> {
    let raw = msg
        .and_then(|m| m.get("id"))
        .or_else(|| body.get("id"))
        .or_else(|| body.get("message_id"))?;
    let id = match raw {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if id.is_empty() { None } else { Some(id) }
}

fn event_kind(body: &Value) -> EventKind {
    match body.get("event").and_then(Value::as_str) {
        Some("message_created") => EventKind::Created,
        Some("message_updated") => EventKind::StatusChanged,
        _ => EventKind::Other,
    }
}

fn direction(body: &Value) -> Direction {
    match body.get("message_type").and_then(Value::as_str) {
        Some("outgoing") => Direction::Outgoing,
        _ => Direction::Incoming,
    }
}

fn is_private(body: &Value, msg: Option<&Value>) -> bool {
    body.get("private")
        .or_else(|| body.get("is_private"))
        .or_else(|| msg.and_then(|m| m.get("private")))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// Contact number with any leading `+` stripped, the way the transport
/// expects destinations.
fn source_phone(body: &Value) -> Option<String> {
    let raw = body
        .pointer("/conversation/meta/sender/phone_number")
        .and_then(Value::as_str)
        .or_else(|| body.get("phone").and_then(Value::as_str))?;
    let phone = raw.trim_start_matches('+');
    if phone.is_empty() {
        None
    } else {
        Some(phone.to_string())
    }
}

fn sender_display_name(body: &Value, msg: Option<&Value>) -> Option<String> {
    body.pointer("/message/sender/name")
        .or_else(|| msg.and_then(|m| m.pointer("/sender/name")))
        .or_else(|| body.pointer("/user/name"))
        .or_else(|| body.pointer("/sender/name"))
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}

fn attachments(msg: Option<&Value>) -> Vec<AttachmentRef> {
    let Some(list) = msg.and_then(|m| m.get("attachments")).and_then(Value::as_array) else {
        return Vec::new();
    };
    list.iter().filter_map(attachment_ref).collect()
}

fn attachment_ref(att: &Value) -> Option<AttachmentRef> {
    let locator = att
        .get("download_url")
        .or_else(|| att.get("downloadUrl"))
        .or_else(|| att.get("url"))
        .or_else(|| att.get("data_url"))
        .and_then(Value::as_str)?
        .to_string();
    Some(AttachmentRef {
        kind: att
            .get("file_type")
            .and_then(Value::as_str)
            .map(AttachmentKind::from_provider)
            .unwrap_or(AttachmentKind::Unknown),
        filename: att
            .get("filename")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        declared_content_type: att
            .get("content_type")
            .and_then(Value::as_str)
            .map(str::to_string),
        locator,
    })
}
