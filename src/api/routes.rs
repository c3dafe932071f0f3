//! Webhook route handlers

use crate::api::state::AppState;
use crate::types::WebhookDisposition;
use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Response envelope for the webhook endpoint
///
/// Always returned with HTTP 200; the caller never sees downstream
/// delivery outcomes. Only a body that fails JSON parsing produces a
/// 4xx, before the pipeline is invoked at all.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookResponse {
    /// One of `queued`, `duplicate`, `ignored`
    pub status: String,
    /// Event identity echoed back, when the payload carried one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// Ignore reason, present only for `ignored`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl From<WebhookDisposition> for WebhookResponse {
    fn from(d: WebhookDisposition) -> Self {
        let status = d.status().to_string();
        match d {
            WebhookDisposition::Queued { message_id } => Self {
                status,
                message_id,
                reason: None,
            },
            WebhookDisposition::Duplicate { message_id } => Self {
                status,
                message_id: Some(message_id),
                reason: None,
            },
            WebhookDisposition::Ignored { reason } => Self {
                status,
                message_id: None,
                reason: Some(reason.to_string()),
            },
        }
    }
}

/// Health check response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Always "ok" when the server is responding
    pub status: String,
    /// Whether the outbound transport session is usable
    pub transport_connected: bool,
    /// Crate version
    pub version: String,
}

/// Receive one provider webhook event
///
/// Accepts the loosely structured conversation-event body, runs the
/// synchronous gates, and answers immediately. Media work happens in
/// the background after this response.
#[utoipa::path(
    post,
    path = "/webhook",
    request_body = Object,
    responses(
        (status = 200, description = "Event acknowledged", body = WebhookResponse),
        (status = 400, description = "Malformed JSON body")
    ),
    tag = "Webhook"
)]
pub async fn receive_webhook(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Json<WebhookResponse> {
    let disposition = state.relay.handle_webhook(&body).await;
    Json(disposition.into())
}

/// Health check
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    ),
    tag = "System"
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        transport_connected: state.relay.transport.is_connected().await,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// OpenAPI specification
#[utoipa::path(
    get,
    path = "/openapi.json",
    responses(
        (status = 200, description = "OpenAPI specification", content_type = "application/json")
    ),
    tag = "System"
)]
pub async fn openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    use utoipa::OpenApi;
    Json(crate::api::ApiDoc::openapi())
}
