//! Webhook HTTP server
//!
//! A deliberately small surface: the provider-facing webhook endpoint,
//! a health check, and the OpenAPI description. Delivery outcomes are
//! never exposed here; see [`crate::relay::Relay::subscribe`].

use crate::error::Result;
use crate::relay::Relay;
use axum::{
    Router,
    http::HeaderValue,
    routing::{get, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use utoipa::OpenApi;

pub mod routes;
pub mod state;

pub use state::AppState;

/// OpenAPI documentation for the webhook surface
#[derive(OpenApi)]
#[openapi(
    info(
        title = "chatwoot-relay",
        description = "Inbound conversation-event webhook, media relay pipeline"
    ),
    paths(
        routes::receive_webhook,
        routes::health_check,
        routes::openapi_spec,
    ),
    components(schemas(routes::WebhookResponse, routes::HealthResponse))
)]
pub struct ApiDoc;

/// Create the router with all route definitions
///
/// # Routes
///
/// - `POST /webhook` - Receive one provider event
/// - `GET /health` - Health check
/// - `GET /openapi.json` - OpenAPI specification
pub fn create_router(relay: Arc<Relay>) -> Router {
    let cors_enabled = relay.config().api.cors_enabled;
    let cors_origins = relay.config().api.cors_origins.clone();
    let state = AppState::new(relay);

    let router = Router::new()
        .route("/webhook", post(routes::receive_webhook))
        .route("/health", get(routes::health_check))
        .route("/openapi.json", get(routes::openapi_spec))
        .with_state(state);

    if cors_enabled {
        router.layer(build_cors_layer(&cors_origins))
    } else {
        router
    }
}

/// Build a CORS layer based on configured origins
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_any = origins.iter().any(|o| o == "*");

    if allow_any || origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Start the webhook server on the configured bind address.
///
/// Binds a TCP listener and serves until shutdown or error.
pub async fn start_api_server(relay: Arc<Relay>) -> Result<()> {
    let bind_address = relay.config().api.bind_address;

    let app = create_router(relay);
    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    tracing::info!(address = %bind_address, "Webhook server listening");

    axum::serve(listener, app)
        .await
        .map_err(|e| crate::error::Error::ApiServerError(e.to_string()))?;

    tracing::info!("Webhook server stopped");
    Ok(())
}
