//! Error types for chatwoot-relay
//!
//! This module provides the error taxonomy for the relay pipeline:
//! - Per-stage error types (`FetchError`, `DeliveryError`)
//! - A top-level `Error` used throughout the crate
//! - Context information (URL, destination, delivery strategy)
//!
//! Dedup rejections and policy-filtered events are not errors; they are
//! reported through [`crate::types::WebhookDisposition`] instead.

use thiserror::Error;

/// Result type alias for chatwoot-relay operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for chatwoot-relay
///
/// Every variant carries enough context to diagnose a failure from logs
/// alone, since the webhook caller never sees delivery outcomes.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "provider.base_url")
        key: Option<String>,
    },

    /// Attachment locator could not be turned into a fetchable URL
    #[error("unresolvable attachment: {0}")]
    UnresolvableAttachment(String),

    /// Attachment download failed
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Video normalization failed (ffmpeg missing or exited non-zero)
    #[error("transcode error: {0}")]
    Transcode(String),

    /// Delivery to a destination failed on every strategy
    #[error("delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    /// Webhook payload was structurally unusable
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error from the HTTP client
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Webhook server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Attachment download errors
///
/// The `Timeout` and `NetworkUnreachable` variants are transient and
/// retried by the fetcher; `Http`, `Malformed`, and most `Io` kinds are
/// permanent for the request.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Request exceeded its deadline
    #[error("fetch timed out for {url}")]
    Timeout {
        /// The URL that timed out
        url: String,
    },

    /// DNS failure, connection refused/reset, or host unreachable
    #[error("network unreachable for {url}: {reason}")]
    NetworkUnreachable {
        /// The URL that could not be reached
        url: String,
        /// Underlying cause as reported by the client
        reason: String,
    },

    /// Server answered with a status outside [200, 400)
    #[error("HTTP {status} fetching {url}")]
    Http {
        /// The URL that was fetched
        url: String,
        /// The rejected status code
        status: u16,
    },

    /// The response could not be decoded; retrying will reproduce it
    #[error("malformed response from {url}: {reason}")]
    Malformed {
        /// The URL that produced the unusable response
        url: String,
        /// Underlying decode failure
        reason: String,
    },

    /// Failed to stream the body to scratch storage
    #[error("I/O error while fetching {url}: {source}")]
    Io {
        /// The URL being fetched when the write failed
        url: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    /// Classify a reqwest error against the URL it was issued for
    pub(crate) fn from_reqwest(url: &str, e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
            }
        } else if e.is_connect() {
            FetchError::NetworkUnreachable {
                url: url.to_string(),
                reason: e.to_string(),
            }
        } else if let Some(status) = e.status() {
            FetchError::Http {
                url: url.to_string(),
                status: status.as_u16(),
            }
        } else if e.is_decode() || e.is_builder() {
            FetchError::Malformed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        } else {
            // Mid-stream transmission failures land here and stay
            // retryable
            FetchError::NetworkUnreachable {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

/// Delivery errors, scoped to one destination and one strategy
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The transport rejected the send call
    #[error("{strategy} send to {destination} failed: {reason}")]
    SendFailed {
        /// The destination the send was addressed to
        destination: String,
        /// The strategy that was attempted (e.g., "direct-path", "inline-data")
        strategy: String,
        /// Transport-reported failure reason
        reason: String,
    },

    /// Every strategy in the chain failed for this destination
    #[error("all strategies exhausted for {destination}: {last_error}")]
    AllStrategiesFailed {
        /// The destination nothing could be delivered to
        destination: String,
        /// The error from the final strategy attempted
        last_error: String,
    },
}
