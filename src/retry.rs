//! Retry logic with linear backoff
//!
//! Two flavors are used across the pipeline: downloads retry only on
//! transient network failures (an HTTP 404 will not improve with
//! patience), while transport sends retry on any error because the
//! underlying client fails sporadically for reasons it does not
//! classify. Both use linear backoff (`base_delay * attempt_index`).

use crate::config::RetryConfig;
use crate::error::{Error, FetchError};
use std::future::Future;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (network timeouts, connection reset, DNS temporary
/// failure, host unreachable) should return `true`. Permanent failures
/// (HTTP error responses, malformed input, local I/O beyond transient
/// kinds) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for FetchError {
    fn is_retryable(&self) -> bool {
        match self {
            FetchError::Timeout { .. } => true,
            FetchError::NetworkUnreachable { .. } => true,
            // An HTTP error response is a decision, not an accident
            FetchError::Http { .. } => false,
            // A broken response body will be broken again next time
            FetchError::Malformed { .. } => false,
            FetchError::Io { source, .. } => matches!(
                source.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
            ),
        }
    }
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Fetch(e) => e.is_retryable(),
            Error::Network(e) => e.is_timeout() || e.is_connect(),
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
            ),
            // Everything else is a permanent condition for this attempt
            Error::Config { .. }
            | Error::UnresolvableAttachment(_)
            | Error::Transcode(_)
            | Error::Delivery(_)
            | Error::InvalidPayload(_)
            | Error::Serialization(_)
            | Error::ApiServerError(_)
            | Error::Other(_) => false,
        }
    }
}

/// Execute an async operation, retrying transient failures with linear backoff.
///
/// Attempt `n` (1-based) sleeps `base_delay * n` before running, so a
/// 500ms base yields 500ms then 1s between three attempts. Permanent
/// errors short-circuit immediately.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    retry_inner(config, &mut operation, |e: &E| e.is_retryable()).await
}

/// Execute an async operation, retrying on any error with linear backoff.
///
/// Used for transport sends, where failures arrive unclassified.
pub async fn with_retry_always<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    retry_inner(config, &mut operation, |_| true).await
}

async fn retry_inner<F, Fut, T, E>(
    config: &RetryConfig,
    operation: &mut F,
    should_retry: impl Fn(&E) -> bool,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt: u32 = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if should_retry(&e) && attempt + 1 < config.max_attempts => {
                attempt += 1;
                let delay = config.base_delay * attempt;

                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis(),
                    "Operation failed, retrying"
                );

                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    attempts = attempt + 1,
                    "Operation failed, not retrying further"
                );
                return Err(e);
            }
        }
    }
}
