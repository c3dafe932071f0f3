//! Configuration types for chatwoot-relay

use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::PathBuf, time::Duration};
use utoipa::ToSchema;

/// Event-source provider settings (Chatwoot instance and download credentials)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ProviderConfig {
    /// Base URL of the Chatwoot instance attachments are downloaded from
    ///
    /// Trailing slashes are ignored. Relative attachment locators are
    /// spliced onto this URL.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Credential attached to downloads from the provider origin
    #[serde(default)]
    pub access_token: Option<String>,

    /// Header name the credential is sent under (default: "Authorization")
    ///
    /// When this is "Authorization" (case-insensitive) the token is sent
    /// as `Bearer <token>`; any other header name sends the raw token.
    #[serde(default = "default_auth_header_name")]
    pub auth_header_name: String,

    /// Path segment marking provider-served blobs (default: "/rails/")
    ///
    /// Locators containing this marker are spliced onto `base_url` at the
    /// marker, discarding whatever precedes it.
    #[serde(default = "default_path_marker")]
    pub path_marker: String,
}

impl ProviderConfig {
    /// Base URL with trailing slashes trimmed, if configured
    pub fn trimmed_base_url(&self) -> Option<&str> {
        self.base_url
            .as_deref()
            .map(|u| u.trim_end_matches('/'))
            .filter(|u| !u.is_empty())
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            access_token: None,
            auth_header_name: default_auth_header_name(),
            path_marker: default_path_marker(),
        }
    }
}

/// Attachment download behavior (timeouts, redirects, proxy, retry)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct FetchConfig {
    /// Request timeout for non-video attachments (default: 180 seconds)
    #[serde(default = "default_fetch_timeout", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub timeout: Duration,

    /// Request timeout for video attachments (default: 300 seconds)
    #[serde(default = "default_video_fetch_timeout", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub video_timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// Maximum idle keep-alive sockets kept per host (default: 12)
    #[serde(default = "default_pool_max_idle")]
    pub pool_max_idle_per_host: usize,

    /// Forward proxy URL for outbound fetches (None = direct or env proxy)
    #[serde(default)]
    pub proxy_url: Option<String>,

    /// Comma-separated host/suffix list that bypasses the proxy
    ///
    /// Same grammar as the `NO_PROXY` environment variable, which is used
    /// as a fallback when this is unset.
    #[serde(default)]
    pub no_proxy: Option<String>,

    /// Retry policy for transient network failures
    #[serde(default = "default_fetch_retry")]
    pub retry: RetryConfig,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: default_fetch_timeout(),
            video_timeout: default_video_fetch_timeout(),
            max_redirects: default_max_redirects(),
            pool_max_idle_per_host: default_pool_max_idle(),
            proxy_url: None,
            no_proxy: None,
            retry: default_fetch_retry(),
        }
    }
}

/// Video normalization settings (ffmpeg)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct TranscodeConfig {
    /// Path to ffmpeg executable (auto-detected if None)
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub ffmpeg_path: Option<PathBuf>,

    /// Whether to search PATH for ffmpeg if no explicit path is set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,

    /// Maximum output width in pixels; sources wider than this are scaled down (default: 1280)
    #[serde(default = "default_max_width")]
    pub max_width: u32,

    /// Output audio sample rate in Hz (default: 48000)
    #[serde(default = "default_audio_sample_rate")]
    pub audio_sample_rate: u32,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            search_path: true,
            max_width: default_max_width(),
            audio_sample_rate: default_audio_sample_rate(),
        }
    }
}

/// Delivery behavior (per-strategy retry policy)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct DeliveryConfig {
    /// Retry policy applied to every transport send call
    #[serde(default = "default_delivery_retry")]
    pub retry: RetryConfig,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            retry: default_delivery_retry(),
        }
    }
}

/// Relay pipeline policy (dedup, filters, scratch storage, deadlines)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RelayConfig {
    /// Master switch; disabled relays ignore every event (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Dedup retention window for event identities (default: 600 seconds)
    #[serde(default = "default_dedup_ttl", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub dedup_ttl: Duration,

    /// Ignore messages whose body starts with this marker token (e.g., "@bot")
    ///
    /// None disables the filter. Matching is case-insensitive after
    /// leading whitespace is stripped.
    #[serde(default)]
    pub bot_marker: Option<String>,

    /// Ignore private/internal notes (default: true)
    #[serde(default = "default_true")]
    pub ignore_private: bool,

    /// Optional overall deadline for one background task (default: None)
    ///
    /// Bounds the whole resolve/fetch/transcode/deliver unit. Disabled by
    /// default; per-stage timeouts still apply.
    #[serde(default, with = "optional_duration_serde")]
    #[schema(value_type = Option<u64>)]
    pub task_deadline: Option<Duration>,

    /// Root directory for per-fetch scratch storage (default: system temp dir)
    #[serde(default = "default_scratch_dir")]
    #[schema(value_type = String)]
    pub scratch_dir: PathBuf,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dedup_ttl: default_dedup_ttl(),
            bot_marker: None,
            ignore_private: true,
            task_deadline: None,
            scratch_dir: default_scratch_dir(),
        }
    }
}

/// Webhook server settings
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiConfig {
    /// Bind address for the webhook endpoint (default: 127.0.0.1:8947)
    #[serde(default = "default_bind_address")]
    #[schema(value_type = String)]
    pub bind_address: SocketAddr,

    /// Enable CORS middleware (default: false; webhooks are server-to-server)
    #[serde(default)]
    pub cors_enabled: bool,

    /// Allowed CORS origins ("*" for any)
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            cors_enabled: false,
            cors_origins: Vec::new(),
        }
    }
}

/// Retry policy for a pipeline stage
///
/// Backoff is linear: the delay before attempt `n` (1-based) is
/// `base_delay * n`.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay unit for linear backoff (default: 500 ms)
    #[serde(default = "default_base_delay", with = "duration_ms_serde")]
    #[schema(value_type = u64)]
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay: default_base_delay(),
        }
    }
}

/// Main configuration for the relay
///
/// Fields are organized into logical sub-configs:
/// - [`provider`](ProviderConfig): event source and download credentials
/// - [`fetch`](FetchConfig): download timeouts, proxy, retry
/// - [`transcode`](TranscodeConfig): ffmpeg video normalization
/// - [`delivery`](DeliveryConfig): transport send retry
/// - [`relay`](RelayConfig): dedup window, filters, scratch storage
/// - [`api`](ApiConfig): webhook endpoint
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct Config {
    /// Event source and download credentials
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Attachment download behavior
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Video normalization settings
    #[serde(default)]
    pub transcode: TranscodeConfig,

    /// Delivery retry behavior
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Pipeline policy
    #[serde(default)]
    pub relay: RelayConfig,

    /// Webhook server settings
    #[serde(default)]
    pub api: ApiConfig,
}

fn default_auth_header_name() -> String {
    "Authorization".to_string()
}

fn default_path_marker() -> String {
    "/rails/".to_string()
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(180)
}

fn default_video_fetch_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_max_redirects() -> usize {
    5
}

fn default_pool_max_idle() -> usize {
    12
}

fn default_fetch_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        base_delay: Duration::from_millis(500),
    }
}

fn default_delivery_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 2,
        base_delay: Duration::from_secs(2),
    }
}

fn default_dedup_ttl() -> Duration {
    Duration::from_secs(10 * 60)
}

fn default_scratch_dir() -> PathBuf {
    std::env::temp_dir()
}

// Literal address, cannot fail to parse
#[allow(clippy::unwrap_used)]
fn default_bind_address() -> SocketAddr {
    "127.0.0.1:8947".parse().unwrap()
}

fn default_max_width() -> u32 {
    1280
}

fn default_audio_sample_rate() -> u32 {
    48_000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_true() -> bool {
    true
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Duration serialization helper (milliseconds, for sub-second retry delays)
mod duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

// Optional Duration serialization helper
mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}
