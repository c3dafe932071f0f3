//! Attachment downloading
//!
//! One shared `reqwest` client handles every download: keep-alive pools
//! bounded per host, redirects capped, IPv4 preferred (some provider
//! deployments publish broken AAAA records), and proxy exclusions
//! honored. Bodies stream straight to scratch files; nothing is
//! buffered whole in memory.

use crate::config::FetchConfig;
use crate::error::{FetchError, Result};
use crate::resolver::ResolvedUrl;
use crate::retry::with_retry;
use crate::scratch;
use crate::types::ResolvedMedia;
use futures::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_DISPOSITION, CONTENT_TYPE, HeaderMap, HeaderValue};
use std::net::{IpAddr, Ipv4Addr};

const USER_AGENT: &str = concat!("chatwoot-relay-media-fetch/", env!("CARGO_PKG_VERSION"));
use std::path::Path;
use tokio::io::AsyncWriteExt;

/// Filename hints for one download: the name the event payload
/// declared, if any, and the last-resort name to use when neither the
/// response headers nor the URL yield one.
#[derive(Debug, Clone, Copy)]
pub struct FileNaming<'a> {
    /// Name declared in the event payload.
    pub declared: Option<&'a str>,
    /// Name used when every other source comes up empty.
    pub fallback: &'a str,
}

/// Downloads attachments into scratch storage.
#[derive(Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    config: FetchConfig,
}

impl Fetcher {
    /// Build the shared HTTP client from the fetch configuration.
    pub fn new(config: FetchConfig) -> Result<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(ACCEPT, HeaderValue::from_static("*/*"));

        let mut builder = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(default_headers)
            // Binding to the IPv4 wildcard forces A-record resolution;
            // literal IPs are unaffected
            .local_address(IpAddr::from(Ipv4Addr::UNSPECIFIED))
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects));

        if let Some(proxy_url) = &config.proxy_url {
            let no_proxy = config
                .no_proxy
                .clone()
                .or_else(|| std::env::var("NO_PROXY").ok())
                .or_else(|| std::env::var("no_proxy").ok());
            let proxy = reqwest::Proxy::all(proxy_url)?
                .no_proxy(no_proxy.as_deref().and_then(reqwest::NoProxy::from_string));
            builder = builder.proxy(proxy);
        }

        Ok(Self {
            client: builder.build()?,
            config,
        })
    }

    /// Download one attachment to a file inside `scratch_dir`.
    ///
    /// The whole request is retried on transient network failures with
    /// linear backoff; HTTP error responses fail immediately. Video
    /// downloads get the longer timeout.
    pub async fn fetch(
        &self,
        target: &ResolvedUrl,
        naming: &FileNaming<'_>,
        is_video: bool,
        scratch_dir: &Path,
    ) -> std::result::Result<ResolvedMedia, FetchError> {
        with_retry(&self.config.retry, || {
            self.fetch_once(target, naming, is_video, scratch_dir)
        })
        .await
    }

    async fn fetch_once(
        &self,
        target: &ResolvedUrl,
        naming: &FileNaming<'_>,
        is_video: bool,
        scratch_dir: &Path,
    ) -> std::result::Result<ResolvedMedia, FetchError> {
        let url = target.url.as_str();
        let timeout = if is_video {
            self.config.video_timeout
        } else {
            self.config.timeout
        };

        let mut request = self.client.get(url).timeout(timeout);
        if let Some((name, value)) = &target.auth_header {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        let status = response.status().as_u16();
        if !(200..400).contains(&status) {
            return Err(FetchError::Http {
                url: url.to_string(),
                status,
            });
        }

        let content_disposition = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let filename = scratch::choose_filename(
            naming.declared,
            content_disposition.as_deref(),
            url,
            naming.fallback,
        );

        let scratch_path = scratch_dir.join(&filename);
        let io_err = |source: std::io::Error| FetchError::Io {
            url: url.to_string(),
            source,
        };

        let mut file = tokio::fs::File::create(&scratch_path).await.map_err(io_err)?;
        let mut byte_size: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| FetchError::from_reqwest(url, e))?;
            byte_size += chunk.len() as u64;
            file.write_all(&chunk).await.map_err(io_err)?;
        }
        file.flush().await.map_err(io_err)?;

        tracing::debug!(
            url = %url,
            filename = %filename,
            byte_size,
            content_type = %content_type,
            "Attachment downloaded to scratch"
        );

        Ok(ResolvedMedia {
            scratch_path,
            filename,
            content_type,
            byte_size,
        })
    }
}

impl std::fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
