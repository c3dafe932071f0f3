//! Attachment locator resolution
//!
//! Provider payloads reference attachments in several shapes: absolute
//! URLs, root-relative paths, paths containing the provider's blob
//! path marker, and inline `data:` tokens. This module turns each into
//! a fetchable URL plus the auth headers the download needs, or reports
//! that the locator cannot be fetched at all.

use crate::config::ProviderConfig;
use crate::error::{Error, Result};

/// A resolved download target: the URL plus any auth header to attach
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedUrl {
    /// The fetchable URL
    pub url: String,
    /// `(header name, header value)`, present only for same-origin
    /// downloads with a configured credential
    pub auth_header: Option<(String, String)>,
}

/// Turn a raw locator into a fetchable URL.
///
/// Resolution order: absolute URL as-is, then path-marker splice onto
/// the base URL, then root-relative prefixing, then bare-path
/// prefixing. Inline `data:` tokens are never network resources and
/// resolve to [`Error::UnresolvableAttachment`], as does any relative
/// locator when no base URL is configured.
pub fn resolve(locator: &str, provider: &ProviderConfig) -> Result<ResolvedUrl> {
    let locator = locator.trim();
    if is_absolute_url(locator) {
        return Ok(with_auth(locator.to_string(), provider));
    }
    if locator.starts_with("data:") {
        return Err(Error::UnresolvableAttachment(
            "inline data locator cannot be fetched".to_string(),
        ));
    }

    let base = provider.trimmed_base_url().ok_or_else(|| {
        Error::UnresolvableAttachment(format!(
            "relative locator {locator:?} with no provider base URL configured"
        ))
    })?;

    let url = if let Some(idx) = locator.find(provider.path_marker.as_str()) {
        // Some provider versions emit full external URLs for their own
        // blobs under a different host; splice at the marker so the
        // download always goes to the configured base
        format!("{base}{}", &locator[idx..])
    } else if locator.starts_with('/') {
        format!("{base}{locator}")
    } else {
        format!("{base}/{}", locator.trim_start_matches('/'))
    };

    Ok(with_auth(url, provider))
}

fn is_absolute_url(s: &str) -> bool {
    let lower = s.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Attach the provider credential when the URL targets the provider's
/// own origin. Third-party hosts never receive the credential.
fn with_auth(url: String, provider: &ProviderConfig) -> ResolvedUrl {
    let auth_header = match (&provider.access_token, provider.trimmed_base_url()) {
        (Some(token), Some(base)) if !token.is_empty() && same_origin(&url, base) => {
            if provider.auth_header_name.eq_ignore_ascii_case("authorization") {
                Some(("Authorization".to_string(), format!("Bearer {token}")))
            } else {
                Some((provider.auth_header_name.clone(), token.clone()))
            }
        }
        _ => None,
    };
    ResolvedUrl { url, auth_header }
}

/// Full origin comparison: scheme, host, and effective port must all
/// match. A prefix check would leak the credential to look-alike hosts
/// such as `cw.example.com.evil.net`.
fn same_origin(url: &str, base: &str) -> bool {
    match (url::Url::parse(url), url::Url::parse(base)) {
        (Ok(u), Ok(b)) => {
            u.scheme() == b.scheme()
                && u.host_str() == b.host_str()
                && u.port_or_known_default() == b.port_or_known_default()
        }
        _ => false,
    }
}
