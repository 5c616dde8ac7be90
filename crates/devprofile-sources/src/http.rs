//! Request plumbing shared by the provider clients.
//!
//! Every outbound call goes through [`fetch_json`], which maps provider
//! status codes onto [`SourceError`] variants the same way for both
//! providers and returns the `Link` header alongside the decoded body.

use std::time::Duration;

use devprofile_core::{AppConfig, Provider};
use reqwest::header::{HeaderMap, LINK};
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;

use crate::error::SourceError;

pub(crate) const INVALID_CREDENTIALS_MESSAGE: &str = "Cannot authenticate with given credentials";

/// Builds the shared `reqwest::Client` with the configured timeout and `User-Agent`.
///
/// # Errors
///
/// Returns [`SourceError::Http`] if the underlying `reqwest::Client`
/// cannot be constructed (e.g., invalid TLS config).
pub fn build_http_client(timeout_secs: u64, user_agent: &str) -> Result<Client, SourceError> {
    let client = Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .user_agent(user_agent)
        .build()?;
    Ok(client)
}

/// Builds the shared `reqwest::Client` from application config.
///
/// # Errors
///
/// Returns [`SourceError::Http`] if the client cannot be constructed.
pub fn http_client_from_config(config: &AppConfig) -> Result<Client, SourceError> {
    build_http_client(config.request_timeout_secs, &config.user_agent)
}

/// Parses `raw` as an absolute base URL, normalised to carry no trailing slash.
pub(crate) fn parse_base_url(raw: &str) -> Result<Url, SourceError> {
    let url = Url::parse(raw.trim_end_matches('/')).map_err(|e| SourceError::InvalidBaseUrl {
        url: raw.to_owned(),
        reason: e.to_string(),
    })?;
    if url.cannot_be_a_base() {
        return Err(SourceError::InvalidBaseUrl {
            url: raw.to_owned(),
            reason: "URL cannot be used as a base".to_owned(),
        });
    }
    Ok(url)
}

/// Appends percent-encoded path `segments` to `base`.
pub(crate) fn endpoint(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

/// Sends `request`, classifies the response status, and decodes a 2xx body as `T`.
///
/// Returns the decoded body and the raw `Link` header, if any.
///
/// # Errors
///
/// - [`SourceError::RateLimited`] on HTTP 429, or 403 with an exhausted quota.
/// - [`SourceError::InvalidCredentials`] on HTTP 401 from GitHub, the only
///   provider that is sent a token. A Bitbucket 401 is `Upstream`.
/// - [`SourceError::Upstream`] on any other non-2xx status, carrying the payload.
/// - [`SourceError::Http`] on network failure.
/// - [`SourceError::Deserialize`] if a 2xx body does not match `T`.
pub(crate) async fn fetch_json<T: DeserializeOwned>(
    request: RequestBuilder,
    url: &str,
    provider: Provider,
) -> Result<(T, Option<String>), SourceError> {
    tracing::debug!(%provider, url, "requesting upstream resource");

    let response = request.send().await?;
    let status = response.status();

    if is_rate_limited(status, response.headers()) {
        tracing::warn!(%provider, url, status = status.as_u16(), "provider rate limit hit");
        return Err(SourceError::RateLimited {
            message: format!("Exceeded {provider} rate limit"),
        });
    }

    if status == StatusCode::UNAUTHORIZED && provider == Provider::Github {
        return Err(SourceError::InvalidCredentials {
            message: INVALID_CREDENTIALS_MESSAGE.to_owned(),
        });
    }

    // Extract the Link header before consuming the response body.
    let link_header = response
        .headers()
        .get(LINK)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let body = response.text().await?;

    if !status.is_success() {
        let payload = serde_json::from_str(&body).unwrap_or(serde_json::Value::String(body));
        return Err(SourceError::Upstream {
            status: status.as_u16(),
            url: url.to_owned(),
            payload,
        });
    }

    let parsed = serde_json::from_str::<T>(&body).map_err(|e| SourceError::Deserialize {
        context: url.to_owned(),
        source: e,
    })?;

    Ok((parsed, link_header))
}

/// HTTP 429 always means throttling; GitHub also answers 403 once the
/// hourly quota is spent, signalled by `x-ratelimit-remaining: 0`.
fn is_rate_limited(status: StatusCode, headers: &HeaderMap) -> bool {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return true;
    }
    status == StatusCode::FORBIDDEN
        && headers
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.trim() == "0")
}

/// True when `err` is a plain HTTP response with the given status.
pub(crate) fn has_status(err: &SourceError, wanted: StatusCode) -> bool {
    matches!(err, SourceError::Upstream { status, .. } if *status == wanted.as_u16())
}

#[cfg(test)]
mod tests {
    use reqwest::header::HeaderValue;

    use super::*;

    #[test]
    fn too_many_requests_is_rate_limited() {
        assert!(is_rate_limited(
            StatusCode::TOO_MANY_REQUESTS,
            &HeaderMap::new()
        ));
    }

    #[test]
    fn forbidden_with_exhausted_quota_is_rate_limited() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
        assert!(is_rate_limited(StatusCode::FORBIDDEN, &headers));
    }

    #[test]
    fn forbidden_with_remaining_quota_is_not_rate_limited() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("12"));
        assert!(!is_rate_limited(StatusCode::FORBIDDEN, &headers));
        assert!(!is_rate_limited(StatusCode::FORBIDDEN, &HeaderMap::new()));
    }

    #[test]
    fn parse_base_url_strips_trailing_slash() {
        let url = parse_base_url("https://api.bitbucket.org/2.0/").expect("valid url");
        assert_eq!(url.as_str(), "https://api.bitbucket.org/2.0");
    }

    #[test]
    fn parse_base_url_rejects_relative_url() {
        assert!(matches!(
            parse_base_url("not a url"),
            Err(SourceError::InvalidBaseUrl { .. })
        ));
    }

    #[test]
    fn endpoint_appends_segments_to_host_root() {
        let base = parse_base_url("https://api.github.com").expect("valid url");
        let url = endpoint(&base, &["users", "octocat"]);
        assert_eq!(url.as_str(), "https://api.github.com/users/octocat");
    }

    #[test]
    fn endpoint_keeps_versioned_base_path() {
        let base = parse_base_url("https://api.bitbucket.org/2.0/").expect("valid url");
        let url = endpoint(&base, &["teams", "some team"]);
        assert_eq!(url.as_str(), "https://api.bitbucket.org/2.0/teams/some%20team");
    }

    #[test]
    fn has_status_matches_upstream_status_only() {
        let err = SourceError::Upstream {
            status: 404,
            url: "http://example.com".to_owned(),
            payload: serde_json::Value::Null,
        };
        assert!(has_status(&err, StatusCode::NOT_FOUND));
        assert!(!has_status(&err, StatusCode::CONFLICT));
    }
}
