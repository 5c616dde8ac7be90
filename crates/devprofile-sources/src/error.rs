use thiserror::Error;

/// Errors returned by the provider clients.
///
/// The provider-facing outcomes collapse into four kinds (see
/// [`SourceError::kind`]); transport, decoding and pagination failures are
/// all reported as [`SourceErrorKind::Upstream`].
#[derive(Debug, Error)]
pub enum SourceError {
    /// The provider has no account with the requested name.
    #[error("{message}")]
    UnknownProfile { message: String },

    /// The provider throttled the caller (HTTP 429, or 403 with an exhausted quota).
    #[error("{message}")]
    RateLimited { message: String },

    /// GitHub rejected the configured token (HTTP 401).
    #[error("{message}")]
    InvalidCredentials { message: String },

    /// Any other non-success response, with the provider's raw status and payload.
    #[error("unexpected HTTP status {status} from {url}")]
    Upstream {
        status: u16,
        url: String,
        payload: serde_json::Value,
    },

    /// Network or TLS failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("pagination limit reached for {url}: exceeded {max_pages} pages")]
    PaginationLimit { url: String, max_pages: usize },

    #[error("invalid base URL \"{url}\": {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

/// Coarse classification of a [`SourceError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorKind {
    UnknownProfile,
    RateLimited,
    InvalidCredentials,
    Upstream,
}

impl SourceError {
    #[must_use]
    pub fn kind(&self) -> SourceErrorKind {
        match self {
            SourceError::UnknownProfile { .. } => SourceErrorKind::UnknownProfile,
            SourceError::RateLimited { .. } => SourceErrorKind::RateLimited,
            SourceError::InvalidCredentials { .. } => SourceErrorKind::InvalidCredentials,
            SourceError::Upstream { .. }
            | SourceError::Http(_)
            | SourceError::Deserialize { .. }
            | SourceError::PaginationLimit { .. }
            | SourceError::InvalidBaseUrl { .. } => SourceErrorKind::Upstream,
        }
    }

    /// HTTP status reported by the provider, when the failure carried one.
    #[must_use]
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            SourceError::Upstream { status, .. } => Some(*status),
            SourceError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_outcomes_keep_their_kind() {
        let err = SourceError::RateLimited {
            message: "Exceeded GitHub rate limit".to_owned(),
        };
        assert_eq!(err.kind(), SourceErrorKind::RateLimited);
        assert_eq!(err.to_string(), "Exceeded GitHub rate limit");

        let err = SourceError::InvalidCredentials {
            message: "Cannot authenticate with given credentials".to_owned(),
        };
        assert_eq!(err.kind(), SourceErrorKind::InvalidCredentials);
    }

    #[test]
    fn decoding_and_pagination_failures_are_upstream() {
        let src = serde_json::from_str::<()>("invalid").unwrap_err();
        let err = SourceError::Deserialize {
            context: "test".to_owned(),
            source: src,
        };
        assert_eq!(err.kind(), SourceErrorKind::Upstream);

        let err = SourceError::PaginationLimit {
            url: "http://example.com".to_owned(),
            max_pages: 200,
        };
        assert_eq!(err.kind(), SourceErrorKind::Upstream);
        assert!(err.upstream_status().is_none());
    }

    #[test]
    fn upstream_error_exposes_status() {
        let err = SourceError::Upstream {
            status: 503,
            url: "http://example.com/users/x".to_owned(),
            payload: serde_json::json!({"message": "unavailable"}),
        };
        assert_eq!(err.upstream_status(), Some(503));
        assert_eq!(
            err.to_string(),
            "unexpected HTTP status 503 from http://example.com/users/x"
        );
    }
}
