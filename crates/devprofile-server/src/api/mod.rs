mod profile;

use std::sync::Arc;

use axum::{
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use devprofile_core::AppConfig;
use devprofile_sources::{
    http_client_from_config, BitbucketClient, GithubClient, SourceError, SourceErrorKind,
};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::middleware::request_id;

/// Provider clients shared by every request. They hold one pooled
/// `reqwest::Client` between them.
#[derive(Clone)]
pub struct AppState {
    pub github: Arc<GithubClient>,
    pub bitbucket: Arc<BitbucketClient>,
}

impl AppState {
    /// Builds both provider clients from application config.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the HTTP client cannot be built or a
    /// configured base URL is invalid.
    pub fn from_config(config: &AppConfig) -> Result<Self, SourceError> {
        let http = http_client_from_config(config)?;
        Ok(Self {
            github: Arc::new(GithubClient::from_config(http.clone(), config)?),
            bitbucket: Arc::new(BitbucketClient::from_config(http, config)?),
        })
    }
}

/// Error document returned for every failed request: `{"error": message}`.
#[derive(Debug, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    pub status: StatusCode,
    pub error: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            error: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(self)).into_response()
    }
}

/// Maps a provider failure that `collect_profiles` did not absorb to a response.
///
/// Rate limiting and rejected credentials keep their meaning (429, 401).
/// Anything else is the provider misbehaving and becomes 502.
pub(super) fn map_source_error(request_id: &str, error: &SourceError) -> ApiError {
    match error.kind() {
        SourceErrorKind::RateLimited => {
            tracing::warn!(request_id, error = %error, "provider rate limit exceeded");
            ApiError::new(StatusCode::TOO_MANY_REQUESTS, error.to_string())
        }
        SourceErrorKind::InvalidCredentials => {
            tracing::warn!(request_id, error = %error, "provider rejected credentials");
            ApiError::new(StatusCode::UNAUTHORIZED, error.to_string())
        }
        SourceErrorKind::UnknownProfile => ApiError::new(StatusCode::NOT_FOUND, error.to_string()),
        SourceErrorKind::Upstream => {
            tracing::error!(
                request_id,
                error = %error,
                upstream_status = ?error.upstream_status(),
                "provider request failed"
            );
            ApiError::new(StatusCode::BAD_GATEWAY, error.to_string())
        }
    }
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET])
        .allow_headers([header::CONTENT_TYPE, HeaderName::from_static("x-request-id")])
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/profile/{username}", get(profile::get_profiles))
        .route("/v2/profile/{username}", get(profile::get_merged_profile))
        .fallback(not_found)
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(request_id))
                .layer(TraceLayer::new_for_http())
                .layer(build_cors()),
        )
        .with_state(state)
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
}

async fn health() -> Json<HealthData> {
    Json(HealthData { status: "ok" })
}

async fn not_found() -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, "Not found")
}

#[cfg(test)]
mod tests;
