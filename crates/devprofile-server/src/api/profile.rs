use axum::{
    extract::{
        rejection::{PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Extension, Json,
};
use devprofile_core::{ProfileRecord, ProviderProfiles};
use devprofile_sources::{collect_profiles, ProfileQuery};
use serde::Deserialize;

use super::{map_source_error, ApiError, AppState};
use crate::middleware::RequestId;

#[derive(Debug, Default, Deserialize)]
pub(super) struct ProfileParams {
    github_username: Option<String>,
    bitbucket_username: Option<String>,
    bitbucket_team: Option<String>,
}

impl ProfileParams {
    /// Resolves the query string against the path username.
    ///
    /// Empty overrides fall back to `username`.
    fn into_query(self, username: String) -> Result<ProfileQuery, ApiError> {
        let bitbucket_team = match self.bitbucket_team.as_deref() {
            None => true,
            Some(raw) => parse_flag(raw).ok_or_else(|| {
                ApiError::new(
                    StatusCode::BAD_REQUEST,
                    format!("invalid truth value for bitbucket_team: {raw:?}"),
                )
            })?,
        };

        Ok(ProfileQuery {
            username,
            github_username: self.github_username.filter(|s| !s.is_empty()),
            bitbucket_username: self.bitbucket_username.filter(|s| !s.is_empty()),
            bitbucket_team,
        })
    }
}

/// Parses a yes/no flag the way query strings usually spell it.
pub(super) fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" | "t" | "true" | "on" | "1" => Some(true),
        "n" | "no" | "f" | "false" | "off" | "0" => Some(false),
        _ => None,
    }
}

async fn fetch_profiles(
    state: &AppState,
    request_id: &str,
    username: String,
    params: ProfileParams,
) -> Result<ProviderProfiles, ApiError> {
    let query = params.into_query(username)?;
    tracing::debug!(
        request_id,
        github = query.github_name(),
        bitbucket = query.bitbucket_name(),
        bitbucket_team = query.bitbucket_team,
        "collecting profiles"
    );

    collect_profiles(state.github.as_ref(), state.bitbucket.as_ref(), &query)
        .await
        .map_err(|e| map_source_error(request_id, &e))
}

/// Unwraps the path and query extractors, turning axum's plain-text
/// rejections into JSON `400` errors.
fn request_parts(
    path: Result<Path<String>, PathRejection>,
    query: Result<Query<ProfileParams>, QueryRejection>,
) -> Result<(String, ProfileParams), ApiError> {
    let Path(username) =
        path.map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.body_text()))?;
    let Query(params) =
        query.map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.body_text()))?;
    Ok((username, params))
}

/// `GET /v1/profile/{username}`: both provider profiles side by side.
pub(super) async fn get_profiles(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    path: Result<Path<String>, PathRejection>,
    query: Result<Query<ProfileParams>, QueryRejection>,
) -> Result<Json<ProviderProfiles>, ApiError> {
    let (username, params) = request_parts(path, query)?;
    fetch_profiles(&state, &req_id.0, username, params)
        .await
        .map(Json)
}

/// `GET /v2/profile/{username}`: one record combining both providers.
pub(super) async fn get_merged_profile(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    path: Result<Path<String>, PathRejection>,
    query: Result<Query<ProfileParams>, QueryRejection>,
) -> Result<Json<ProfileRecord>, ApiError> {
    let (username, params) = request_parts(path, query)?;
    let profiles = fetch_profiles(&state, &req_id.0, username, params).await?;
    Ok(Json(profiles.merged()))
}
