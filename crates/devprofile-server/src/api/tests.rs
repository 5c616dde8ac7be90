use axum::body::{to_bytes, Body};
use axum::http::Request;
use devprofile_core::AppConfig;
use tower::ServiceExt;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::profile::parse_flag;
use super::*;

fn test_config(github: &MockServer, bitbucket: &MockServer) -> AppConfig {
    AppConfig {
        bind_addr: "127.0.0.1:0".parse().expect("socket addr"),
        log_level: "debug".to_owned(),
        github_base_url: github.uri(),
        github_token: None,
        bitbucket_base_url: bitbucket.uri(),
        request_timeout_secs: 5,
        user_agent: "devprofile-test/0.1".to_owned(),
        max_concurrent_requests: 2,
    }
}

fn test_app(github: &MockServer, bitbucket: &MockServer) -> Router {
    let state = AppState::from_config(&test_config(github, bitbucket)).expect("app state");
    build_app(state)
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).expect("request"))
        .await
        .expect("response");
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    let json = serde_json::from_slice(&body).expect("json parse");
    (status, json)
}

async fn mount_github_user(server: &MockServer, login: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/users/{login}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "login": login,
            "followers": 1,
            "following": 4
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/users/{login}/starred")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{}])))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/users/{login}/repos")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(server)
        .await;
}

async fn mount_bitbucket_account(server: &MockServer, kind: &str, name: &str) {
    let uri = server.uri();
    let account = serde_json::json!({
        "username": name,
        "links": {
            "followers": { "href": format!("{uri}/{kind}/{name}/followers") },
            "following": { "href": format!("{uri}/{kind}/{name}/following") },
            "repositories": { "href": format!("{uri}/repositories/{name}") }
        }
    });
    let responses = [
        (format!("/{kind}/{name}"), account),
        (
            format!("/{kind}/{name}/followers"),
            serde_json::json!({ "size": 2 }),
        ),
        (
            format!("/{kind}/{name}/following"),
            serde_json::json!({ "size": 0 }),
        ),
        (
            format!("/repositories/{name}"),
            serde_json::json!({ "values": [] }),
        ),
    ];
    for (at, body) in responses {
        Mock::given(method("GET"))
            .and(path(at))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }
}

async fn mount_nothing_expected(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path_regex(".*"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(server)
        .await;
}

#[test]
fn parse_flag_accepts_common_spellings() {
    for raw in ["y", "YES", "t", "True", "on", "1"] {
        assert_eq!(parse_flag(raw), Some(true), "{raw}");
    }
    for raw in ["n", "No", "f", "FALSE", "off", "0"] {
        assert_eq!(parse_flag(raw), Some(false), "{raw}");
    }
    assert_eq!(parse_flag("maybe"), None);
    assert_eq!(parse_flag(""), None);
}

#[test]
fn api_error_serializes_message_only() {
    let err = ApiError::new(StatusCode::BAD_GATEWAY, "boom");
    let json = serde_json::to_value(&err).expect("serialize");
    assert_eq!(json, serde_json::json!({ "error": "boom" }));
    assert_eq!(err.into_response().status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn health_returns_ok() {
    let github = MockServer::start().await;
    let bitbucket = MockServer::start().await;

    let (status, json) = get_json(test_app(&github, &bitbucket), "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, serde_json::json!({ "status": "ok" }));
}

#[tokio::test]
async fn v1_reports_absent_provider_as_null() {
    let github = MockServer::start().await;
    let bitbucket = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/octo"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&github)
        .await;
    mount_bitbucket_account(&bitbucket, "teams", "octo").await;

    let (status, json) = get_json(test_app(&github, &bitbucket), "/v1/profile/octo").await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["github"].is_null());
    assert_eq!(json["bitbucket"]["followers"], 2);
    assert_eq!(json["bitbucket"]["repositories"], 0);
    assert_eq!(json["bitbucket"]["watchers"], 0);
}

#[tokio::test]
async fn v2_merges_both_providers() {
    let github = MockServer::start().await;
    let bitbucket = MockServer::start().await;
    mount_github_user(&github, "octo").await;
    mount_bitbucket_account(&bitbucket, "teams", "octo").await;

    let (status, json) = get_json(test_app(&github, &bitbucket), "/v2/profile/octo").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["followers"], 3);
    assert_eq!(json["following"], 4);
    assert_eq!(json["starred"], 1);
    assert_eq!(
        json["repositories"],
        serde_json::json!({ "original": 0, "forked": 0 })
    );
    assert!(json.get("watchers").is_none());
}

#[tokio::test]
async fn per_provider_overrides_and_individual_lookup() {
    let github = MockServer::start().await;
    let bitbucket = MockServer::start().await;
    mount_github_user(&github, "gh-octo").await;
    mount_bitbucket_account(&bitbucket, "users", "bb-octo").await;

    let (status, json) = get_json(
        test_app(&github, &bitbucket),
        "/v1/profile/octo?github_username=gh-octo&bitbucket_username=bb-octo&bitbucket_team=No",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["github"]["following"], 4);
    assert_eq!(json["bitbucket"]["followers"], 2);
}

#[tokio::test]
async fn invalid_team_flag_is_bad_request() {
    let github = MockServer::start().await;
    let bitbucket = MockServer::start().await;
    mount_nothing_expected(&github).await;
    mount_nothing_expected(&bitbucket).await;

    let (status, json) = get_json(
        test_app(&github, &bitbucket),
        "/v1/profile/octo?bitbucket_team=maybe",
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"]
        .as_str()
        .is_some_and(|msg| msg.contains("bitbucket_team")));
}

#[tokio::test]
async fn malformed_query_is_json_bad_request() {
    let github = MockServer::start().await;
    let bitbucket = MockServer::start().await;
    mount_nothing_expected(&github).await;
    mount_nothing_expected(&bitbucket).await;

    let response = test_app(&github, &bitbucket)
        .oneshot(
            Request::builder()
                .uri("/v1/profile/octo?bitbucket_team=1&bitbucket_team=0")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok()),
        Some("application/json")
    );
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    let json: serde_json::Value = serde_json::from_slice(&body).expect("json parse");
    assert!(json["error"]
        .as_str()
        .is_some_and(|msg| msg.contains("bitbucket_team")));
}

#[tokio::test]
async fn github_rate_limit_is_429_and_skips_bitbucket() {
    let github = MockServer::start().await;
    let bitbucket = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/octo"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&github)
        .await;
    mount_nothing_expected(&bitbucket).await;

    let (status, json) = get_json(test_app(&github, &bitbucket), "/v2/profile/octo").await;

    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(json, serde_json::json!({ "error": "Exceeded GitHub rate limit" }));
}

#[tokio::test]
async fn rejected_credentials_are_401() {
    let github = MockServer::start().await;
    let bitbucket = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/octo"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&github)
        .await;

    let (status, json) = get_json(test_app(&github, &bitbucket), "/v1/profile/octo").await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(
        json,
        serde_json::json!({ "error": "Cannot authenticate with given credentials" })
    );
}

#[tokio::test]
async fn bitbucket_unauthorized_is_bad_gateway() {
    let github = MockServer::start().await;
    let bitbucket = MockServer::start().await;
    mount_github_user(&github, "octo").await;
    Mock::given(method("GET"))
        .and(path("/teams/octo"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&bitbucket)
        .await;

    let (status, json) = get_json(test_app(&github, &bitbucket), "/v1/profile/octo").await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_ne!(json["error"], "Cannot authenticate with given credentials");
}

#[tokio::test]
async fn upstream_failure_is_bad_gateway() {
    let github = MockServer::start().await;
    let bitbucket = MockServer::start().await;
    mount_github_user(&github, "octo").await;
    Mock::given(method("GET"))
        .and(path("/teams/octo"))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(serde_json::json!({ "error": "down" })),
        )
        .mount(&bitbucket)
        .await;

    let (status, json) = get_json(test_app(&github, &bitbucket), "/v1/profile/octo").await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn unknown_route_is_json_404() {
    let github = MockServer::start().await;
    let bitbucket = MockServer::start().await;

    let (status, json) = get_json(test_app(&github, &bitbucket), "/v3/profile/octo").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json, serde_json::json!({ "error": "Not found" }));
}
