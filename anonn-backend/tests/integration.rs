//! Integration tests for the OAuth token-exchange proxy.

use std::collections::HashMap;
use std::time::Duration;

use anonn_backend::{app_router, AppState, ClientCredentials, ProxyConfig, UpstreamEndpoints};
use anonn_oauth::{HttpProviderApi, Provider, ProviderApi};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use axum_test::TestServer;
use serde_json::{json, Value};

/// Stand-in for the Twitter and GitHub endpoints.
fn upstream() -> Router {
    Router::new()
        .route(
            "/2/oauth2/token",
            post(|headers: HeaderMap, Form(form): Form<HashMap<String, String>>| async move {
                let basic = headers
                    .get(header::AUTHORIZATION)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                let ok = basic.starts_with("Basic ")
                    && form.get("grant_type").map(String::as_str) == Some("authorization_code")
                    && form.get("client_id").map(String::as_str) == Some("tw-id")
                    && form.get("code_verifier").map(String::as_str) == Some("verifier");
                match form.get("code").map(String::as_str) {
                    Some("good") if ok => (
                        StatusCode::OK,
                        Json(json!({ "access_token": "tw-token", "token_type": "bearer" })),
                    ),
                    _ => (
                        StatusCode::BAD_REQUEST,
                        Json(json!({ "error": "invalid_request", "error_description": "bad code" })),
                    ),
                }
            }),
        )
        .route(
            "/2/users/me",
            get(|headers: HeaderMap| async move {
                match headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
                    Some("Bearer tw-token") => (
                        StatusCode::OK,
                        Json(json!({ "data": { "created_at": "2011-03-04T05:06:07.000Z", "username": "bird" } })),
                    ),
                    _ => (StatusCode::UNAUTHORIZED, Json(json!({ "title": "Unauthorized" }))),
                }
            }),
        )
        .route(
            "/login/oauth/access_token",
            post(|Form(form): Form<HashMap<String, String>>| async move {
                // GitHub reports bad codes with a 200 and an error field.
                if form.get("client_secret").map(String::as_str) != Some("gh-secret") {
                    return (StatusCode::UNAUTHORIZED, Json(json!({ "message": "Bad credentials" })));
                }
                match form.get("code").map(String::as_str) {
                    Some("good") => (StatusCode::OK, Json(json!({ "access_token": "gh-token" }))),
                    _ => (StatusCode::OK, Json(json!({ "error": "bad_verification_code" }))),
                }
            }),
        )
        .route(
            "/user",
            get(|headers: HeaderMap| async move {
                let accept = headers
                    .get(header::ACCEPT)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                match headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
                    Some("Bearer gh-token") if accept.contains("github") => (
                        StatusCode::OK,
                        Json(json!({ "login": "octo", "created_at": "2015-06-01T00:00:00Z", "public_repos": 12 })),
                    ),
                    _ => (StatusCode::UNAUTHORIZED, Json(json!({ "message": "Bad credentials" }))),
                }
            }),
        )
}

async fn spawn(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn config(upstream_base: &str) -> ProxyConfig {
    ProxyConfig {
        twitter: Some(ClientCredentials {
            client_id: "tw-id".into(),
            client_secret: "tw-secret".into(),
        }),
        github: Some(ClientCredentials {
            client_id: "gh-id".into(),
            client_secret: "gh-secret".into(),
        }),
        upstream: UpstreamEndpoints::with_base(upstream_base),
        upstream_timeout: Duration::from_secs(5),
        ..ProxyConfig::default()
    }
}

async fn create_server() -> TestServer {
    let base = spawn(upstream()).await;
    let state = AppState::new(config(&base)).expect("should build state");
    TestServer::new(app_router(state)).expect("should create test server")
}

fn bearer(token: &str) -> (HeaderName, HeaderValue) {
    (
        header::AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
    )
}

#[tokio::test]
async fn test_health_endpoint() {
    let server = create_server().await;
    let response = server.get("/health").await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["twitter_configured"], true);
}

#[tokio::test]
async fn test_twitter_token_exchange() {
    let server = create_server().await;
    let response = server
        .post("/api/twitter/token")
        .json(&json!({
            "code": "good",
            "redirect_uri": "https://app.anonn.test/oauth/callback/twitter",
            "code_verifier": "verifier",
        }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["access_token"], "tw-token");
}

#[tokio::test]
async fn test_twitter_token_requires_verifier() {
    let server = create_server().await;
    let response = server
        .post("/api/twitter/token")
        .json(&json!({ "code": "good", "redirect_uri": "https://app/cb" }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"], "Missing code, redirect_uri, or code_verifier");
    assert_eq!(body["error_code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_github_token_requires_code() {
    let server = create_server().await;
    let response = server
        .post("/api/github/token")
        .json(&json!({ "redirect_uri": "https://app/cb" }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"], "Missing code or redirect_uri");
}

#[tokio::test]
async fn test_upstream_rejection_is_relayed() {
    let server = create_server().await;
    let response = server
        .post("/api/twitter/token")
        .json(&json!({
            "code": "stale",
            "redirect_uri": "https://app/cb",
            "code_verifier": "verifier",
        }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"], "invalid_request");
    assert_eq!(body["details"]["error_description"], "bad code");
}

#[tokio::test]
async fn test_unconfigured_provider() {
    let base = spawn(upstream()).await;
    let config = ProxyConfig {
        github: None,
        ..config(&base)
    };
    let server = TestServer::new(app_router(AppState::new(config).unwrap())).unwrap();

    let response = server
        .post("/api/github/token")
        .json(&json!({ "code": "good", "redirect_uri": "https://app/cb" }))
        .await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json();
    assert_eq!(body["error"], "GitHub OAuth client not configured");
}

#[tokio::test]
async fn test_user_requires_bearer() {
    let server = create_server().await;

    let response = server.get("/api/github/user").await;
    response.assert_status(StatusCode::UNAUTHORIZED);
    let body: Value = response.json();
    assert_eq!(body["error"], "Missing or invalid authorization header");

    let response = server
        .get("/api/twitter/user")
        .add_header(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_user_profiles_pass_through() {
    let server = create_server().await;

    let (name, value) = bearer("gh-token");
    let response = server.get("/api/github/user").add_header(name, value).await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["public_repos"], 12);

    let (name, value) = bearer("tw-token");
    let response = server.get("/api/twitter/user").add_header(name, value).await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"]["username"], "bird");
}

#[tokio::test]
async fn test_provider_api_through_proxy() {
    let upstream_base = spawn(upstream()).await;
    let state = AppState::new(config(&upstream_base)).unwrap();
    let proxy_base = spawn(app_router(state)).await;
    let api = HttpProviderApi::new(proxy_base, Duration::from_secs(5)).unwrap();

    let token = api
        .exchange_code(Provider::GitHub, "good", "https://app/cb/github", "verifier")
        .await
        .unwrap();
    let profile = api.fetch_profile(Provider::GitHub, &token).await.unwrap();
    assert_eq!(profile.public_repos, Some(12));
    assert_eq!(profile.username.as_deref(), Some("octo"));

    let token = api
        .exchange_code(Provider::Twitter, "good", "https://app/cb/twitter", "verifier")
        .await
        .unwrap();
    let profile = api.fetch_profile(Provider::Twitter, &token).await.unwrap();
    assert_eq!(profile.created_at.to_rfc3339(), "2011-03-04T05:06:07+00:00");
}

#[tokio::test]
async fn test_github_error_body_surfaces_through_provider_api() {
    let upstream_base = spawn(upstream()).await;
    let state = AppState::new(config(&upstream_base)).unwrap();
    let proxy_base = spawn(app_router(state)).await;
    let api = HttpProviderApi::new(proxy_base, Duration::from_secs(5)).unwrap();

    let err = api
        .exchange_code(Provider::GitHub, "stale", "https://app/cb/github", "verifier")
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "GitHub token exchange failed: bad_verification_code"
    );
}
