//! anonn-backend
//!
//! Thin token-exchange proxy for the OAuth popup. Client secrets stay on the
//! server; the browser only ever sends the authorization code and PKCE
//! verifier, and reads the provider profile through the same origin.
//!
//! - `POST /api/twitter/token`, `POST /api/github/token`
//! - `GET /api/twitter/user`, `GET /api/github/user`
//! - `GET /health`

pub mod config;
pub mod error;

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{info, warn};

pub use config::{ClientCredentials, ProxyConfig, UpstreamEndpoints};
pub use error::ApiError;

const USER_AGENT: &str = concat!("anonn-backend/", env!("CARGO_PKG_VERSION"));

/// Application state
#[derive(Clone)]
pub struct AppState {
    config: Arc<ProxyConfig>,
    client: Client,
}

impl AppState {
    pub fn new(config: ProxyConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(config.upstream_timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            config: Arc::new(config),
            client,
        })
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }
}

fn cors_layer(config: &ProxyConfig) -> CorsLayer {
    let origin = match config
        .allowed_origin
        .as_deref()
        .and_then(|origin| HeaderValue::from_str(origin).ok())
    {
        Some(origin) => AllowOrigin::exact(origin),
        None => AllowOrigin::from(Any),
    };
    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

/// Build the router.
pub fn app_router(state: AppState) -> Router {
    let cors = cors_layer(state.config());
    Router::new()
        .route("/health", get(health))
        .route("/api/twitter/token", post(twitter_token))
        .route("/api/github/token", post(github_token))
        .route("/api/twitter/user", get(twitter_user))
        .route("/api/github/user", get(github_user))
        .layer(cors)
        .with_state(state)
}

// ═══════════════════════════════════════════════════════════════════════════════
// HANDLERS
// ═══════════════════════════════════════════════════════════════════════════════

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "twitter_configured": state.config.twitter.is_some(),
        "github_configured": state.config.github.is_some(),
    }))
}

/// Token-exchange request body posted by the callback page.
#[derive(Debug, Default, Deserialize)]
pub struct TokenRequest {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
    #[serde(default)]
    pub code_verifier: Option<String>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn parse_body(body: Result<Json<TokenRequest>, JsonRejection>) -> Result<TokenRequest, ApiError> {
    body.map(|Json(request)| request)
        .map_err(|rejection| ApiError::bad_request(rejection.body_text()))
}

async fn twitter_token(
    State(state): State<AppState>,
    body: Result<Json<TokenRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let request = parse_body(body)?;
    let (Some(code), Some(redirect_uri), Some(code_verifier)) = (
        present(&request.code),
        present(&request.redirect_uri),
        present(&request.code_verifier),
    ) else {
        return Err(ApiError::bad_request(
            "Missing code, redirect_uri, or code_verifier",
        ));
    };
    let creds = state
        .config
        .twitter
        .as_ref()
        .ok_or_else(|| ApiError::not_configured("Twitter"))?;

    let form = [
        ("code", code),
        ("grant_type", "authorization_code"),
        ("client_id", creds.client_id.as_str()),
        ("redirect_uri", redirect_uri),
        ("code_verifier", code_verifier),
    ];
    let response = state
        .client
        .post(&state.config.upstream.twitter_token)
        .basic_auth(&creds.client_id, Some(&creds.client_secret))
        .form(&form)
        .send()
        .await?;
    relay("twitter", response, "Token exchange failed").await
}

async fn github_token(
    State(state): State<AppState>,
    body: Result<Json<TokenRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let request = parse_body(body)?;
    let (Some(code), Some(redirect_uri)) = (present(&request.code), present(&request.redirect_uri))
    else {
        return Err(ApiError::bad_request("Missing code or redirect_uri"));
    };
    let creds = state
        .config
        .github
        .as_ref()
        .ok_or_else(|| ApiError::not_configured("GitHub"))?;

    let mut form = vec![
        ("client_id", creds.client_id.as_str()),
        ("client_secret", creds.client_secret.as_str()),
        ("code", code),
        ("redirect_uri", redirect_uri),
    ];
    if let Some(verifier) = present(&request.code_verifier) {
        form.push(("code_verifier", verifier));
    }
    let response = state
        .client
        .post(&state.config.upstream.github_token)
        .header(reqwest::header::ACCEPT, "application/json")
        .form(&form)
        .send()
        .await?;
    relay("github", response, "Token exchange failed").await
}

async fn twitter_user(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Value>, ApiError> {
    let token = bearer_token(&headers)?;
    let response = state
        .client
        .get(&state.config.upstream.twitter_user)
        .bearer_auth(token)
        .send()
        .await?;
    relay("twitter", response, "Twitter API request failed").await
}

async fn github_user(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Value>, ApiError> {
    let token = bearer_token(&headers)?;
    let response = state
        .client
        .get(&state.config.upstream.github_user)
        .bearer_auth(token)
        .header(reqwest::header::ACCEPT, "application/vnd.github.v3+json")
        .send()
        .await?;
    relay("github", response, "GitHub API request failed").await
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .filter(|token| !token.is_empty())
        .ok_or_else(ApiError::unauthorized)
}

/// Pass a provider response through, mapping failures to `{ error, details }`.
async fn relay(provider: &str, response: reqwest::Response, fallback: &str) -> Result<Json<Value>, ApiError> {
    let status = StatusCode::from_u16(response.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let body: Value = response.json().await?;
    if status.is_success() {
        info!(provider, "Upstream request succeeded");
        return Ok(Json(body));
    }

    let message = body
        .get("error")
        .or_else(|| body.get("message"))
        .and_then(Value::as_str)
        .unwrap_or(fallback)
        .to_string();
    warn!(provider, %status, error = %message, "Upstream request failed");
    Err(ApiError::upstream(status, message, body))
}

/// Bind and serve until ctrl-c.
pub async fn serve(config: ProxyConfig) -> anyhow::Result<()> {
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.port));
    let app = app_router(AppState::new(config)?);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("OAuth proxy listening on {}", addr);
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to install ctrl-c handler");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
