//! HTTP client for the token-exchange proxy.
//!
//! Authorization codes are single-use, so nothing here retries.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::callback::{ProviderApi, ProviderProfile};
use crate::error::OAuthError;
use crate::provider::{OAuthConfig, Provider};

// ═══════════════════════════════════════════════════════════════════════════════
// WIRE TYPES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Serialize)]
struct TokenRequest<'a> {
    code: &'a str,
    redirect_uri: &'a str,
    code_verifier: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: Option<String>,
    message: Option<String>,
}

#[derive(Deserialize)]
struct TwitterUserResponse {
    data: TwitterUser,
}

#[derive(Deserialize)]
struct TwitterUser {
    created_at: DateTime<Utc>,
    username: Option<String>,
}

#[derive(Deserialize)]
struct GithubUser {
    created_at: DateTime<Utc>,
    public_repos: Option<u64>,
    login: Option<String>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// CLIENT
// ═══════════════════════════════════════════════════════════════════════════════

pub struct HttpProviderApi {
    base_url: String,
    http_client: reqwest::Client,
}

impl HttpProviderApi {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, OAuthError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(OAuthError::ApiBaseNotConfigured);
        }
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OAuthError::TokenExchange {
                provider: Provider::Twitter,
                message: e.to_string(),
            })?;
        Ok(Self {
            base_url,
            http_client,
        })
    }

    pub fn from_config(config: &OAuthConfig) -> Result<Self, OAuthError> {
        Self::new(config.api_base_url()?, Duration::from_secs(30))
    }

    fn endpoint(&self, provider: Provider, path: &str) -> String {
        format!("{}/api/{}/{}", self.base_url, provider.as_str(), path)
    }
}

async fn error_text(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorResponse>(&body) {
        Ok(parsed) => parsed
            .error
            .or(parsed.message)
            .unwrap_or_else(|| status.to_string()),
        Err(_) if body.is_empty() => status.to_string(),
        Err(_) => format!("HTTP {status}: {body}"),
    }
}

#[async_trait]
impl ProviderApi for HttpProviderApi {
    async fn exchange_code(
        &self,
        provider: Provider,
        code: &str,
        redirect_uri: &str,
        code_verifier: &str,
    ) -> Result<String, OAuthError> {
        let url = self.endpoint(provider, "token");
        debug!(%provider, %url, "Exchanging authorization code");
        let fail = |message: String| OAuthError::TokenExchange { provider, message };

        let response = self
            .http_client
            .post(&url)
            .json(&TokenRequest {
                code,
                redirect_uri,
                code_verifier,
            })
            .send()
            .await
            .map_err(|e| fail(e.to_string()))?;

        if !response.status().is_success() {
            return Err(fail(error_text(response).await));
        }

        let body: TokenResponse = response.json().await.map_err(|e| fail(e.to_string()))?;
        match (body.access_token, body.error) {
            (Some(token), _) if !token.is_empty() => Ok(token),
            (_, Some(error)) => Err(fail(error)),
            _ => Err(fail("response did not contain an access token".into())),
        }
    }

    async fn fetch_profile(
        &self,
        provider: Provider,
        access_token: &str,
    ) -> Result<ProviderProfile, OAuthError> {
        let url = self.endpoint(provider, "user");
        let fail = |message: String| OAuthError::ProfileFetch { provider, message };

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| fail(e.to_string()))?;

        if !response.status().is_success() {
            return Err(fail(error_text(response).await));
        }

        match provider {
            Provider::Twitter => {
                let body: TwitterUserResponse =
                    response.json().await.map_err(|e| fail(e.to_string()))?;
                Ok(ProviderProfile {
                    created_at: body.data.created_at,
                    public_repos: None,
                    username: body.data.username,
                })
            }
            Provider::GitHub => {
                let body: GithubUser = response.json().await.map_err(|e| fail(e.to_string()))?;
                Ok(ProviderProfile {
                    created_at: body.created_at,
                    public_repos: Some(body.public_repos.unwrap_or(0)),
                    username: body.login,
                })
            }
        }
    }
}
