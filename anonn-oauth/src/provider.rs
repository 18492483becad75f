//! OAuth providers and client configuration.

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::OAuthError;

pub const DEFAULT_APP_ORIGIN: &str = "http://localhost:5173";
pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(600);

const ALPHANUMERIC: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
const UNRESERVED: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

/// A social account provider. `Twitter` is provider A (account age only),
/// `GitHub` is provider B (account age and public repository count).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Twitter,
    #[serde(rename = "github")]
    GitHub,
}

impl Provider {
    /// Path segment used in redirect and proxy URLs.
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Twitter => "twitter",
            Provider::GitHub => "github",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Provider::Twitter => "Twitter",
            Provider::GitHub => "GitHub",
        }
    }

    pub fn authorize_endpoint(self) -> &'static str {
        match self {
            Provider::Twitter => "https://x.com/i/oauth2/authorize",
            Provider::GitHub => "https://github.com/login/oauth/authorize",
        }
    }

    pub fn scope(self) -> &'static str {
        match self {
            Provider::Twitter => "tweet.read users.read",
            Provider::GitHub => "read:user user:email",
        }
    }

    /// Twitter rejects authorization requests without `response_type=code`.
    pub fn requires_response_type(self) -> bool {
        matches!(self, Provider::Twitter)
    }

    /// Alphabet for state and verifier strings.
    pub fn token_alphabet(self) -> &'static [u8] {
        match self {
            Provider::Twitter => UNRESERVED,
            Provider::GitHub => ALPHANUMERIC,
        }
    }

    /// `type` tag of the success message posted back to the opener.
    pub fn success_message_type(self) -> &'static str {
        match self {
            Provider::Twitter => "TWITTER_OAUTH_SUCCESS",
            Provider::GitHub => "GITHUB_OAUTH_SUCCESS",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "twitter" | "x" => Ok(Provider::Twitter),
            "github" => Ok(Provider::GitHub),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Client-side OAuth configuration.
#[derive(Clone, Debug)]
pub struct OAuthConfig {
    /// Twitter OAuth 2.0 client id.
    pub twitter_client_id: Option<String>,
    /// GitHub OAuth app client id.
    pub github_client_id: Option<String>,
    /// Origin of the application; callbacks and messages must come from here.
    pub app_origin: String,
    /// Redirect base; `{redirect_base}/{provider}` is registered with each provider.
    pub redirect_base: String,
    /// Base URL of the token-exchange proxy.
    pub api_base_url: Option<String>,
    /// How long the opener waits for the popup before giving up.
    pub callback_timeout: Duration,
}

impl OAuthConfig {
    pub fn new(app_origin: impl Into<String>) -> Self {
        let app_origin = app_origin.into().trim_end_matches('/').to_string();
        Self {
            twitter_client_id: None,
            github_client_id: None,
            redirect_base: format!("{app_origin}/oauth/callback"),
            app_origin,
            api_base_url: None,
            callback_timeout: DEFAULT_CALLBACK_TIMEOUT,
        }
    }

    pub fn with_client_id(mut self, provider: Provider, client_id: impl Into<String>) -> Self {
        let client_id = Some(client_id.into());
        match provider {
            Provider::Twitter => self.twitter_client_id = client_id,
            Provider::GitHub => self.github_client_id = client_id,
        }
        self
    }

    pub fn with_api_base_url(mut self, api_base_url: impl Into<String>) -> Self {
        self.api_base_url = Some(api_base_url.into().trim_end_matches('/').to_string());
        self
    }

    pub fn with_callback_timeout(mut self, timeout: Duration) -> Self {
        self.callback_timeout = timeout;
        self
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let app_origin =
            env::var("ANONN_APP_ORIGIN").unwrap_or_else(|_| DEFAULT_APP_ORIGIN.to_string());
        Url::parse(&app_origin).context("ANONN_APP_ORIGIN must be an absolute URL")?;

        let mut config = Self::new(app_origin);
        config.twitter_client_id = non_empty_var("ANONN_TWITTER_CLIENT_ID");
        config.github_client_id = non_empty_var("ANONN_GITHUB_CLIENT_ID");
        config.api_base_url = non_empty_var("ANONN_API_BASE_URL")
            .map(|base| base.trim_end_matches('/').to_string());
        if let Some(base) = non_empty_var("ANONN_OAUTH_REDIRECT_BASE") {
            config.redirect_base = base.trim_end_matches('/').to_string();
        }
        config.callback_timeout = env::var("ANONN_OAUTH_CALLBACK_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_CALLBACK_TIMEOUT);

        Ok(config)
    }

    /// Client id for `provider`; missing ids fail fast before any window opens.
    pub fn client_id(&self, provider: Provider) -> Result<&str, OAuthError> {
        let id = match provider {
            Provider::Twitter => self.twitter_client_id.as_deref(),
            Provider::GitHub => self.github_client_id.as_deref(),
        };
        id.filter(|id| !id.is_empty())
            .ok_or(OAuthError::ProviderNotConfigured(provider))
    }

    pub fn redirect_uri(&self, provider: Provider) -> String {
        format!("{}/{}", self.redirect_base, provider.as_str())
    }

    pub fn api_base_url(&self) -> Result<&str, OAuthError> {
        self.api_base_url
            .as_deref()
            .filter(|base| !base.is_empty())
            .ok_or(OAuthError::ApiBaseNotConfigured)
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redirect_uri_per_provider() {
        let config = OAuthConfig::new("https://app.example/");
        assert_eq!(
            config.redirect_uri(Provider::Twitter),
            "https://app.example/oauth/callback/twitter"
        );
        assert_eq!(
            config.redirect_uri(Provider::GitHub),
            "https://app.example/oauth/callback/github"
        );
    }

    #[test]
    fn test_missing_client_id_is_configuration_error() {
        let config = OAuthConfig::new("https://app.example").with_client_id(Provider::GitHub, "gh");
        assert!(matches!(
            config.client_id(Provider::Twitter),
            Err(OAuthError::ProviderNotConfigured(Provider::Twitter))
        ));
        assert_eq!(config.client_id(Provider::GitHub).unwrap(), "gh");

        let empty = OAuthConfig::new("https://app.example").with_client_id(Provider::Twitter, "");
        assert!(empty.client_id(Provider::Twitter).is_err());
    }

    #[test]
    fn test_provider_parse_and_serde() {
        assert_eq!("X".parse::<Provider>().unwrap(), Provider::Twitter);
        assert_eq!("GitHub".parse::<Provider>().unwrap(), Provider::GitHub);
        assert!("gitlab".parse::<Provider>().is_err());
        assert_eq!(serde_json::to_string(&Provider::GitHub).unwrap(), "\"github\"");
    }
}
