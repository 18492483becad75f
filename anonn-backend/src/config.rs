use std::env;
use std::time::Duration;

use anyhow::{Context, Result};

pub const DEFAULT_PORT: u16 = 8787;
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(15);

/// OAuth application credentials for one provider.
#[derive(Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Provider endpoints the proxy forwards to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpstreamEndpoints {
    pub twitter_token: String,
    pub twitter_user: String,
    pub github_token: String,
    pub github_user: String,
}

impl Default for UpstreamEndpoints {
    fn default() -> Self {
        Self {
            twitter_token: "https://api.twitter.com/2/oauth2/token".into(),
            twitter_user: "https://api.twitter.com/2/users/me?user.fields=created_at".into(),
            github_token: "https://github.com/login/oauth/access_token".into(),
            github_user: "https://api.github.com/user".into(),
        }
    }
}

impl UpstreamEndpoints {
    /// Point every endpoint at `base`, keeping the provider paths. Used by tests.
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            twitter_token: format!("{base}/2/oauth2/token"),
            twitter_user: format!("{base}/2/users/me?user.fields=created_at"),
            github_token: format!("{base}/login/oauth/access_token"),
            github_user: format!("{base}/user"),
        }
    }
}

/// Proxy configuration.
#[derive(Clone, Debug)]
pub struct ProxyConfig {
    /// Listen port.
    pub port: u16,
    /// Allowed CORS origin. `None` allows any origin.
    pub allowed_origin: Option<String>,
    pub twitter: Option<ClientCredentials>,
    pub github: Option<ClientCredentials>,
    pub upstream: UpstreamEndpoints,
    /// Timeout for each upstream request.
    pub upstream_timeout: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            allowed_origin: None,
            twitter: None,
            github: None,
            upstream: UpstreamEndpoints::default(),
            upstream_timeout: DEFAULT_UPSTREAM_TIMEOUT,
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.is_empty())
}

fn credentials(id_var: &str, secret_var: &str) -> Option<ClientCredentials> {
    Some(ClientCredentials {
        client_id: non_empty_var(id_var)?,
        client_secret: non_empty_var(secret_var)?,
    })
}

impl ProxyConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let port = match non_empty_var("OAUTH_PORT") {
            Some(port) => port.parse().context("OAUTH_PORT must be a port number")?,
            None => DEFAULT_PORT,
        };

        let allowed_origin = non_empty_var("ALLOWED_ORIGIN").filter(|origin| origin != "*");

        let defaults = UpstreamEndpoints::default();
        let upstream = UpstreamEndpoints {
            twitter_token: non_empty_var("TWITTER_TOKEN_URL").unwrap_or(defaults.twitter_token),
            twitter_user: non_empty_var("TWITTER_USER_URL").unwrap_or(defaults.twitter_user),
            github_token: non_empty_var("GITHUB_TOKEN_URL").unwrap_or(defaults.github_token),
            github_user: non_empty_var("GITHUB_USER_URL").unwrap_or(defaults.github_user),
        };

        let upstream_timeout = env::var("OAUTH_UPSTREAM_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_UPSTREAM_TIMEOUT);

        Ok(Self {
            port,
            allowed_origin,
            twitter: credentials("TWITTER_CLIENT_ID", "TWITTER_CLIENT_SECRET"),
            github: credentials("GITHUB_CLIENT_ID", "GITHUB_CLIENT_SECRET"),
            upstream,
            upstream_timeout,
        })
    }
}
