//! Transient per-handshake OAuth session.
//!
//! The session is created together with the authorization URL and handed to
//! whoever services the callback. Consuming it is the only way to complete the
//! flow, and the secrets are wiped when it drops, on success or failure alike.

use std::fmt;

use rand::Rng;
use url::Url;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::OAuthError;
use crate::pkce::{code_challenge, random_string, STATE_LEN, VERIFIER_LEN};
use crate::provider::{OAuthConfig, Provider};

#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct OAuthSession {
    #[zeroize(skip)]
    provider: Provider,
    state: String,
    code_verifier: String,
}

impl OAuthSession {
    pub fn new(provider: Provider, state: impl Into<String>, code_verifier: impl Into<String>) -> Self {
        Self {
            provider,
            state: state.into(),
            code_verifier: code_verifier.into(),
        }
    }

    pub fn generate<R: Rng + ?Sized>(provider: Provider, rng: &mut R) -> Self {
        let alphabet = provider.token_alphabet();
        Self::new(
            provider,
            random_string(rng, alphabet, STATE_LEN),
            random_string(rng, alphabet, VERIFIER_LEN),
        )
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    pub fn code_verifier(&self) -> &str {
        &self.code_verifier
    }

    pub fn code_challenge(&self) -> String {
        code_challenge(&self.code_verifier)
    }
}

impl fmt::Debug for OAuthSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthSession")
            .field("provider", &self.provider)
            .field("state", &"<redacted>")
            .field("code_verifier", &"<redacted>")
            .finish()
    }
}

/// Authorization URL plus the session that must accompany its callback.
#[derive(Debug)]
pub struct AuthorizationRequest {
    pub url: Url,
    pub session: OAuthSession,
}

impl AuthorizationRequest {
    pub fn provider(&self) -> Provider {
        self.session.provider()
    }
}

/// Build the provider authorization URL with fresh state and PKCE material.
pub fn build_authorization_request(
    config: &OAuthConfig,
    provider: Provider,
) -> Result<AuthorizationRequest, OAuthError> {
    let client_id = config.client_id(provider)?;
    let session = OAuthSession::generate(provider, &mut rand::thread_rng());
    let challenge = session.code_challenge();
    let redirect_uri = config.redirect_uri(provider);

    let mut params: Vec<(&str, &str)> = Vec::with_capacity(7);
    if provider.requires_response_type() {
        params.push(("response_type", "code"));
    }
    params.extend([
        ("client_id", client_id),
        ("redirect_uri", redirect_uri.as_str()),
        ("scope", provider.scope()),
        ("state", session.state()),
        ("code_challenge", challenge.as_str()),
        ("code_challenge_method", "S256"),
    ]);

    let url = Url::parse_with_params(provider.authorize_endpoint(), &params)?;
    Ok(AuthorizationRequest { url, session })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn query(url: &Url) -> HashMap<String, String> {
        url.query_pairs().into_owned().collect()
    }

    #[test]
    fn test_twitter_url_carries_pkce_and_response_type() {
        let config = OAuthConfig::new("https://app.example").with_client_id(Provider::Twitter, "tw-id");
        let request = build_authorization_request(&config, Provider::Twitter).unwrap();
        let params = query(&request.url);

        assert!(request.url.as_str().starts_with("https://x.com/i/oauth2/authorize?"));
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["client_id"], "tw-id");
        assert_eq!(params["redirect_uri"], "https://app.example/oauth/callback/twitter");
        assert_eq!(params["scope"], "tweet.read users.read");
        assert_eq!(params["state"], request.session.state());
        assert_eq!(params["code_challenge"], request.session.code_challenge());
        assert_eq!(params["code_challenge_method"], "S256");
        assert_eq!(request.session.state().len(), STATE_LEN);
        assert_eq!(request.session.code_verifier().len(), VERIFIER_LEN);
    }

    #[test]
    fn test_github_url_has_no_response_type() {
        let config = OAuthConfig::new("https://app.example").with_client_id(Provider::GitHub, "gh-id");
        let request = build_authorization_request(&config, Provider::GitHub).unwrap();
        let params = query(&request.url);
        assert!(!params.contains_key("response_type"));
        assert_eq!(params["scope"], "read:user user:email");
        assert!(request.session.code_verifier().chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_unconfigured_provider_fails_fast() {
        let config = OAuthConfig::new("https://app.example");
        assert!(matches!(
            build_authorization_request(&config, Provider::GitHub),
            Err(OAuthError::ProviderNotConfigured(Provider::GitHub))
        ));
    }

    #[test]
    fn test_sessions_are_unique_and_redacted() {
        let mut rng = rand::thread_rng();
        let a = OAuthSession::generate(Provider::Twitter, &mut rng);
        let b = OAuthSession::generate(Provider::Twitter, &mut rng);
        assert_ne!(a.state(), b.state());
        assert!(!format!("{a:?}").contains(a.code_verifier()));
    }
}
