//! Callback-side processing.
//!
//! Runs in the context the provider redirects to. It verifies the CSRF state
//! against the session before any network call, exchanges the code, fetches
//! the profile, and posts only derived signal fields back to the opener.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use url::Url;

use crate::error::OAuthError;
use crate::message::{MessageBus, OAuthMessage};
use crate::provider::Provider;
use crate::session::OAuthSession;

/// Query parameters of the redirect back from the provider.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

impl CallbackParams {
    pub fn from_url(url: &Url) -> Self {
        let mut params = Self::default();
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => params.code = Some(value.into_owned()),
                "state" => params.state = Some(value.into_owned()),
                "error" => params.error = Some(value.into_owned()),
                _ => {}
            }
        }
        params
    }
}

/// Profile fields extracted from a provider account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderProfile {
    pub created_at: DateTime<Utc>,
    /// GitHub only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_repos: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl ProviderProfile {
    pub fn into_message(self, provider: Provider) -> OAuthMessage {
        match provider {
            Provider::Twitter => OAuthMessage::TwitterSuccess {
                created_at: self.created_at,
            },
            Provider::GitHub => OAuthMessage::GithubSuccess {
                created_at: self.created_at,
                public_repos: self.public_repos.unwrap_or(0),
            },
        }
    }
}

/// Token exchange and profile fetch, usually through the backend proxy.
#[async_trait]
pub trait ProviderApi: Send + Sync {
    /// Exchange an authorization code for an access token.
    async fn exchange_code(
        &self,
        provider: Provider,
        code: &str,
        redirect_uri: &str,
        code_verifier: &str,
    ) -> Result<String, OAuthError>;

    async fn fetch_profile(
        &self,
        provider: Provider,
        access_token: &str,
    ) -> Result<ProviderProfile, OAuthError>;
}

pub struct CallbackHandler {
    provider: Provider,
    origin: String,
    redirect_uri: String,
    api: Arc<dyn ProviderApi>,
    bus: MessageBus,
}

impl CallbackHandler {
    pub fn new(
        provider: Provider,
        origin: impl Into<String>,
        redirect_uri: impl Into<String>,
        api: Arc<dyn ProviderApi>,
        bus: MessageBus,
    ) -> Self {
        Self {
            provider,
            origin: origin.into(),
            redirect_uri: redirect_uri.into(),
            api,
            bus,
        }
    }

    /// Process the callback and post the outcome to the opener.
    ///
    /// `session` is consumed: it is destroyed whether the flow succeeds or
    /// fails. A missing session is treated as a state mismatch.
    pub async fn handle(
        &self,
        params: CallbackParams,
        session: Option<OAuthSession>,
    ) -> Result<OAuthMessage, OAuthError> {
        let outcome = self.process(params, session).await;
        let message = match &outcome {
            Ok(message) => {
                info!(provider = %self.provider, "OAuth callback succeeded");
                message.clone()
            }
            Err(e) => {
                warn!(provider = %self.provider, error = %e, "OAuth callback failed");
                OAuthMessage::error_for(self.provider, e.to_string())
            }
        };
        self.bus.post(self.origin.clone(), message);
        outcome
    }

    async fn process(
        &self,
        params: CallbackParams,
        session: Option<OAuthSession>,
    ) -> Result<OAuthMessage, OAuthError> {
        if let Some(error) = params.error {
            return Err(OAuthError::ProviderDenied(error));
        }
        let code = params.code.ok_or(OAuthError::MissingCode)?;

        let session = session
            .filter(|s| s.provider() == self.provider)
            .ok_or(OAuthError::InvalidState)?;
        if params.state.as_deref() != Some(session.state()) {
            return Err(OAuthError::InvalidState);
        }
        if session.code_verifier().is_empty() {
            return Err(OAuthError::MissingVerifier);
        }

        let token = self
            .api
            .exchange_code(self.provider, &code, &self.redirect_uri, session.code_verifier())
            .await?;
        drop(session);

        let profile = self.api.fetch_profile(self.provider, &token).await?;
        Ok(profile.into_message(self.provider))
    }
}
