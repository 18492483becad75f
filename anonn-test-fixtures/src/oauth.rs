//! Scripted provider API and popup for handshake tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anonn_oauth::{
    AuthorizationRequest, CallbackHandler, CallbackParams, MessageBus, OAuthError, PopupFeatures,
    PopupOpener, Provider, ProviderApi, ProviderProfile,
};
use async_trait::async_trait;

use crate::{github_created_at, twitter_created_at, APP_ORIGIN, GITHUB_PUBLIC_REPOS};

/// Provider API returning fixed profiles and counting calls.
#[derive(Default)]
pub struct MockProviderApi {
    pub exchanges: AtomicUsize,
    pub profile_fetches: AtomicUsize,
    /// Verifiers seen by `exchange_code`, in call order.
    pub verifiers: Mutex<Vec<String>>,
    pub fail_exchange: bool,
}

#[async_trait]
impl ProviderApi for MockProviderApi {
    async fn exchange_code(
        &self,
        provider: Provider,
        code: &str,
        _redirect_uri: &str,
        code_verifier: &str,
    ) -> Result<String, OAuthError> {
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        self.verifiers.lock().unwrap().push(code_verifier.to_string());
        if self.fail_exchange {
            return Err(OAuthError::TokenExchange {
                provider,
                message: "invalid_grant".into(),
            });
        }
        Ok(format!("{}-token-for-{code}", provider.as_str()))
    }

    async fn fetch_profile(&self, provider: Provider, _access_token: &str) -> Result<ProviderProfile, OAuthError> {
        self.profile_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(match provider {
            Provider::Twitter => ProviderProfile {
                created_at: twitter_created_at(),
                public_repos: None,
                username: Some("anon".into()),
            },
            Provider::GitHub => ProviderProfile {
                created_at: github_created_at(),
                public_repos: Some(GITHUB_PUBLIC_REPOS),
                username: Some("anon".into()),
            },
        })
    }
}

/// What the simulated user does once the popup is open.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PopupScript {
    /// Approve and get redirected back with the real state.
    #[default]
    Approve,
    /// Redirected back with a state value that was never issued.
    ForgeState,
    /// Decline on the provider's consent screen.
    Deny,
    /// Close the window without finishing.
    Abandon,
    /// The browser refuses to open the window.
    Blocked,
}

/// Plays the browser: opens the "window" and runs the callback handler.
pub struct SimulatedPopup {
    bus: MessageBus,
    api: Arc<dyn ProviderApi>,
    script: Mutex<PopupScript>,
    pub opens: AtomicUsize,
    /// Authorization URLs in the order they were opened.
    pub urls: Mutex<Vec<String>>,
}

impl SimulatedPopup {
    pub fn new(bus: MessageBus, api: Arc<dyn ProviderApi>) -> Self {
        Self {
            bus,
            api,
            script: Mutex::new(PopupScript::Approve),
            opens: AtomicUsize::new(0),
            urls: Mutex::new(Vec::new()),
        }
    }

    pub fn set_script(&self, script: PopupScript) {
        *self.script.lock().unwrap() = script;
    }
}

#[async_trait]
impl PopupOpener for SimulatedPopup {
    async fn open(&self, request: AuthorizationRequest, _features: PopupFeatures) -> Result<(), OAuthError> {
        let script = *self.script.lock().unwrap();
        let provider = request.provider();
        if script == PopupScript::Blocked {
            return Err(OAuthError::PopupBlocked(provider));
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().unwrap().push(request.url.to_string());
        if script == PopupScript::Abandon {
            return Ok(());
        }

        let params = match script {
            PopupScript::Deny => CallbackParams {
                error: Some("access_denied".into()),
                ..Default::default()
            },
            PopupScript::ForgeState => CallbackParams {
                code: Some("auth-code".into()),
                state: Some("forged-state".into()),
                error: None,
            },
            _ => CallbackParams {
                code: Some("auth-code".into()),
                state: Some(request.session.state().to_string()),
                error: None,
            },
        };
        let handler = CallbackHandler::new(
            provider,
            APP_ORIGIN,
            format!("{APP_ORIGIN}/oauth/callback/{}", provider.as_str()),
            self.api.clone(),
            self.bus.clone(),
        );
        tokio::spawn(async move {
            let _ = handler.handle(params, Some(request.session)).await;
        });
        Ok(())
    }
}
