use anonn_common::ErrorKind;
use thiserror::Error;

use crate::provider::Provider;

/// Errors from the OAuth handshake.
///
/// A failure here aborts one provider's flow only; signals already collected
/// for other providers are untouched.
#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("{0} client ID not configured")]
    ProviderNotConfigured(Provider),

    #[error("API base URL not configured")]
    ApiBaseNotConfigured,

    #[error("Popup blocked for {0} authorization")]
    PopupBlocked(Provider),

    #[error("{0} authorization already in progress")]
    HandshakeInProgress(Provider),

    #[error("Invalid OAuth state")]
    InvalidState,

    #[error("Missing code verifier")]
    MissingVerifier,

    #[error("No authorization code received")]
    MissingCode,

    /// `error` query parameter returned by the provider.
    #[error("{0}")]
    ProviderDenied(String),

    #[error("{provider} token exchange failed: {message}")]
    TokenExchange { provider: Provider, message: String },

    #[error("{provider} user fetch failed: {message}")]
    ProfileFetch { provider: Provider, message: String },

    /// Error reported by the callback context over the message bus.
    #[error("{provider} OAuth error: {message}")]
    Callback { provider: Provider, message: String },

    #[error("{0} authorization timed out waiting for the callback")]
    CallbackTimeout(Provider),

    #[error("OAuth message channel closed")]
    ChannelClosed,

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl OAuthError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OAuthError::ProviderNotConfigured(_)
            | OAuthError::ApiBaseNotConfigured
            | OAuthError::PopupBlocked(_)
            | OAuthError::Url(_) => ErrorKind::Configuration,
            OAuthError::HandshakeInProgress(_)
            | OAuthError::InvalidState
            | OAuthError::MissingVerifier
            | OAuthError::MissingCode
            | OAuthError::ProviderDenied(_)
            | OAuthError::Callback { .. } => ErrorKind::Protocol,
            OAuthError::TokenExchange { .. }
            | OAuthError::ProfileFetch { .. }
            | OAuthError::CallbackTimeout(_) => ErrorKind::Network,
            OAuthError::ChannelClosed => ErrorKind::Internal,
        }
    }
}
