//! OAuth popup handshake for collecting social account signals.
//!
//! The opener builds an authorization URL with fresh CSRF state and a PKCE
//! verifier, hands the [`OAuthSession`] to the popup context, and waits on an
//! origin-filtered [`MessageBus`] for the callback's result. The callback
//! verifies state, exchanges the code through the backend proxy and posts back
//! only the derived signal fields.

pub mod callback;
pub mod error;
pub mod handshake;
pub mod http;
pub mod message;
pub mod pkce;
pub mod provider;
pub mod session;

pub use callback::{CallbackHandler, CallbackParams, ProviderApi, ProviderProfile};
pub use error::OAuthError;
pub use handshake::{HandshakeState, OAuthHandshake, PopupFeatures, PopupOpener};
pub use http::HttpProviderApi;
pub use message::{Envelope, MessageBus, MessageListener, OAuthMessage};
pub use provider::{OAuthConfig, Provider};
pub use session::{build_authorization_request, AuthorizationRequest, OAuthSession};
