//! Opener-side handshake state machine.
//!
//! `Idle -> AwaitingCallback -> {Success, Failure}` per provider. At most one
//! handshake per provider may be awaiting its callback at a time.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anonn_common::RawSignals;
use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::OAuthError;
use crate::message::{MessageBus, OAuthMessage};
use crate::provider::{OAuthConfig, Provider};
use crate::session::{build_authorization_request, AuthorizationRequest};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum HandshakeState {
    #[default]
    Idle,
    AwaitingCallback,
    Success,
    Failure,
}

/// Window geometry requested from the popup opener.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PopupFeatures {
    pub width: u32,
    pub height: u32,
}

impl Default for PopupFeatures {
    fn default() -> Self {
        Self {
            width: 600,
            height: 700,
        }
    }
}

impl PopupFeatures {
    /// Top-left corner that centres the popup on an opener window.
    pub fn centred_on(&self, x: i32, y: i32, outer_width: u32, outer_height: u32) -> (i32, i32) {
        let left = x + (outer_width as i32 - self.width as i32) / 2;
        let top = y + (outer_height as i32 - self.height as i32) / 2;
        (left, top)
    }
}

/// Opens the provider authorization page in a separate context.
///
/// The request carries the session the callback must consume. A blocked
/// popup must be reported as [`OAuthError::PopupBlocked`].
#[async_trait]
pub trait PopupOpener: Send + Sync {
    async fn open(&self, request: AuthorizationRequest, features: PopupFeatures) -> Result<(), OAuthError>;
}

type StateTable = Arc<Mutex<HashMap<Provider, HandshakeState>>>;

fn lock(states: &StateTable) -> std::sync::MutexGuard<'_, HashMap<Provider, HandshakeState>> {
    states.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Marks a provider as awaiting its callback; resets to `Idle` if dropped
/// without a terminal outcome (e.g. the caller cancelled the future).
struct InFlight {
    states: StateTable,
    provider: Provider,
    finished: bool,
}

impl InFlight {
    fn acquire(states: &StateTable, provider: Provider) -> Result<Self, OAuthError> {
        let mut table = lock(states);
        if table.get(&provider) == Some(&HandshakeState::AwaitingCallback) {
            return Err(OAuthError::HandshakeInProgress(provider));
        }
        table.insert(provider, HandshakeState::AwaitingCallback);
        Ok(Self {
            states: states.clone(),
            provider,
            finished: false,
        })
    }

    fn finish(mut self, state: HandshakeState) {
        lock(&self.states).insert(self.provider, state);
        self.finished = true;
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if !self.finished {
            lock(&self.states).insert(self.provider, HandshakeState::Idle);
        }
    }
}

pub struct OAuthHandshake {
    config: OAuthConfig,
    bus: MessageBus,
    opener: Arc<dyn PopupOpener>,
    features: PopupFeatures,
    states: StateTable,
}

impl OAuthHandshake {
    pub fn new(config: OAuthConfig, bus: MessageBus, opener: Arc<dyn PopupOpener>) -> Self {
        Self {
            config,
            bus,
            opener,
            features: PopupFeatures::default(),
            states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    pub fn state(&self, provider: Provider) -> HandshakeState {
        lock(&self.states).get(&provider).copied().unwrap_or_default()
    }

    /// Run one handshake and return the raw signal fields it produced.
    pub async fn connect(&self, provider: Provider) -> Result<RawSignals, OAuthError> {
        // Fail fast: no window, no state change.
        self.config.client_id(provider)?;

        let guard = InFlight::acquire(&self.states, provider)?;
        let request = build_authorization_request(&self.config, provider)?;

        // Listen before the popup exists so a fast callback cannot be missed.
        let listener = self.bus.listen(self.config.app_origin.clone());

        info!(%provider, "Opening OAuth popup");
        if let Err(e) = self.opener.open(request, self.features).await {
            warn!(%provider, error = %e, "OAuth popup failed to open");
            guard.finish(HandshakeState::Failure);
            return Err(e);
        }

        let outcome = tokio::time::timeout(self.config.callback_timeout, listener.recv_for(provider))
            .await
            .unwrap_or(Err(OAuthError::CallbackTimeout(provider)));

        let result = match outcome {
            Ok(OAuthMessage::Error { error, .. }) => Err(OAuthError::Callback {
                provider,
                message: error,
            }),
            Ok(message) => message.raw_signals().ok_or(OAuthError::ChannelClosed),
            Err(e) => Err(e),
        };

        match &result {
            Ok(_) => {
                info!(%provider, "OAuth handshake completed");
                guard.finish(HandshakeState::Success);
            }
            Err(e) => {
                warn!(%provider, error = %e, "OAuth handshake failed");
                guard.finish(HandshakeState::Failure);
            }
        }
        result
    }
}
