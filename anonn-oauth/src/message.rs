//! Cross-context message contract between the callback and the opener.
//!
//! Messages travel on a broadcast bus tagged with the sender's origin. A
//! listener only accepts messages from its own origin, resolves at most once,
//! and deregisters by being consumed.

use anonn_common::RawSignals;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::OAuthError;
use crate::provider::Provider;

const BUS_CAPACITY: usize = 32;

/// Wire shape: `{type: "<PROVIDER>_OAUTH_SUCCESS", createdAt, publicRepos?}`
/// or `{type: "OAUTH_ERROR", error, provider?}`. Access tokens never appear here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OAuthMessage {
    #[serde(rename = "TWITTER_OAUTH_SUCCESS", rename_all = "camelCase")]
    TwitterSuccess { created_at: DateTime<Utc> },

    #[serde(rename = "GITHUB_OAUTH_SUCCESS", rename_all = "camelCase")]
    GithubSuccess {
        created_at: DateTime<Utc>,
        #[serde(default)]
        public_repos: u64,
    },

    /// An error without a provider reaches every listener on the origin.
    #[serde(rename = "OAUTH_ERROR")]
    Error {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        provider: Option<Provider>,
    },
}

impl OAuthMessage {
    pub fn error(error: impl Into<String>) -> Self {
        OAuthMessage::Error {
            error: error.into(),
            provider: None,
        }
    }

    /// An error that only fails the handshake for `provider`.
    pub fn error_for(provider: Provider, error: impl Into<String>) -> Self {
        OAuthMessage::Error {
            error: error.into(),
            provider: Some(provider),
        }
    }

    /// Provider the message belongs to; `None` for untagged errors.
    pub fn provider(&self) -> Option<Provider> {
        match self {
            OAuthMessage::TwitterSuccess { .. } => Some(Provider::Twitter),
            OAuthMessage::GithubSuccess { .. } => Some(Provider::GitHub),
            OAuthMessage::Error { provider, .. } => *provider,
        }
    }

    /// Raw signal fields carried by a success message.
    pub fn raw_signals(&self) -> Option<RawSignals> {
        match self {
            OAuthMessage::TwitterSuccess { created_at } => Some(RawSignals {
                twitter_created_at: Some(*created_at),
                ..Default::default()
            }),
            OAuthMessage::GithubSuccess { created_at, public_repos } => Some(RawSignals {
                github_created_at: Some(*created_at),
                github_public_repos: Some(*public_repos),
                ..Default::default()
            }),
            OAuthMessage::Error { .. } => None,
        }
    }
}

/// A message stamped with the origin of the context that posted it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    pub origin: String,
    pub message: OAuthMessage,
}

#[derive(Clone, Debug)]
pub struct MessageBus {
    tx: broadcast::Sender<Envelope>,
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    /// Post a message; returns the number of listeners it reached.
    pub fn post(&self, origin: impl Into<String>, message: OAuthMessage) -> usize {
        let envelope = Envelope {
            origin: origin.into(),
            message,
        };
        // No listeners is not an error: the opener may already be gone.
        self.tx.send(envelope).unwrap_or(0)
    }

    /// Register a listener restricted to `origin`.
    pub fn listen(&self, origin: impl Into<String>) -> MessageListener {
        MessageListener {
            origin: origin.into(),
            rx: self.tx.subscribe(),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// A single-resolution, origin-filtered subscription.
#[derive(Debug)]
pub struct MessageListener {
    origin: String,
    rx: broadcast::Receiver<Envelope>,
}

impl MessageListener {
    /// Wait for the first message relevant to `provider`.
    ///
    /// Foreign origins and messages tagged for another provider are skipped.
    /// The listener is consumed, so it can never fire twice.
    pub async fn recv_for(mut self, provider: Provider) -> Result<OAuthMessage, OAuthError> {
        loop {
            let envelope = match self.rx.recv().await {
                Ok(envelope) => envelope,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "OAuth listener lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return Err(OAuthError::ChannelClosed),
            };

            if envelope.origin != self.origin {
                debug!(origin = %envelope.origin, "Ignoring OAuth message from foreign origin");
                continue;
            }

            match envelope.message.provider() {
                Some(p) if p != provider => continue,
                _ => return Ok(envelope.message),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const ORIGIN: &str = "https://app.example";

    fn created() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2019, 3, 4, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_wire_format() {
        let msg = OAuthMessage::GithubSuccess {
            created_at: created(),
            public_repos: 12,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], Provider::GitHub.success_message_type());
        assert_eq!(json["createdAt"], "2019-03-04T00:00:00Z");
        assert_eq!(json["publicRepos"], 12);

        let err: OAuthMessage =
            serde_json::from_str(r#"{"type":"OAUTH_ERROR","error":"access_denied"}"#).unwrap();
        assert_eq!(err, OAuthMessage::error("access_denied"));
        assert_eq!(err.provider(), None);

        let tagged = serde_json::to_value(OAuthMessage::error_for(Provider::GitHub, "denied")).unwrap();
        assert_eq!(tagged["type"], "OAUTH_ERROR");
        assert_eq!(tagged["provider"], "github");
        let untagged = serde_json::to_value(OAuthMessage::error("denied")).unwrap();
        assert!(untagged.get("provider").is_none());

        let tw: OAuthMessage = serde_json::from_str(
            r#"{"type":"TWITTER_OAUTH_SUCCESS","createdAt":"2019-03-04T00:00:00.000Z"}"#,
        )
        .unwrap();
        assert_eq!(
            serde_json::to_value(&tw).unwrap()["type"],
            Provider::Twitter.success_message_type()
        );
        assert_eq!(tw.raw_signals().unwrap().twitter_created_at, Some(created()));
    }

    #[tokio::test]
    async fn test_listener_ignores_foreign_origin() {
        let bus = MessageBus::new();
        let listener = bus.listen(ORIGIN);

        bus.post("https://evil.example", OAuthMessage::TwitterSuccess { created_at: created() });
        bus.post(ORIGIN, OAuthMessage::error("denied"));

        let msg = listener.recv_for(Provider::Twitter).await.unwrap();
        assert_eq!(msg, OAuthMessage::error("denied"));
    }

    #[tokio::test]
    async fn test_listener_skips_other_provider_success() {
        let bus = MessageBus::new();
        let listener = bus.listen(ORIGIN);

        bus.post(ORIGIN, OAuthMessage::TwitterSuccess { created_at: created() });
        bus.post(
            ORIGIN,
            OAuthMessage::GithubSuccess {
                created_at: created(),
                public_repos: 3,
            },
        );

        let msg = listener.recv_for(Provider::GitHub).await.unwrap();
        assert_eq!(msg.provider(), Some(Provider::GitHub));
    }

    #[tokio::test]
    async fn test_listener_skips_error_tagged_for_other_provider() {
        let bus = MessageBus::new();
        let twitter = bus.listen(ORIGIN);
        let github = bus.listen(ORIGIN);

        bus.post(ORIGIN, OAuthMessage::error_for(Provider::GitHub, "denied"));
        bus.post(ORIGIN, OAuthMessage::TwitterSuccess { created_at: created() });

        let msg = github.recv_for(Provider::GitHub).await.unwrap();
        assert_eq!(msg, OAuthMessage::error_for(Provider::GitHub, "denied"));
        let msg = twitter.recv_for(Provider::Twitter).await.unwrap();
        assert_eq!(msg.provider(), Some(Provider::Twitter));
    }

    #[tokio::test]
    async fn test_untagged_error_reaches_every_listener() {
        let bus = MessageBus::new();
        let twitter = bus.listen(ORIGIN);
        let github = bus.listen(ORIGIN);

        assert_eq!(bus.post(ORIGIN, OAuthMessage::error("closed")), 2);

        assert_eq!(twitter.recv_for(Provider::Twitter).await.unwrap(), OAuthMessage::error("closed"));
        assert_eq!(github.recv_for(Provider::GitHub).await.unwrap(), OAuthMessage::error("closed"));
    }

    #[tokio::test]
    async fn test_listener_deregisters_after_resolution() {
        let bus = MessageBus::new();
        let listener = bus.listen(ORIGIN);
        assert_eq!(bus.listener_count(), 1);

        bus.post(ORIGIN, OAuthMessage::error("x"));
        listener.recv_for(Provider::Twitter).await.unwrap();

        assert_eq!(bus.listener_count(), 0);
        assert_eq!(bus.post(ORIGIN, OAuthMessage::error("late")), 0);
    }
}
