//! Error types shared by the anonn crates.

use serde::Serialize;
use thiserror::Error;

use crate::types::SignalKind;

/// Coarse failure classes surfaced to users.
///
/// Every crate-level error maps onto one of these so a UI can decide whether to
/// show a configuration banner, retry, or tell the user the computation failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing client id, unconfigured rule, bad input. Not retryable.
    Configuration,
    /// OAuth state mismatch or missing verifier. Fatal to one handshake only.
    Protocol,
    /// Token exchange, profile fetch, key fetch, submission.
    Network,
    /// The proof record never appeared.
    Consistency,
    Internal,
}

/// Errors from the synchronous data-model layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommonError {
    #[error("invalid {kind} bucket: {value}")]
    InvalidBucket { kind: &'static str, value: u8 },

    #[error("invalid tier: {0}")]
    InvalidTier(u8),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("seed of {len} bytes exceeds the 32 byte limit")]
    SeedTooLong { len: usize },

    #[error("too many seeds: {0}")]
    TooManySeeds(usize),

    #[error("derived address lies on the ed25519 curve")]
    OnCurve,

    #[error("no viable bump seed found")]
    NoViableBump,

    #[error("invalid rule: {0}")]
    InvalidRule(String),

    #[error("not all signals collected, missing {}", join_kinds(.0))]
    MissingSignals(Vec<SignalKind>),
}

impl CommonError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CommonError::OnCurve | CommonError::NoViableBump => ErrorKind::Internal,
            _ => ErrorKind::Configuration,
        }
    }
}

fn join_kinds(kinds: &[SignalKind]) -> String {
    kinds
        .iter()
        .map(|kind| kind.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
