use anonn_common::{Address, CommonError, ErrorKind};
use anonn_oauth::OAuthError;
use anonn_prover::{NetworkError, ProverError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error(transparent)]
    Common(#[from] CommonError),

    #[error(transparent)]
    OAuth(#[from] OAuthError),

    #[error(transparent)]
    Prover(#[from] ProverError),

    #[error("Failed to fetch wallet signals: {0}")]
    WalletQuery(String),

    #[error("Ledger request failed: {0}")]
    Ledger(#[from] NetworkError),

    #[error("Rule {0} not found")]
    RuleNotFound(Address),

    #[error("A proof request is already in flight")]
    ProofInFlight,
}

impl SdkError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SdkError::Common(e) => e.kind(),
            SdkError::OAuth(e) => e.kind(),
            SdkError::Prover(e) => e.kind(),
            SdkError::WalletQuery(_) | SdkError::Ledger(_) => ErrorKind::Network,
            SdkError::RuleNotFound(_) => ErrorKind::Configuration,
            SdkError::ProofInFlight => ErrorKind::Protocol,
        }
    }
}
