use std::time::Duration;

use anonn_common::{CommonError, ErrorKind};
use thiserror::Error;

/// Failure reported by a remote collaborator (computation network or ledger).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CipherError {
    #[error("cipher returned {actual} ciphertexts for {expected} values")]
    BatchLength { expected: usize, actual: usize },

    #[error("encryption failed: {0}")]
    Failed(String),
}

/// Errors from the proof lifecycle.
#[derive(Debug, Error)]
pub enum ProverError {
    #[error("Failed to fetch MXE public key after {attempts} attempts")]
    KeyFetchExhausted { attempts: u32, last_error: String },

    #[error(transparent)]
    Cipher(#[from] CipherError),

    /// Reported verbatim from the program.
    #[error("{0}")]
    Submission(NetworkError),

    #[error("Computation finalization failed: {0}")]
    Finalization(NetworkError),

    #[error("Computation {offset} did not finalize within {timeout:?}")]
    FinalizationTimeout { offset: u64, timeout: Duration },

    #[error("Proof account not found after polling. MPC computation may have failed.")]
    ProofNotFound { attempts: u32 },

    #[error(transparent)]
    Common(#[from] CommonError),
}

impl ProverError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProverError::KeyFetchExhausted { .. }
            | ProverError::Submission(_)
            | ProverError::Finalization(_)
            | ProverError::FinalizationTimeout { .. } => ErrorKind::Network,
            ProverError::ProofNotFound { .. } => ErrorKind::Consistency,
            ProverError::Cipher(_) => ErrorKind::Internal,
            ProverError::Common(e) => e.kind(),
        }
    }
}
