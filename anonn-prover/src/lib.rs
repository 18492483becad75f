//! Proof-request orchestration for anonn.
//!
//! [`ProofOrchestrator`] takes complete bucketed signals through key
//! retrieval, encryption, submission and finalization; [`ResultReconciler`]
//! then races the event subscription against polling for the outcome. The
//! computation network, cipher and target program sit behind traits.

pub mod cipher;
pub mod error;
pub mod keys;
pub mod network;
pub mod orchestrator;
pub mod program;
pub mod race;
pub mod reconciler;
pub mod retry;

pub use cipher::{encrypt_signals, Ciphertext, SignalCipher};
pub use error::{CipherError, NetworkError, ProverError};
pub use keys::{SessionKeys, NONCE_LEN};
pub use network::ComputationNetwork;
pub use orchestrator::{ProofOrchestrator, ProverConfig, DEFAULT_FINALIZATION_TIMEOUT};
pub use program::{EventSubscription, ProofProgram, ProofSubmission, RuleProgram};
pub use race::race;
pub use reconciler::ResultReconciler;
pub use retry::{RetryExhausted, RetryPolicy};
