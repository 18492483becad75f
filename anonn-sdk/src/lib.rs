//! Client SDK for anonn reputation proofs.
//!
//! [`AnonnUser`] is the user-side session: it collects wallet and social
//! signals into a [`SignalStore`] and turns complete signals into a proof.
//! [`AnonnDeveloper`] is the rule authority's view: registering rules and
//! verifying or summarising the proofs issued against them.

pub mod config;
pub mod developer;
pub mod error;
pub mod store;
pub mod user;
pub mod wallet;

pub use config::AnonnConfig;
pub use developer::{AnonnDeveloper, ProofStats, RuleProofs};
pub use error::SdkError;
pub use store::SignalStore;
pub use user::{AnonnUser, Clock, StatusError};
pub use wallet::{signals_from_signatures, RpcWalletSignals, SignatureInfo, WalletSignalSource};
