//! Target program seams: proof submission, event subscription, rule admin.

use std::fmt;

use anonn_common::{
    Address, ProofGeneratedEvent, ProofRecord, Rule, RuleDefinition, VerifyResult, SIGNAL_COUNT,
};
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::cipher::Ciphertext;
use crate::error::NetworkError;

/// Everything the program needs to queue one evaluation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProofSubmission {
    pub payer: Address,
    pub rule_address: Address,
    pub proof_address: Address,
    pub computation_offset: u64,
    pub cluster_offset: u32,
    pub encrypted_signals: [Ciphertext; SIGNAL_COUNT],
    pub public_key: [u8; 32],
    pub nonce: u128,
    pub epoch: u64,
}

/// A live `proofGenerated` event subscription.
///
/// The unsubscribe hook runs exactly once: on [`EventSubscription::unsubscribe`]
/// or on drop, whichever comes first.
pub struct EventSubscription {
    rx: mpsc::UnboundedReceiver<ProofGeneratedEvent>,
    unsubscribe: Option<Box<dyn FnOnce() + Send>>,
}

impl EventSubscription {
    pub fn new(
        rx: mpsc::UnboundedReceiver<ProofGeneratedEvent>,
        unsubscribe: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            rx,
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// Next event, or `None` once the stream is closed.
    pub async fn next(&mut self) -> Option<ProofGeneratedEvent> {
        self.rx.recv().await
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(hook) = self.unsubscribe.take() {
            hook();
        }
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for EventSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSubscription")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}

/// User-facing operations of the target program.
#[async_trait]
pub trait ProofProgram: Send + Sync {
    fn program_id(&self) -> Address;

    async fn subscribe_proof_events(&self) -> Result<EventSubscription, NetworkError>;

    /// Submit a proof request; returns the transaction signature.
    async fn submit_proof_request(&self, submission: ProofSubmission) -> Result<String, NetworkError>;

    async fn fetch_proof_record(&self, proof_address: &Address) -> Result<Option<ProofRecord>, NetworkError>;
}

/// Authority-facing operations of the target program.
#[async_trait]
pub trait RuleProgram: ProofProgram {
    /// Register a rule owned by `authority`; returns the rule address.
    async fn register_rule(&self, authority: &Address, rule: &RuleDefinition) -> Result<Address, NetworkError>;

    async fn fetch_rule(&self, rule_address: &Address) -> Result<Option<Rule>, NetworkError>;

    async fn list_rules(&self) -> Result<Vec<(Address, Rule)>, NetworkError>;

    async fn list_proofs_for_rule(&self, rule_address: &Address) -> Result<Vec<(Address, ProofRecord)>, NetworkError>;

    /// On-ledger validity check of a proof record.
    async fn verify_proof(&self, proof_address: &Address) -> Result<VerifyResult, NetworkError>;
}
