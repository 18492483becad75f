//! In-memory computation network and target program.
//!
//! Submissions are queued per computation offset. Finalizing one decrypts the
//! bundle with the cluster key, evaluates it against the stored rule, writes
//! the proof record and, when enabled, emits a `proofGenerated` event.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use anonn_common::{
    evaluate, rule_address, Address, ProofGeneratedEvent, ProofRecord, Rule, RuleDefinition,
    UserSignals, VerifyResult,
};
use anonn_prover::{
    ComputationNetwork, EventSubscription, NetworkError, ProofProgram, ProofSubmission, RuleProgram,
};
use async_trait::async_trait;
use rand::rngs::OsRng;
use tokio::sync::mpsc;
use tracing::debug;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::cipher::KeystreamCipher;

/// Knobs for failure injection.
#[derive(Clone, Debug)]
pub struct LedgerBehavior {
    /// Key fetches before the cluster key is published (0 = immediately).
    pub key_unavailable_for: usize,
    /// Deliver `proofGenerated` events to subscribers.
    pub emit_events: bool,
    /// Refuse subscriptions, as in environments without push delivery.
    pub subscriptions_unavailable: bool,
    /// Finalize computations; otherwise the wait never resolves.
    pub finalize: bool,
    /// Finalize without writing the record (a failed computation).
    pub drop_records: bool,
    /// Reject every submission with this message.
    pub reject_submissions: Option<String>,
}

impl Default for LedgerBehavior {
    fn default() -> Self {
        Self {
            key_unavailable_for: 0,
            emit_events: true,
            subscriptions_unavailable: false,
            finalize: true,
            drop_records: false,
            reject_submissions: None,
        }
    }
}

#[derive(Default)]
struct LedgerState {
    rules: HashMap<Address, Rule>,
    proofs: HashMap<Address, ProofRecord>,
    pending: HashMap<u64, ProofSubmission>,
    subscribers: Vec<mpsc::UnboundedSender<ProofGeneratedEvent>>,
    now: i64,
}

pub struct MockLedger {
    program_id: Address,
    cluster_secret: StaticSecret,
    behavior: Mutex<LedgerBehavior>,
    state: Mutex<LedgerState>,
    cipher: KeystreamCipher,
    pub key_fetches: AtomicUsize,
    pub record_fetches: AtomicUsize,
    pub submissions: AtomicUsize,
    active_subscriptions: Arc<AtomicUsize>,
    unsubscribes: Arc<AtomicUsize>,
}

impl MockLedger {
    pub fn new(program_id: Address, now_unix: i64) -> Self {
        Self::with_behavior(program_id, now_unix, LedgerBehavior::default())
    }

    pub fn with_behavior(program_id: Address, now_unix: i64, behavior: LedgerBehavior) -> Self {
        Self {
            program_id,
            cluster_secret: StaticSecret::random_from_rng(OsRng),
            behavior: Mutex::new(behavior),
            state: Mutex::new(LedgerState {
                now: now_unix,
                ..Default::default()
            }),
            cipher: KeystreamCipher,
            key_fetches: AtomicUsize::new(0),
            record_fetches: AtomicUsize::new(0),
            submissions: AtomicUsize::new(0),
            active_subscriptions: Arc::new(AtomicUsize::new(0)),
            unsubscribes: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap()
    }

    fn behavior(&self) -> LedgerBehavior {
        self.behavior.lock().unwrap().clone()
    }

    pub fn set_behavior(&self, behavior: LedgerBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn set_now(&self, now_unix: i64) {
        self.state().now = now_unix;
    }

    pub fn cluster_public_key(&self) -> [u8; 32] {
        PublicKey::from(&self.cluster_secret).to_bytes()
    }

    pub fn active_subscriptions(&self) -> usize {
        self.active_subscriptions.load(Ordering::SeqCst)
    }

    pub fn unsubscribes(&self) -> usize {
        self.unsubscribes.load(Ordering::SeqCst)
    }

    /// Seed a proof record directly, bypassing computation.
    pub fn insert_proof(&self, proof_address: Address, record: ProofRecord) {
        self.state().proofs.insert(proof_address, record);
    }

    /// Emit an arbitrary event to current subscribers.
    pub fn emit(&self, event: ProofGeneratedEvent) {
        self.state()
            .subscribers
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Decrypt and evaluate a queued submission, writing its record.
    fn finalize(&self, computation_offset: u64) -> Result<(), NetworkError> {
        let behavior = self.behavior();
        let mut state = self.state();
        let submission = state.pending.remove(&computation_offset).ok_or_else(|| {
            NetworkError::Rejected(format!("unknown computation {computation_offset}"))
        })?;
        let rule = state
            .rules
            .get(&submission.rule_address)
            .cloned()
            .ok_or_else(|| NetworkError::Rejected("rule not found".into()))?;

        let shared = self
            .cluster_secret
            .diffie_hellman(&PublicKey::from(submission.public_key));
        let nonce = submission.nonce.to_le_bytes();
        let values = self
            .cipher
            .decrypt(shared.as_bytes(), &submission.encrypted_signals, &nonce);
        let mut buckets = [0u8; 5];
        for (slot, value) in buckets.iter_mut().zip(values) {
            *slot = u8::try_from(value)
                .map_err(|_| NetworkError::InvalidResponse("ciphertext out of range".into()))?;
        }
        let signals = UserSignals::from_array(buckets)
            .map_err(|e| NetworkError::InvalidResponse(e.to_string()))?;
        let evaluation = evaluate(&signals, &rule.definition);

        if behavior.drop_records {
            debug!(computation_offset, "Dropping proof record");
            return Ok(());
        }

        let generated_at = state.now;
        let expires_at = generated_at + rule.definition.proof_validity_secs as i64;
        let record = ProofRecord {
            owner: submission.payer,
            rule: submission.rule_address,
            epoch: submission.epoch,
            tier: evaluation.tier,
            conditions_met: evaluation.conditions_met,
            generated_at,
            expires_at,
            is_finalized: true,
        };
        state.proofs.insert(submission.proof_address, record);

        if behavior.emit_events {
            let event = ProofGeneratedEvent {
                rule_id: rule.definition.rule_id.clone(),
                proof_account: submission.proof_address,
                epoch: submission.epoch,
                tier: evaluation.tier,
                conditions_met: evaluation.conditions_met,
                generated_at,
                expires_at,
            };
            state.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        }
        Ok(())
    }
}

#[async_trait]
impl ComputationNetwork for MockLedger {
    async fn fetch_cluster_public_key(&self, program_id: &Address) -> Result<Option<[u8; 32]>, NetworkError> {
        let n = self.key_fetches.fetch_add(1, Ordering::SeqCst);
        if *program_id != self.program_id {
            return Err(NetworkError::Rejected("unknown program".into()));
        }
        if n < self.behavior().key_unavailable_for {
            return Ok(None);
        }
        Ok(Some(self.cluster_public_key()))
    }

    async fn await_finalization(&self, computation_offset: u64, _: &Address) -> Result<(), NetworkError> {
        if !self.behavior().finalize {
            return futures::future::pending().await;
        }
        self.finalize(computation_offset)
    }
}

#[async_trait]
impl ProofProgram for MockLedger {
    fn program_id(&self) -> Address {
        self.program_id
    }

    async fn subscribe_proof_events(&self) -> Result<EventSubscription, NetworkError> {
        if self.behavior().subscriptions_unavailable {
            return Err(NetworkError::ConnectionFailed("websocket unavailable".into()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.state().subscribers.push(tx);
        self.active_subscriptions.fetch_add(1, Ordering::SeqCst);

        let active = self.active_subscriptions.clone();
        let unsubscribes = self.unsubscribes.clone();
        Ok(EventSubscription::new(rx, move || {
            active.fetch_sub(1, Ordering::SeqCst);
            unsubscribes.fetch_add(1, Ordering::SeqCst);
        }))
    }

    async fn submit_proof_request(&self, submission: ProofSubmission) -> Result<String, NetworkError> {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.behavior().reject_submissions {
            return Err(NetworkError::Rejected(message));
        }
        let mut state = self.state();
        if !state.rules.contains_key(&submission.rule_address) {
            return Err(NetworkError::Rejected("rule account not initialized".into()));
        }
        if state.proofs.contains_key(&submission.proof_address) {
            return Err(NetworkError::Rejected("proof account already in use".into()));
        }
        let signature = format!("sig-{}", submission.computation_offset);
        state.pending.insert(submission.computation_offset, submission);
        Ok(signature)
    }

    async fn fetch_proof_record(&self, proof_address: &Address) -> Result<Option<ProofRecord>, NetworkError> {
        self.record_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.state().proofs.get(proof_address).cloned())
    }
}

#[async_trait]
impl RuleProgram for MockLedger {
    async fn register_rule(&self, authority: &Address, rule: &RuleDefinition) -> Result<Address, NetworkError> {
        rule.validate()
            .map_err(|e| NetworkError::Rejected(e.to_string()))?;
        let address = rule_address(&self.program_id, authority, &rule.rule_id)
            .map_err(|e| NetworkError::Rejected(e.to_string()))?;

        let mut state = self.state();
        if state.rules.contains_key(&address) {
            return Err(NetworkError::Rejected("rule account already in use".into()));
        }
        let created_at = state.now;
        state.rules.insert(
            address,
            Rule {
                authority: *authority,
                definition: rule.clone(),
                created_at,
            },
        );
        Ok(address)
    }

    async fn fetch_rule(&self, rule_address: &Address) -> Result<Option<Rule>, NetworkError> {
        Ok(self.state().rules.get(rule_address).cloned())
    }

    async fn list_rules(&self) -> Result<Vec<(Address, Rule)>, NetworkError> {
        Ok(self
            .state()
            .rules
            .iter()
            .map(|(address, rule)| (*address, rule.clone()))
            .collect())
    }

    async fn list_proofs_for_rule(&self, rule_address: &Address) -> Result<Vec<(Address, ProofRecord)>, NetworkError> {
        Ok(self
            .state()
            .proofs
            .iter()
            .filter(|(_, record)| record.rule == *rule_address)
            .map(|(address, record)| (*address, record.clone()))
            .collect())
    }

    async fn verify_proof(&self, proof_address: &Address) -> Result<VerifyResult, NetworkError> {
        let state = self.state();
        let record = state
            .proofs
            .get(proof_address)
            .ok_or_else(|| NetworkError::Rejected("proof account not found".into()))?;
        let expired = record.is_expired(state.now);
        Ok(VerifyResult {
            valid: record.is_finalized && !expired,
            tier: record.tier,
            expired,
        })
    }
}
