//! User session facade.
//!
//! Owns the session's [`SignalStore`], drives signal collection and proof
//! generation, and keeps the UI-facing status machine:
//!
//! ```text
//! idle ─► collecting ─► idle
//!   │          └──────► error
//!   └──► encrypting ─► computing ─► completed
//!             └────────────┴──────► error
//! ```
//!
//! Every failure is recorded as a [`StatusError`] carrying the state it left.
//! Collections that run while a proof is in flight leave the status alone,
//! and the status returns to idle only once the last collection finishes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anonn_common::{
    Address, PartialUserSignals, ProofOutput, ProofRequest, ProofStatus, RawSignals, UserSignals,
};
use anonn_oauth::{OAuthHandshake, Provider};
use anonn_prover::{ProofOrchestrator, ProverError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::SdkError;
use crate::store::SignalStore;
use crate::wallet::WalletSignalSource;

pub type Clock = fn() -> DateTime<Utc>;

/// A user-visible failure: the transition `from -> error` and its message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StatusError {
    pub from: ProofStatus,
    pub message: String,
}

pub struct AnonnUser {
    identity: Address,
    store: SignalStore,
    wallet: Arc<dyn WalletSignalSource>,
    handshake: OAuthHandshake,
    orchestrator: ProofOrchestrator,
    status: watch::Sender<ProofStatus>,
    last_error: Mutex<Option<StatusError>>,
    proving: tokio::sync::Mutex<()>,
    collecting: AtomicUsize,
    clock: Clock,
}

/// One running collection; the count is released on drop, including when
/// the caller abandons the future.
struct ActiveCollection<'a>(&'a AtomicUsize);

impl Drop for ActiveCollection<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl AnonnUser {
    pub fn new(
        identity: Address,
        wallet: Arc<dyn WalletSignalSource>,
        handshake: OAuthHandshake,
        orchestrator: ProofOrchestrator,
    ) -> Self {
        let (status, _) = watch::channel(ProofStatus::Idle);
        Self {
            identity,
            store: SignalStore::new(),
            wallet,
            handshake,
            orchestrator,
            status,
            last_error: Mutex::new(None),
            proving: tokio::sync::Mutex::new(()),
            collecting: AtomicUsize::new(0),
            clock: Utc::now,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn identity(&self) -> Address {
        self.identity
    }

    pub fn status(&self) -> ProofStatus {
        *self.status.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ProofStatus> {
        self.status.subscribe()
    }

    pub fn last_error(&self) -> Option<StatusError> {
        self.last_error
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn raw_signals(&self) -> RawSignals {
        self.store.raw()
    }

    pub fn bucketed_signals(&self) -> PartialUserSignals {
        self.store.bucketed((self.clock)())
    }

    pub fn has_all_signals(&self) -> bool {
        self.store.has_all_signals((self.clock)())
    }

    /// Forget every collected signal and reset the status machine.
    pub fn clear_signals(&self) {
        self.store.clear();
        self.set_error(None);
        self.status.send_replace(ProofStatus::Idle);
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SIGNAL COLLECTION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Query the ledger for wallet age and transaction count.
    pub async fn collect_wallet_signals(&self) -> Result<RawSignals, SdkError> {
        let active = self.begin_collection();
        let result = self.wallet.wallet_signals(&self.identity, (self.clock)()).await;
        self.finish_collection(active, result)
    }

    /// Link a provider account through the OAuth popup.
    ///
    /// A failure leaves signals from other providers untouched.
    pub async fn connect(&self, provider: Provider) -> Result<RawSignals, SdkError> {
        let active = self.begin_collection();
        let result = self.handshake.connect(provider).await.map_err(SdkError::from);
        self.finish_collection(active, result)
    }

    fn begin_collection(&self) -> ActiveCollection<'_> {
        self.collecting.fetch_add(1, Ordering::SeqCst);
        if !self.proof_in_flight() {
            self.begin(ProofStatus::Collecting);
        }
        ActiveCollection(&self.collecting)
    }

    fn finish_collection(
        &self,
        active: ActiveCollection<'_>,
        result: Result<RawSignals, SdkError>,
    ) -> Result<RawSignals, SdkError> {
        drop(active);
        let last = self.collecting.load(Ordering::SeqCst) == 0;
        let owns_status = !self.proof_in_flight();

        match result {
            Ok(update) => {
                self.store.merge(update.clone());
                // An earlier concurrent failure stays visible.
                if last && owns_status && self.status() == ProofStatus::Collecting {
                    self.status.send_replace(ProofStatus::Idle);
                }
                Ok(update)
            }
            Err(e) if owns_status => Err(self.fail(ProofStatus::Collecting, e)),
            Err(e) => {
                warn!(kind = ?e.kind(), error = %e, "Signal collection failed while a proof is in flight");
                Err(e)
            }
        }
    }

    fn proof_in_flight(&self) -> bool {
        self.proving.try_lock().is_err()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // PROOF GENERATION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Generate a proof for `rule_address` in `epoch` from the current signals.
    pub async fn generate_proof(
        &self,
        rule_address: Address,
        rule_id: &str,
        epoch: u64,
    ) -> Result<ProofOutput, SdkError> {
        let _proving = self.proving.try_lock().map_err(|_| SdkError::ProofInFlight)?;

        let signals = match UserSignals::try_from(self.bucketed_signals()) {
            Ok(signals) => signals,
            Err(e) => return Err(self.fail(self.status(), e.into())),
        };
        let request = ProofRequest {
            rule_id: rule_id.to_string(),
            rule_address,
            epoch,
        };

        self.begin(ProofStatus::Encrypting);
        let mut transitions = self.orchestrator.subscribe_status();
        let run = self.orchestrator.generate_proof(&self.identity, &signals, &request);
        tokio::pin!(run);

        let result = loop {
            tokio::select! {
                result = &mut run => break result,
                Ok(()) = transitions.changed() => {
                    let phase = *transitions.borrow_and_update();
                    if matches!(phase, ProofStatus::Encrypting | ProofStatus::Computing) {
                        self.status.send_replace(phase);
                    }
                }
            }
        };

        match result {
            Ok(output) => {
                info!(tier = %output.tier, rule_id, epoch, "Proof completed");
                self.status.send_replace(ProofStatus::Completed);
                Ok(output)
            }
            Err(e) => {
                let from = failed_phase(&e);
                Err(self.fail(from, e.into()))
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // STATUS
    // ═══════════════════════════════════════════════════════════════════════════

    fn begin(&self, status: ProofStatus) {
        self.set_error(None);
        self.status.send_replace(status);
    }

    fn fail(&self, from: ProofStatus, error: SdkError) -> SdkError {
        let message = error.to_string();
        warn!(%from, kind = ?error.kind(), error = %message, "User operation failed");
        self.set_error(Some(StatusError { from, message }));
        self.status.send_replace(ProofStatus::Error);
        error
    }

    fn set_error(&self, error: Option<StatusError>) {
        *self
            .last_error
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = error;
    }
}

/// Lifecycle phase a prover failure happened in.
fn failed_phase(error: &ProverError) -> ProofStatus {
    match error {
        ProverError::KeyFetchExhausted { .. } | ProverError::Cipher(_) => ProofStatus::Encrypting,
        _ => ProofStatus::Computing,
    }
}
