//! Proof-request lifecycle.
//!
//! ```text
//!   encrypting                         computing
//!  ┌────────────────────────────┐    ┌──────────────────────────────────────┐
//!  │ cluster key (retry x10)    │    │ derive proof address                 │
//!  │ session keys + shared key  │ ─► │ subscribe events ─► submit request   │
//!  │ batch-encrypt 5 buckets    │    │ await finalization ─► push/poll race │
//!  └────────────────────────────┘    └──────────────────────────────────────┘
//! ```

use std::env;
use std::sync::Arc;
use std::time::Duration;

use anonn_common::{proof_address, Address, ProofOutput, ProofRequest, ProofStatus, UserSignals};
use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::cipher::{encrypt_signals, SignalCipher};
use crate::error::ProverError;
use crate::keys::{nonce_to_u128, random_computation_offset, random_nonce, SessionKeys};
use crate::network::ComputationNetwork;
use crate::program::{ProofProgram, ProofSubmission};
use crate::reconciler::ResultReconciler;
use crate::retry::RetryPolicy;

pub const DEFAULT_FINALIZATION_TIMEOUT: Duration = Duration::from_secs(300);

/// Prover configuration.
#[derive(Clone, Debug)]
pub struct ProverConfig {
    /// Target program id.
    pub program_id: Address,
    /// Computation-network cluster selector.
    pub cluster_offset: u32,
    /// Cluster public key retrieval.
    pub key_fetch: RetryPolicy,
    /// Proof record polling.
    pub proof_poll: RetryPolicy,
    /// Upper bound on the finalization wait. `None` waits indefinitely.
    pub finalization_timeout: Option<Duration>,
}

impl ProverConfig {
    pub fn new(program_id: Address) -> Self {
        Self {
            program_id,
            cluster_offset: 0,
            key_fetch: RetryPolicy::KEY_FETCH,
            proof_poll: RetryPolicy::PROOF_POLL,
            finalization_timeout: Some(DEFAULT_FINALIZATION_TIMEOUT),
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let program_id: Address = env::var("ANONN_PROGRAM_ID")
            .context("ANONN_PROGRAM_ID must be set")?
            .parse()
            .context("ANONN_PROGRAM_ID must be a base58 address")?;

        let cluster_offset: u32 = env::var("ANONN_CLUSTER_OFFSET")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);

        // 0 disables the bound.
        let finalization_timeout = match env::var("ANONN_FINALIZATION_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => Some(DEFAULT_FINALIZATION_TIMEOUT),
        };

        Ok(Self {
            cluster_offset,
            finalization_timeout,
            ..Self::new(program_id)
        })
    }
}

pub struct ProofOrchestrator {
    config: ProverConfig,
    network: Arc<dyn ComputationNetwork>,
    program: Arc<dyn ProofProgram>,
    cipher: Arc<dyn SignalCipher>,
    status: watch::Sender<ProofStatus>,
}

impl ProofOrchestrator {
    pub fn new(
        config: ProverConfig,
        network: Arc<dyn ComputationNetwork>,
        program: Arc<dyn ProofProgram>,
        cipher: Arc<dyn SignalCipher>,
    ) -> Self {
        let (status, _) = watch::channel(ProofStatus::Idle);
        Self {
            config,
            network,
            program,
            cipher,
            status,
        }
    }

    pub fn config(&self) -> &ProverConfig {
        &self.config
    }

    pub fn status(&self) -> ProofStatus {
        *self.status.borrow()
    }

    /// Watch lifecycle transitions.
    pub fn subscribe_status(&self) -> watch::Receiver<ProofStatus> {
        self.status.subscribe()
    }

    /// Drive one proof request to a single outcome.
    ///
    /// Taking complete [`UserSignals`] enforces the all-signals precondition.
    /// The signals are only read.
    pub async fn generate_proof(
        &self,
        user: &Address,
        signals: &UserSignals,
        request: &ProofRequest,
    ) -> Result<ProofOutput, ProverError> {
        match self.run(user, signals, request).await {
            Ok(output) => {
                info!(
                    tier = %output.tier,
                    conditions_met = output.conditions_met,
                    epoch = output.epoch,
                    "Proof generated"
                );
                self.status.send_replace(ProofStatus::Completed);
                Ok(output)
            }
            Err(e) => {
                warn!(error = %e, "Proof generation failed");
                self.status.send_replace(ProofStatus::Error);
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        user: &Address,
        signals: &UserSignals,
        request: &ProofRequest,
    ) -> Result<ProofOutput, ProverError> {
        let program_id = self.config.program_id;
        self.status.send_replace(ProofStatus::Encrypting);
        info!(%program_id, cluster_offset = self.config.cluster_offset, "Starting proof generation");

        // 1. Cluster key material.
        let cluster_key = self.fetch_cluster_key().await?;
        debug!(cluster_key = %hex::encode(cluster_key), "Cluster public key fetched");

        // 2. Key agreement and batch encryption.
        let keys = SessionKeys::generate();
        let public_key = keys.public_key();
        let shared_secret = keys.agree(&cluster_key);
        let nonce = random_nonce();
        let encrypted_signals =
            encrypt_signals(self.cipher.as_ref(), shared_secret.as_bytes(), signals, &nonce)?;
        drop(shared_secret);
        debug!("Signals encrypted");

        // 3. Identifiers.
        self.status.send_replace(ProofStatus::Computing);
        let computation_offset = random_computation_offset();
        let proof_address = proof_address(&program_id, &request.rule_address, user, request.epoch)?;
        debug!(
            %proof_address,
            rule_address = %request.rule_address,
            epoch = request.epoch,
            computation_offset,
            "Derived proof address"
        );

        // Subscribe before submitting so an early event is not missed.
        let subscription = match self.program.subscribe_proof_events().await {
            Ok(subscription) => Some(subscription),
            Err(e) => {
                warn!(error = %e, "Event subscription unavailable, relying on polling");
                None
            }
        };

        // 4. Submit.
        let signature = self
            .program
            .submit_proof_request(ProofSubmission {
                payer: *user,
                rule_address: request.rule_address,
                proof_address,
                computation_offset,
                cluster_offset: self.config.cluster_offset,
                encrypted_signals,
                public_key,
                nonce: nonce_to_u128(&nonce),
                epoch: request.epoch,
            })
            .await
            .map_err(ProverError::Submission)?;
        info!(%signature, "Proof request submitted");

        // 5. Finalization.
        self.await_finalization(computation_offset).await?;
        info!(computation_offset, "Computation finalized");

        // 6. Outcome.
        ResultReconciler::new(self.program.clone(), self.config.proof_poll)
            .reconcile(subscription, proof_address, &request.rule_id)
            .await
    }

    async fn fetch_cluster_key(&self) -> Result<[u8; 32], ProverError> {
        let network = &self.network;
        let program_id = self.config.program_id;
        self.config
            .key_fetch
            .run(move |attempt| async move {
                let result = match network.fetch_cluster_public_key(&program_id).await {
                    Ok(Some(key)) => Ok(key),
                    Ok(None) => Err("MXE public key not available".to_string()),
                    Err(e) => Err(e.to_string()),
                };
                if let Err(e) = &result {
                    warn!(attempt, error = %e, "Failed to fetch cluster public key");
                }
                result
            })
            .await
            .map_err(|exhausted| ProverError::KeyFetchExhausted {
                attempts: exhausted.attempts,
                last_error: exhausted.last_error.unwrap_or_default(),
            })
    }

    async fn await_finalization(&self, computation_offset: u64) -> Result<(), ProverError> {
        let wait = self
            .network
            .await_finalization(computation_offset, &self.config.program_id);
        let result = match self.config.finalization_timeout {
            Some(timeout) => tokio::time::timeout(timeout, wait)
                .await
                .map_err(|_| ProverError::FinalizationTimeout {
                    offset: computation_offset,
                    timeout,
                })?,
            None => wait.await,
        };
        result.map_err(ProverError::Finalization)
    }
}
