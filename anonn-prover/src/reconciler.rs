//! Push/poll result reconciliation.
//!
//! After finalization, the outcome is fetched two ways at once: a
//! `proofGenerated` event subscription and a bounded poll of the derived proof
//! record. Whichever resolves first wins; the other is dropped, which
//! unsubscribes the listener or stops the poll loop.

use std::sync::Arc;

use anonn_common::{Address, ProofGeneratedEvent, ProofOutput, ProofRecord};
use futures::future::{self, Either};
use tracing::{debug, info, warn};

use crate::error::{NetworkError, ProverError};
use crate::program::{EventSubscription, ProofProgram};
use crate::race::race;
use crate::retry::RetryPolicy;

pub struct ResultReconciler {
    program: Arc<dyn ProofProgram>,
    poll: RetryPolicy,
}

impl ResultReconciler {
    pub fn new(program: Arc<dyn ProofProgram>, poll: RetryPolicy) -> Self {
        Self { program, poll }
    }

    /// Race the push and poll paths for the record at `proof_address`.
    ///
    /// `subscription` may be `None` when push delivery is unavailable; the
    /// poll path alone then decides the outcome.
    pub async fn reconcile(
        &self,
        subscription: Option<EventSubscription>,
        proof_address: Address,
        rule_id: &str,
    ) -> Result<ProofOutput, ProverError> {
        let push = push_path(subscription, proof_address);
        let poll = self.poll_path(proof_address);

        match race(push, poll).await {
            Either::Left(event) => {
                info!(%proof_address, "Proof event received via subscription");
                Ok(event.to_output())
            }
            Either::Right(Ok(record)) => {
                info!(%proof_address, "Proof account found via polling");
                Ok(record.to_output(rule_id, proof_address))
            }
            Either::Right(Err(e)) => Err(e),
        }
    }

    async fn poll_path(&self, proof_address: Address) -> Result<ProofRecord, ProverError> {
        let program = &self.program;
        self.poll
            .run(move |attempt| async move {
                match program.fetch_proof_record(&proof_address).await {
                    Ok(Some(record)) => Ok(record),
                    Ok(None) => {
                        debug!(attempt, "Proof account not found yet");
                        Err(None)
                    }
                    Err(e) => {
                        debug!(attempt, error = %e, "Proof account fetch failed");
                        Err(Some(e))
                    }
                }
            })
            .await
            .map_err(|exhausted| {
                let last: Option<NetworkError> = exhausted.last_error.flatten();
                warn!(attempts = exhausted.attempts, last_error = ?last, "Polling exhausted");
                ProverError::ProofNotFound {
                    attempts: exhausted.attempts,
                }
            })
    }
}

/// Resolve with the first event for `proof_address`.
///
/// Events for other proof accounts are ignored. A closed stream parks forever
/// so that the poll path decides instead.
async fn push_path(subscription: Option<EventSubscription>, proof_address: Address) -> ProofGeneratedEvent {
    let Some(mut subscription) = subscription else {
        return future::pending().await;
    };
    while let Some(event) = subscription.next().await {
        if event.proof_account == proof_address {
            return event;
        }
        debug!(account = %event.proof_account, "Ignoring event for another proof account");
    }
    debug!("Proof event stream closed");
    future::pending().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::ProofSubmission;
    use anonn_common::Tier;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn proof_account() -> Address {
        Address::new([5u8; 32])
    }

    fn record() -> ProofRecord {
        ProofRecord {
            owner: Address::new([1u8; 32]),
            rule: Address::new([2u8; 32]),
            epoch: 3,
            tier: Tier::Tier1,
            conditions_met: 3,
            generated_at: 1_000,
            expires_at: 87_400,
            is_finalized: true,
        }
    }

    fn event(account: Address, tier: Tier) -> ProofGeneratedEvent {
        ProofGeneratedEvent {
            rule_id: "r".into(),
            proof_account: account,
            epoch: 3,
            tier,
            conditions_met: 4,
            generated_at: 1_000,
            expires_at: 87_400,
        }
    }

    /// Returns the record from the `appear_on` fetch onwards.
    struct PolledProgram {
        fetches: AtomicUsize,
        appear_on: Option<usize>,
    }

    #[async_trait]
    impl ProofProgram for PolledProgram {
        fn program_id(&self) -> Address {
            Address::new([9u8; 32])
        }

        async fn subscribe_proof_events(&self) -> Result<EventSubscription, NetworkError> {
            unreachable!("subscriptions are built by the tests")
        }

        async fn submit_proof_request(&self, _: ProofSubmission) -> Result<String, NetworkError> {
            unreachable!()
        }

        async fn fetch_proof_record(&self, _: &Address) -> Result<Option<ProofRecord>, NetworkError> {
            let n = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
            match self.appear_on {
                Some(k) if n >= k => Ok(Some(record())),
                _ if n % 2 == 0 => Err(NetworkError::ConnectionFailed("flaky".into())),
                _ => Ok(None),
            }
        }
    }

    fn program(appear_on: Option<usize>) -> Arc<PolledProgram> {
        Arc::new(PolledProgram {
            fetches: AtomicUsize::new(0),
            appear_on,
        })
    }

    fn subscription() -> (EventSubscription, mpsc::UnboundedSender<ProofGeneratedEvent>, Arc<AtomicUsize>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let unsubscribed = Arc::new(AtomicUsize::new(0));
        let counter = unsubscribed.clone();
        let sub = EventSubscription::new(rx, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (sub, tx, unsubscribed)
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_wins_and_unsubscribes_once() {
        let program = program(Some(3));
        let reconciler = ResultReconciler::new(program.clone(), RetryPolicy::PROOF_POLL);
        let (sub, _tx, unsubscribed) = subscription();

        let output = reconciler.reconcile(Some(sub), proof_account(), "r").await.unwrap();

        assert_eq!(output.tier, Tier::Tier1);
        assert_eq!(output.proof_address, Some(proof_account()));
        assert_eq!(output.rule_id.as_deref(), Some("r"));
        assert_eq!(program.fetches.load(Ordering::SeqCst), 3);
        assert_eq!(unsubscribed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_push_wins_and_polling_stops() {
        let program = program(None);
        let reconciler = ResultReconciler::new(program.clone(), RetryPolicy::PROOF_POLL);
        let (sub, tx, unsubscribed) = subscription();

        let sender = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(4_500)).await;
            tx.send(event(proof_account(), Tier::Tier2)).unwrap();
            tx
        });

        let output = reconciler.reconcile(Some(sub), proof_account(), "r").await.unwrap();
        assert_eq!(output.tier, Tier::Tier2);
        assert_eq!(unsubscribed.load(Ordering::SeqCst), 1);

        let fetches = program.fetches.load(Ordering::SeqCst);
        assert_eq!(fetches, 2);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(program.fetches.load(Ordering::SeqCst), fetches);
        drop(sender.await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_foreign_events_never_win() {
        let program = program(Some(2));
        let reconciler = ResultReconciler::new(program.clone(), RetryPolicy::PROOF_POLL);
        let (sub, tx, _) = subscription();
        tx.send(event(Address::new([77u8; 32]), Tier::Tier2)).unwrap();

        let output = reconciler.reconcile(Some(sub), proof_account(), "r").await.unwrap();
        assert_eq!(output.tier, Tier::Tier1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_stream_defers_to_poll() {
        let program = program(Some(1));
        let reconciler = ResultReconciler::new(program.clone(), RetryPolicy::PROOF_POLL);
        let (sub, tx, _) = subscription();
        drop(tx);

        let output = reconciler.reconcile(Some(sub), proof_account(), "r").await.unwrap();
        assert_eq!(output.conditions_met, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_exhaustion_is_terminal() {
        let program = program(None);
        let reconciler = ResultReconciler::new(program.clone(), RetryPolicy::PROOF_POLL);

        let err = reconciler.reconcile(None, proof_account(), "r").await.unwrap_err();
        assert!(matches!(err, ProverError::ProofNotFound { attempts: 30 }));
        assert_eq!(
            err.to_string(),
            "Proof account not found after polling. MPC computation may have failed."
        );
        assert_eq!(program.fetches.load(Ordering::SeqCst), 30);
    }
}
