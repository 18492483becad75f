//! Rule-authority facade: register rules and inspect the proofs issued against them.

use std::sync::Arc;

use anonn_common::{
    proof_address, rule_address, Address, ProofRecord, Rule, RuleDefinition, Tier, VerifyResult,
};
use anonn_prover::RuleProgram;
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::SdkError;
use crate::user::Clock;

/// Outcome counts over the proofs of one rule.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ProofStats {
    pub total: usize,
    pub tier0: usize,
    pub tier1: usize,
    pub tier2: usize,
    pub active: usize,
    pub expired: usize,
}

impl ProofStats {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a ProofRecord>, now_unix: i64) -> Self {
        let mut stats = Self::default();
        for record in records {
            stats.total += 1;
            match record.tier {
                Tier::Tier0 => stats.tier0 += 1,
                Tier::Tier1 => stats.tier1 += 1,
                Tier::Tier2 => stats.tier2 += 1,
            }
            if record.is_active(now_unix) {
                stats.active += 1;
            }
            if record.is_expired(now_unix) {
                stats.expired += 1;
            }
        }
        stats
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct RuleProofs {
    /// Newest first.
    pub proofs: Vec<(Address, ProofRecord)>,
    pub stats: ProofStats,
}

pub struct AnonnDeveloper {
    authority: Address,
    program: Arc<dyn RuleProgram>,
    clock: Clock,
}

impl AnonnDeveloper {
    pub fn new(authority: Address, program: Arc<dyn RuleProgram>) -> Self {
        Self {
            authority,
            program,
            clock: Utc::now,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn authority(&self) -> Address {
        self.authority
    }

    fn now_unix(&self) -> i64 {
        (self.clock)().timestamp()
    }

    /// Validate and register `rule` under this authority.
    pub async fn register_rule(&self, rule: &RuleDefinition) -> Result<Address, SdkError> {
        rule.validate()?;
        let expected = self.rule_address(&rule.rule_id)?;
        let address = self.program.register_rule(&self.authority, rule).await?;
        if address != expected {
            warn!(%address, %expected, "Program returned an unexpected rule address");
        }
        info!(rule_id = %rule.rule_id, %address, "Rule registered");
        Ok(address)
    }

    pub fn rule_address(&self, rule_id: &str) -> Result<Address, SdkError> {
        Ok(rule_address(&self.program.program_id(), &self.authority, rule_id)?)
    }

    pub fn proof_address(&self, rule_address: &Address, user: &Address, epoch: u64) -> Result<Address, SdkError> {
        Ok(proof_address(&self.program.program_id(), rule_address, user, epoch)?)
    }

    pub async fn get_rule(&self, rule_address: &Address) -> Result<Option<Rule>, SdkError> {
        Ok(self.program.fetch_rule(rule_address).await?)
    }

    /// Rules registered by this authority.
    pub async fn rules(&self) -> Result<Vec<(Address, Rule)>, SdkError> {
        let mut rules: Vec<_> = self
            .program
            .list_rules()
            .await?
            .into_iter()
            .filter(|(_, rule)| rule.authority == self.authority)
            .collect();
        rules.sort_by(|a, b| b.1.created_at.cmp(&a.1.created_at));
        Ok(rules)
    }

    pub async fn get_proof(&self, proof_address: &Address) -> Result<Option<ProofRecord>, SdkError> {
        Ok(self.program.fetch_proof_record(proof_address).await?)
    }

    /// Check a proof against `rule_address` and `expected_epoch`.
    ///
    /// The ledger's own check is authoritative. If it rejects the proof, the
    /// fetched record is inspected so an expired proof reports `expired`.
    pub async fn verify_proof(
        &self,
        proof_address: &Address,
        rule_address: &Address,
        expected_epoch: u64,
    ) -> Result<VerifyResult, SdkError> {
        let now = self.now_unix();
        let Some(record) = self.get_proof(proof_address).await? else {
            return Ok(VerifyResult {
                valid: false,
                tier: Tier::Tier0,
                expired: false,
            });
        };

        if record.rule != *rule_address || record.epoch != expected_epoch {
            debug!(%proof_address, epoch = record.epoch, expected_epoch, "Proof does not match rule or epoch");
            return Ok(VerifyResult {
                valid: false,
                tier: record.tier,
                expired: record.is_expired(now),
            });
        }

        match self.program.verify_proof(proof_address).await {
            Ok(result) => Ok(result),
            Err(e) => {
                debug!(%proof_address, error = %e, "On-ledger verification rejected, inspecting record");
                Ok(VerifyResult {
                    valid: false,
                    tier: record.tier,
                    expired: record.is_expired(now),
                })
            }
        }
    }

    /// All proofs issued against `rule_address`, newest first, with summary counts.
    pub async fn proofs_for_rule(&self, rule_address: &Address) -> Result<RuleProofs, SdkError> {
        if self.get_rule(rule_address).await?.is_none() {
            return Err(SdkError::RuleNotFound(*rule_address));
        }
        let mut proofs = self.program.list_proofs_for_rule(rule_address).await?;
        proofs.sort_by(|a, b| b.1.generated_at.cmp(&a.1.generated_at));
        let stats = ProofStats::from_records(proofs.iter().map(|(_, record)| record), self.now_unix());
        Ok(RuleProofs { proofs, stats })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(tier: Tier, generated_at: i64, is_finalized: bool) -> ProofRecord {
        ProofRecord {
            owner: Address::new([1u8; 32]),
            rule: Address::new([2u8; 32]),
            epoch: 1,
            tier,
            conditions_met: 0,
            generated_at,
            expires_at: generated_at + 100,
            is_finalized,
        }
    }

    #[test]
    fn test_stats_count_tiers_and_expiry() {
        let records = vec![
            record(Tier::Tier2, 1_000, true),
            record(Tier::Tier2, 1_050, false),
            record(Tier::Tier1, 900, true),
            record(Tier::Tier0, 1_080, true),
        ];
        let stats = ProofStats::from_records(&records, 1_100);
        assert_eq!(
            stats,
            ProofStats {
                total: 4,
                tier0: 1,
                tier1: 1,
                tier2: 2,
                active: 1,
                expired: 2,
            }
        );
    }
}
