//! Rule validation, evaluation and tier classification.

use serde::{Deserialize, Serialize};

use crate::address::MAX_SEED_LEN;
use crate::error::CommonError;
use crate::types::{RuleDefinition, Tier, UserSignals, SIGNAL_COUNT};

/// Outcome of comparing one signal vector against one rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub conditions_met: u8,
    pub tier: Tier,
}

impl RuleDefinition {
    pub fn validate(&self) -> Result<(), CommonError> {
        if self.rule_id.is_empty() {
            return Err(CommonError::InvalidRule("rule id must not be empty".into()));
        }
        if self.rule_id.len() > MAX_SEED_LEN {
            return Err(CommonError::InvalidRule(format!(
                "rule id is {} bytes, limit is {MAX_SEED_LEN}",
                self.rule_id.len()
            )));
        }
        if self.tier1_min > self.tier2_min {
            return Err(CommonError::InvalidRule(format!(
                "tier1_min ({}) exceeds tier2_min ({})",
                self.tier1_min, self.tier2_min
            )));
        }
        if self.tier2_min as usize > SIGNAL_COUNT {
            return Err(CommonError::InvalidRule(format!(
                "tier2_min ({}) exceeds the {SIGNAL_COUNT} available conditions",
                self.tier2_min
            )));
        }
        if self.proof_validity_secs == 0 {
            return Err(CommonError::InvalidRule("proof validity must be positive".into()));
        }
        Ok(())
    }
}

/// Map a condition count onto a tier.
pub fn classify(conditions_met: u8, tier1_min: u8, tier2_min: u8) -> Tier {
    if conditions_met >= tier2_min {
        Tier::Tier2
    } else if conditions_met >= tier1_min {
        Tier::Tier1
    } else {
        Tier::Tier0
    }
}

/// Count per-field `signal >= threshold` comparisons and classify.
pub fn evaluate(signals: &UserSignals, rule: &RuleDefinition) -> Evaluation {
    let values = signals.to_array();
    let thresholds = rule.thresholds.to_array();
    let conditions_met = values
        .iter()
        .zip(thresholds.iter())
        .filter(|(value, threshold)| value >= threshold)
        .count() as u8;

    Evaluation {
        conditions_met,
        tier: classify(conditions_met, rule.tier1_min, rule.tier2_min),
    }
}

/// Human-readable tier outcome for a condition count.
pub fn describe_tier(conditions_met: u8, tier1_min: u8, tier2_min: u8) -> String {
    match classify(conditions_met, tier1_min, tier2_min) {
        Tier::Tier2 => format!("Tier 2 ({conditions_met}/{tier2_min} conditions met)"),
        Tier::Tier1 => format!("Tier 1 ({conditions_met}/{tier1_min} conditions met)"),
        Tier::Tier0 => format!("Tier 0 ({conditions_met} conditions met, need {tier1_min} for Tier 1)"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AgeBucket, CountBucket, RuleThresholds};

    fn thresholds() -> RuleThresholds {
        RuleThresholds {
            wallet_age_threshold: AgeBucket::HalfYearToOneYear,
            tx_count_threshold: CountBucket::FiftyOneToTwoHundred,
            twitter_age_threshold: AgeBucket::OneToTwoYears,
            github_age_threshold: AgeBucket::NinetyToOneEightyDays,
            github_repo_threshold: CountBucket::OneToTen,
        }
    }

    #[test]
    fn test_scenario_four_of_five_is_tier_two() {
        let signals = UserSignals::from_array([4, 4, 5, 0, 1]).unwrap();
        let rule = RuleDefinition::new("builders", thresholds(), 2, 4);
        let evaluation = evaluate(&signals, &rule);
        assert_eq!(evaluation.conditions_met, 4);
        assert_eq!(evaluation.tier, Tier::Tier2);
    }

    #[test]
    fn test_equal_to_threshold_counts_as_met() {
        let signals = UserSignals::from_array([3, 3, 4, 2, 1]).unwrap();
        let rule = RuleDefinition::new("exact", thresholds(), 2, 4);
        assert_eq!(evaluate(&signals, &rule).conditions_met, 5);
    }

    #[test]
    fn test_classify_boundaries() {
        assert_eq!(classify(0, 2, 4), Tier::Tier0);
        assert_eq!(classify(1, 2, 4), Tier::Tier0);
        assert_eq!(classify(2, 2, 4), Tier::Tier1);
        assert_eq!(classify(3, 2, 4), Tier::Tier1);
        assert_eq!(classify(4, 2, 4), Tier::Tier2);
        assert_eq!(classify(5, 2, 4), Tier::Tier2);
    }

    #[test]
    fn test_validate_rejects_bad_rules() {
        assert!(RuleDefinition::new("", thresholds(), 1, 2).validate().is_err());
        assert!(RuleDefinition::new("a".repeat(33), thresholds(), 1, 2).validate().is_err());
        assert!(RuleDefinition::new("ok", thresholds(), 3, 2).validate().is_err());
        assert!(RuleDefinition::new("ok", thresholds(), 2, 6).validate().is_err());
        assert!(RuleDefinition::new("ok", thresholds(), 2, 4)
            .with_validity(0)
            .validate()
            .is_err());
        assert!(RuleDefinition::new("ok", thresholds(), 2, 4).validate().is_ok());
    }

    #[test]
    fn test_describe_tier() {
        assert_eq!(describe_tier(4, 2, 4), "Tier 2 (4/4 conditions met)");
        assert_eq!(describe_tier(3, 2, 4), "Tier 1 (3/2 conditions met)");
        assert_eq!(describe_tier(1, 2, 4), "Tier 0 (1 conditions met, need 2 for Tier 1)");
    }
}
