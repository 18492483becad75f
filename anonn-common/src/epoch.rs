//! Epoch configuration.
//!
//! Proofs are scoped to an integer period identifier rather than a timestamp,
//! so proofs from the same user are only correlatable within one period.

use std::env;

use chrono::{DateTime, Utc};

pub const DEFAULT_EPOCH_SECONDS: u64 = 86_400;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EpochConfig {
    /// Period length in seconds. Never zero.
    pub period_secs: u64,
    /// Fixed epoch returned regardless of the clock.
    pub epoch_override: Option<u64>,
}

impl Default for EpochConfig {
    fn default() -> Self {
        Self::new(DEFAULT_EPOCH_SECONDS)
    }
}

impl EpochConfig {
    pub fn new(period_secs: u64) -> Self {
        Self {
            period_secs: period_secs.max(1),
            epoch_override: None,
        }
    }

    pub fn fixed(epoch: u64) -> Self {
        Self {
            period_secs: DEFAULT_EPOCH_SECONDS,
            epoch_override: Some(epoch),
        }
    }

    /// `ANONN_EPOCH_SECONDS` (default 86400) and `ANONN_EPOCH` (override).
    pub fn from_env() -> Self {
        let period_secs = env::var("ANONN_EPOCH_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_EPOCH_SECONDS);
        let epoch_override = env::var("ANONN_EPOCH").ok().and_then(|s| s.parse().ok());

        Self {
            epoch_override,
            ..Self::new(period_secs)
        }
    }

    pub fn current_epoch(&self, now: DateTime<Utc>) -> u64 {
        if let Some(epoch) = self.epoch_override {
            return epoch;
        }
        let secs = now.timestamp().max(0) as u64;
        secs / self.period_secs
    }

    /// Unix second at which `epoch` begins.
    pub fn epoch_start(&self, epoch: u64) -> u64 {
        epoch.saturating_mul(self.period_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_floor_division() {
        let config = EpochConfig::new(86_400);
        let now = Utc.timestamp_opt(86_400 * 20_000 + 86_399, 0).unwrap();
        assert_eq!(config.current_epoch(now), 20_000);
        let next = Utc.timestamp_opt(86_400 * 20_001, 0).unwrap();
        assert_eq!(config.current_epoch(next), 20_001);
    }

    #[test]
    fn test_override_wins() {
        let config = EpochConfig::fixed(42);
        assert_eq!(config.current_epoch(Utc::now()), 42);
    }

    #[test]
    fn test_zero_period_is_clamped() {
        let config = EpochConfig::new(0);
        assert_eq!(config.period_secs, 1);
        assert_eq!(config.epoch_start(10), 10);
    }
}
