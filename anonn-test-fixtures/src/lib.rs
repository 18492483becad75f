//! Shared doubles for anonn integration tests.
//!
//! Everything here is deterministic apart from key material: a fixed clock,
//! fixed addresses, a sample rule that a complete signal set clears at Tier 2,
//! and in-memory stand-ins for the computation network and OAuth providers.

pub mod cipher;
pub mod ledger;
pub mod oauth;

use anonn_common::{
    Address, AgeBucket, CountBucket, RawSignals, RuleDefinition, RuleThresholds,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use once_cell::sync::Lazy;
use rand::RngCore;
use sha2::{Digest, Sha256};

pub use cipher::KeystreamCipher;
pub use ledger::{LedgerBehavior, MockLedger};
pub use oauth::{MockProviderApi, PopupScript, SimulatedPopup};

/// 2025-06-01T00:00:00Z.
pub const NOW_UNIX: i64 = 1_748_736_000;

pub const APP_ORIGIN: &str = "https://app.anonn.test";
pub const SAMPLE_RULE_ID: &str = "builders-2025";
pub const WALLET_TX_COUNT: u64 = 250;
pub const GITHUB_PUBLIC_REPOS: u64 = 7;

fn labelled(label: &str) -> Address {
    Address::new(Sha256::digest(label.as_bytes()).into())
}

pub static PROGRAM_ID: Lazy<Address> = Lazy::new(|| labelled("anonn:program"));
pub static AUTHORITY: Lazy<Address> = Lazy::new(|| labelled("anonn:authority"));
pub static USER: Lazy<Address> = Lazy::new(|| labelled("anonn:user"));

pub fn now() -> DateTime<Utc> {
    Utc.timestamp_opt(NOW_UNIX, 0).unwrap()
}

pub fn wallet_created_at() -> DateTime<Utc> {
    now() - Duration::days(400)
}

pub fn twitter_created_at() -> DateTime<Utc> {
    now() - Duration::days(1_000)
}

pub fn github_created_at() -> DateTime<Utc> {
    now() - Duration::days(5)
}

/// Buckets to `[4, 4, 5, 0, 1]`.
pub fn complete_raw_signals() -> RawSignals {
    RawSignals {
        wallet_created_at: Some(wallet_created_at()),
        tx_count: Some(WALLET_TX_COUNT),
        twitter_created_at: Some(twitter_created_at()),
        github_created_at: Some(github_created_at()),
        github_public_repos: Some(GITHUB_PUBLIC_REPOS),
    }
}

/// Thresholds `[3, 3, 4, 2, 1]`, tiers at 2 and 4 conditions.
pub fn sample_rule() -> RuleDefinition {
    RuleDefinition::new(
        SAMPLE_RULE_ID,
        RuleThresholds {
            wallet_age_threshold: AgeBucket::HalfYearToOneYear,
            tx_count_threshold: CountBucket::FiftyOneToTwoHundred,
            twitter_age_threshold: AgeBucket::OneToTwoYears,
            github_age_threshold: AgeBucket::NinetyToOneEightyDays,
            github_repo_threshold: CountBucket::OneToTen,
        },
        2,
        4,
    )
}

/// Fresh random address, for tests that need distinct accounts.
pub fn random_address() -> Address {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    Address::new(bytes)
}
