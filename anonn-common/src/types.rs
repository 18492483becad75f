//! Core data model: raw signals, buckets, rules and proof outcomes.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CommonError;

/// Number of tracked signal dimensions.
pub const SIGNAL_COUNT: usize = 5;

/// Default proof validity window when a rule does not specify one.
pub const DEFAULT_PROOF_VALIDITY_SECS: u64 = 86_400;

// ═══════════════════════════════════════════════════════════════════════════════
// ADDRESS
// ═══════════════════════════════════════════════════════════════════════════════

/// A 32-byte ledger identity or account key, rendered as base58.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; 32]);

impl Address {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn to_bytes(self) -> [u8; 32] {
        self.0
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for Address {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl FromStr for Address {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| CommonError::InvalidAddress(format!("{s}: {e}")))?;
        let bytes: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| {
            CommonError::InvalidAddress(format!("{s}: expected 32 bytes, got {}", b.len()))
        })?;
        Ok(Self(bytes))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RAW SIGNALS
// ═══════════════════════════════════════════════════════════════════════════════

/// Raw, sensitive signal values as fetched from their sources.
///
/// Populated incrementally; any field may be absent.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSignals {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet_created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twitter_created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_public_repos: Option<u64>,
}

impl RawSignals {
    /// Overlay every field present in `update`, leaving the others untouched.
    pub fn merge(&mut self, update: RawSignals) {
        if update.wallet_created_at.is_some() {
            self.wallet_created_at = update.wallet_created_at;
        }
        if update.tx_count.is_some() {
            self.tx_count = update.tx_count;
        }
        if update.twitter_created_at.is_some() {
            self.twitter_created_at = update.twitter_created_at;
        }
        if update.github_created_at.is_some() {
            self.github_created_at = update.github_created_at;
        }
        if update.github_public_repos.is_some() {
            self.github_public_repos = update.github_public_repos;
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == RawSignals::default()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BUCKETS
// ═══════════════════════════════════════════════════════════════════════════════

/// Account age range. Ordinal 0..=5.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum AgeBucket {
    UnderThirtyDays = 0,
    ThirtyToNinetyDays = 1,
    NinetyToOneEightyDays = 2,
    HalfYearToOneYear = 3,
    OneToTwoYears = 4,
    OverTwoYears = 5,
}

impl AgeBucket {
    pub const ALL: [AgeBucket; 6] = [
        AgeBucket::UnderThirtyDays,
        AgeBucket::ThirtyToNinetyDays,
        AgeBucket::NinetyToOneEightyDays,
        AgeBucket::HalfYearToOneYear,
        AgeBucket::OneToTwoYears,
        AgeBucket::OverTwoYears,
    ];

    pub fn ordinal(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for AgeBucket {
    type Error = CommonError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        AgeBucket::ALL
            .get(value as usize)
            .copied()
            .ok_or(CommonError::InvalidBucket { kind: "age", value })
    }
}

impl From<AgeBucket> for u8 {
    fn from(bucket: AgeBucket) -> Self {
        bucket as u8
    }
}

/// Activity count range. Ordinal 0..=4.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum CountBucket {
    Zero = 0,
    OneToTen = 1,
    ElevenToFifty = 2,
    FiftyOneToTwoHundred = 3,
    OverTwoHundred = 4,
}

impl CountBucket {
    pub const ALL: [CountBucket; 5] = [
        CountBucket::Zero,
        CountBucket::OneToTen,
        CountBucket::ElevenToFifty,
        CountBucket::FiftyOneToTwoHundred,
        CountBucket::OverTwoHundred,
    ];

    pub fn ordinal(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for CountBucket {
    type Error = CommonError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        CountBucket::ALL
            .get(value as usize)
            .copied()
            .ok_or(CommonError::InvalidBucket { kind: "count", value })
    }
}

impl From<CountBucket> for u8 {
    fn from(bucket: CountBucket) -> Self {
        bucket as u8
    }
}

/// The five tracked dimensions, in canonical submission order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    WalletAge,
    TxCount,
    TwitterAge,
    GithubAge,
    GithubRepos,
}

impl SignalKind {
    pub const CANONICAL_ORDER: [SignalKind; SIGNAL_COUNT] = [
        SignalKind::WalletAge,
        SignalKind::TxCount,
        SignalKind::TwitterAge,
        SignalKind::GithubAge,
        SignalKind::GithubRepos,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SignalKind::WalletAge => "wallet_age",
            SignalKind::TxCount => "tx_count",
            SignalKind::TwitterAge => "twitter_age",
            SignalKind::GithubAge => "github_age",
            SignalKind::GithubRepos => "github_repos",
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// USER SIGNALS
// ═══════════════════════════════════════════════════════════════════════════════

/// Bucketed signals while collection is in progress.
///
/// An absent field means the raw value was never collected. It is never
/// conflated with the lowest bucket.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialUserSignals {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet_age_bucket: Option<AgeBucket>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_count_bucket: Option<CountBucket>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twitter_age_bucket: Option<AgeBucket>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_age_bucket: Option<AgeBucket>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_repo_bucket: Option<CountBucket>,
}

impl PartialUserSignals {
    /// Dimensions still missing, in canonical order.
    pub fn missing(&self) -> Vec<SignalKind> {
        let present = [
            self.wallet_age_bucket.is_some(),
            self.tx_count_bucket.is_some(),
            self.twitter_age_bucket.is_some(),
            self.github_age_bucket.is_some(),
            self.github_repo_bucket.is_some(),
        ];
        SignalKind::CANONICAL_ORDER
            .iter()
            .zip(present)
            .filter(|(_, present)| !present)
            .map(|(kind, _)| *kind)
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing().is_empty()
    }
}

/// Complete bucketed signals: the payload unit submitted for evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSignals {
    pub wallet_age_bucket: AgeBucket,
    pub tx_count_bucket: CountBucket,
    pub twitter_age_bucket: AgeBucket,
    pub github_age_bucket: AgeBucket,
    pub github_repo_bucket: CountBucket,
}

impl UserSignals {
    /// `[wallet_age, tx_count, twitter_age, github_age, github_repos]`
    pub fn to_array(&self) -> [u8; SIGNAL_COUNT] {
        [
            self.wallet_age_bucket.ordinal(),
            self.tx_count_bucket.ordinal(),
            self.twitter_age_bucket.ordinal(),
            self.github_age_bucket.ordinal(),
            self.github_repo_bucket.ordinal(),
        ]
    }

    pub fn from_array(values: [u8; SIGNAL_COUNT]) -> Result<Self, CommonError> {
        Ok(Self {
            wallet_age_bucket: AgeBucket::try_from(values[0])?,
            tx_count_bucket: CountBucket::try_from(values[1])?,
            twitter_age_bucket: AgeBucket::try_from(values[2])?,
            github_age_bucket: AgeBucket::try_from(values[3])?,
            github_repo_bucket: CountBucket::try_from(values[4])?,
        })
    }
}

impl TryFrom<PartialUserSignals> for UserSignals {
    type Error = CommonError;

    fn try_from(partial: PartialUserSignals) -> Result<Self, Self::Error> {
        match (
            partial.wallet_age_bucket,
            partial.tx_count_bucket,
            partial.twitter_age_bucket,
            partial.github_age_bucket,
            partial.github_repo_bucket,
        ) {
            (Some(wallet), Some(tx), Some(twitter), Some(github), Some(repos)) => Ok(Self {
                wallet_age_bucket: wallet,
                tx_count_bucket: tx,
                twitter_age_bucket: twitter,
                github_age_bucket: github,
                github_repo_bucket: repos,
            }),
            _ => Err(CommonError::MissingSignals(partial.missing())),
        }
    }
}

impl From<UserSignals> for PartialUserSignals {
    fn from(signals: UserSignals) -> Self {
        Self {
            wallet_age_bucket: Some(signals.wallet_age_bucket),
            tx_count_bucket: Some(signals.tx_count_bucket),
            twitter_age_bucket: Some(signals.twitter_age_bucket),
            github_age_bucket: Some(signals.github_age_bucket),
            github_repo_bucket: Some(signals.github_repo_bucket),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RULES
// ═══════════════════════════════════════════════════════════════════════════════

/// Per-signal minimum buckets a rule requires.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleThresholds {
    pub wallet_age_threshold: AgeBucket,
    pub tx_count_threshold: CountBucket,
    pub twitter_age_threshold: AgeBucket,
    pub github_age_threshold: AgeBucket,
    pub github_repo_threshold: CountBucket,
}

impl RuleThresholds {
    pub fn to_array(&self) -> [u8; SIGNAL_COUNT] {
        [
            self.wallet_age_threshold.ordinal(),
            self.tx_count_threshold.ordinal(),
            self.twitter_age_threshold.ordinal(),
            self.github_age_threshold.ordinal(),
            self.github_repo_threshold.ordinal(),
        ]
    }
}

fn default_proof_validity_secs() -> u64 {
    DEFAULT_PROOF_VALIDITY_SECS
}

/// A rule as authored by an authority before registration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleDefinition {
    pub rule_id: String,
    #[serde(flatten)]
    pub thresholds: RuleThresholds,
    pub tier1_min: u8,
    pub tier2_min: u8,
    #[serde(default = "default_proof_validity_secs")]
    pub proof_validity_secs: u64,
}

impl RuleDefinition {
    pub fn new(
        rule_id: impl Into<String>,
        thresholds: RuleThresholds,
        tier1_min: u8,
        tier2_min: u8,
    ) -> Self {
        Self {
            rule_id: rule_id.into(),
            thresholds,
            tier1_min,
            tier2_min,
            proof_validity_secs: DEFAULT_PROOF_VALIDITY_SECS,
        }
    }

    pub fn with_validity(mut self, secs: u64) -> Self {
        self.proof_validity_secs = secs;
        self
    }
}

/// A registered rule as stored on the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub authority: Address,
    #[serde(flatten)]
    pub definition: RuleDefinition,
    /// Unix seconds.
    pub created_at: i64,
}

impl Rule {
    pub fn id(&self) -> &str {
        &self.definition.rule_id
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROOFS
// ═══════════════════════════════════════════════════════════════════════════════

/// Proof outcome tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum Tier {
    Tier0 = 0,
    Tier1 = 1,
    Tier2 = 2,
}

impl TryFrom<u8> for Tier {
    type Error = CommonError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Tier::Tier0),
            1 => Ok(Tier::Tier1),
            2 => Ok(Tier::Tier2),
            other => Err(CommonError::InvalidTier(other)),
        }
    }
}

impl From<Tier> for u8 {
    fn from(tier: Tier) -> Self {
        tier as u8
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tier {}", *self as u8)
    }
}

/// A request to prove signals against one rule for one epoch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofRequest {
    pub rule_id: String,
    pub rule_address: Address,
    pub epoch: u64,
}

/// The single result of a successful proof lifecycle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofOutput {
    pub tier: Tier,
    pub conditions_met: u8,
    pub epoch: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof_address: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
}

/// On-ledger proof artifact for `(rule, owner, epoch)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofRecord {
    pub owner: Address,
    pub rule: Address,
    pub epoch: u64,
    pub tier: Tier,
    pub conditions_met: u8,
    pub generated_at: i64,
    pub expires_at: i64,
    #[serde(default)]
    pub is_finalized: bool,
}

impl ProofRecord {
    pub fn is_expired(&self, now_unix: i64) -> bool {
        now_unix >= self.expires_at
    }

    pub fn is_active(&self, now_unix: i64) -> bool {
        self.is_finalized && !self.is_expired(now_unix)
    }

    pub fn to_output(&self, rule_id: impl Into<String>, proof_address: Address) -> ProofOutput {
        ProofOutput {
            tier: self.tier,
            conditions_met: self.conditions_met,
            epoch: self.epoch,
            proof_address: Some(proof_address),
            generated_at: Some(self.generated_at),
            expires_at: Some(self.expires_at),
            rule_id: Some(rule_id.into()),
        }
    }
}

/// Event emitted by the target program once a proof record is written.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofGeneratedEvent {
    pub rule_id: String,
    pub proof_account: Address,
    pub epoch: u64,
    pub tier: Tier,
    pub conditions_met: u8,
    pub generated_at: i64,
    pub expires_at: i64,
}

impl ProofGeneratedEvent {
    pub fn to_output(&self) -> ProofOutput {
        ProofOutput {
            tier: self.tier,
            conditions_met: self.conditions_met,
            epoch: self.epoch,
            proof_address: Some(self.proof_account),
            generated_at: Some(self.generated_at),
            expires_at: Some(self.expires_at),
            rule_id: Some(self.rule_id.clone()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyResult {
    pub valid: bool,
    pub tier: Tier,
    pub expired: bool,
}

/// Lifecycle state of a user session as shown to the UI.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProofStatus {
    #[default]
    Idle,
    Collecting,
    Encrypting,
    Computing,
    Completed,
    Error,
}

impl fmt::Display for ProofStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProofStatus::Idle => "idle",
            ProofStatus::Collecting => "collecting",
            ProofStatus::Encrypting => "encrypting",
            ProofStatus::Computing => "computing",
            ProofStatus::Completed => "completed",
            ProofStatus::Error => "error",
        };
        f.write_str(s)
    }
}
