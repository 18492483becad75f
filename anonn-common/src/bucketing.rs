//! Signal bucketing.
//!
//! Raw signal values (account creation dates, activity counts) are quantized
//! into small ordinal buckets before they ever leave the client. Buckets are a
//! pure function of the raw snapshot and the supplied "now"; nothing here is
//! cached.
//!
//! Thresholds are checked in ascending order over half-open intervals, first
//! match wins, with a final catch-all for the unbounded upper range.

use chrono::{DateTime, Utc};

use crate::types::{
    AgeBucket, CountBucket, PartialUserSignals, RawSignals, UserSignals, SIGNAL_COUNT,
};

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Upper bounds (exclusive, in milliseconds) of age buckets 0..=4.
const AGE_BOUNDS_MS: [(i64, AgeBucket); 5] = [
    (30 * DAY_MS, AgeBucket::UnderThirtyDays),
    (90 * DAY_MS, AgeBucket::ThirtyToNinetyDays),
    (180 * DAY_MS, AgeBucket::NinetyToOneEightyDays),
    (365 * DAY_MS, AgeBucket::HalfYearToOneYear),
    (730 * DAY_MS, AgeBucket::OneToTwoYears),
];

/// Upper bounds (exclusive) of count buckets 0..=3.
const COUNT_BOUNDS: [(u64, CountBucket); 4] = [
    (1, CountBucket::Zero),
    (11, CountBucket::OneToTen),
    (51, CountBucket::ElevenToFifty),
    (201, CountBucket::FiftyOneToTwoHundred),
];

// ═══════════════════════════════════════════════════════════════════════════════
// SINGLE VALUES
// ═══════════════════════════════════════════════════════════════════════════════

/// Bucket an account age expressed in milliseconds.
///
/// Negative ages (creation dates in the future, clock skew) fall into the
/// lowest bucket.
pub fn age_bucket_for_millis(age_ms: i64) -> AgeBucket {
    AGE_BOUNDS_MS
        .iter()
        .find(|(upper, _)| age_ms < *upper)
        .map(|(_, bucket)| *bucket)
        .unwrap_or(AgeBucket::OverTwoYears)
}

/// Bucket a creation timestamp relative to `now`. Absent input stays absent.
pub fn date_to_age_bucket(created_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Option<AgeBucket> {
    created_at.map(|created| age_bucket_for_millis((now - created).num_milliseconds()))
}

/// Bucket an activity count. Absent input stays absent.
pub fn count_to_bucket(count: Option<u64>) -> Option<CountBucket> {
    count.map(|count| {
        COUNT_BOUNDS
            .iter()
            .find(|(upper, _)| count < *upper)
            .map(|(_, bucket)| *bucket)
            .unwrap_or(CountBucket::OverTwoHundred)
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// SIGNAL SETS
// ═══════════════════════════════════════════════════════════════════════════════

/// Bucket every raw signal present in `raw`.
pub fn bucket_signals(raw: &RawSignals, now: DateTime<Utc>) -> PartialUserSignals {
    PartialUserSignals {
        wallet_age_bucket: date_to_age_bucket(raw.wallet_created_at, now),
        tx_count_bucket: count_to_bucket(raw.tx_count),
        twitter_age_bucket: date_to_age_bucket(raw.twitter_created_at, now),
        github_age_bucket: date_to_age_bucket(raw.github_created_at, now),
        github_repo_bucket: count_to_bucket(raw.github_public_repos),
    }
}

/// True iff all five bucket fields are defined. The sole gate before proof
/// submission.
pub fn has_all_signals(signals: &PartialUserSignals) -> bool {
    signals.is_complete()
}

/// Canonical submission vector: `[wallet_age, tx_count, twitter_age, github_age, github_repos]`.
pub fn signals_to_array(signals: &UserSignals) -> [u8; SIGNAL_COUNT] {
    signals.to_array()
}

// ═══════════════════════════════════════════════════════════════════════════════
// DISPLAY
// ═══════════════════════════════════════════════════════════════════════════════

pub fn describe_age_bucket(bucket: AgeBucket) -> &'static str {
    match bucket {
        AgeBucket::UnderThirtyDays => "< 30 days",
        AgeBucket::ThirtyToNinetyDays => "30-90 days",
        AgeBucket::NinetyToOneEightyDays => "90-180 days",
        AgeBucket::HalfYearToOneYear => "180-365 days",
        AgeBucket::OneToTwoYears => "1-2 years",
        AgeBucket::OverTwoYears => "> 2 years",
    }
}

pub fn describe_count_bucket(bucket: CountBucket) -> &'static str {
    match bucket {
        CountBucket::Zero => "0",
        CountBucket::OneToTen => "1-10",
        CountBucket::ElevenToFifty => "11-50",
        CountBucket::FiftyOneToTwoHundred => "51-200",
        CountBucket::OverTwoHundred => "> 200",
    }
}

/// Human-readable account age, e.g. `"2y 3m"`, `"5 months"`, `"12 days"`.
pub fn format_account_age(created_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let days = (now - created_at).num_days().max(0);
    let years = days / 365;
    let months = (days % 365) / 30;

    if years > 0 {
        if months > 0 {
            format!("{years}y {months}m")
        } else {
            format!("{years}y")
        }
    } else if months > 0 {
        format!("{months} month{}", if months == 1 { "" } else { "s" })
    } else {
        format!("{days} day{}", if days == 1 { "" } else { "s" })
    }
}
