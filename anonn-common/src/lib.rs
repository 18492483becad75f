//! Shared data model for anonn reputation proofs.
//!
//! Everything in this crate is synchronous and free of I/O: signal buckets,
//! rule evaluation, epoch arithmetic and deterministic address derivation.

pub mod address;
pub mod bucketing;
pub mod epoch;
pub mod error;
pub mod rule;
pub mod types;

pub use address::{find_program_address, proof_address, rule_address};
pub use bucketing::{
    bucket_signals, count_to_bucket, date_to_age_bucket, describe_age_bucket,
    describe_count_bucket, format_account_age, has_all_signals, signals_to_array,
};
pub use epoch::{EpochConfig, DEFAULT_EPOCH_SECONDS};
pub use error::{CommonError, ErrorKind};
pub use rule::{classify, describe_tier, evaluate, Evaluation};
pub use types::*;
