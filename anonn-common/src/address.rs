//! Deterministic account address derivation.
//!
//! Rule and proof record addresses are program-derived: any party holding the
//! same seeds and program id computes the same address, so a proof record can
//! be looked up idempotently without an index.

use ed25519_dalek::VerifyingKey;
use sha2::{Digest, Sha256};

use crate::error::CommonError;
use crate::types::Address;

pub const MAX_SEED_LEN: usize = 32;
pub const MAX_SEEDS: usize = 16;

const PDA_MARKER: &[u8] = b"ProgramDerivedAddress";

pub const RULE_SEED: &[u8] = b"rule";
pub const PROOF_SEED: &[u8] = b"proof";

/// Whether `bytes` decompresses to a point on the ed25519 curve.
fn is_on_curve(bytes: &[u8; 32]) -> bool {
    VerifyingKey::from_bytes(bytes).is_ok()
}

/// Hash `seeds` with `program_id`; fails if the result is a valid curve point.
pub fn create_program_address(seeds: &[&[u8]], program_id: &Address) -> Result<Address, CommonError> {
    if seeds.len() > MAX_SEEDS {
        return Err(CommonError::TooManySeeds(seeds.len()));
    }
    let mut hasher = Sha256::new();
    for seed in seeds {
        if seed.len() > MAX_SEED_LEN {
            return Err(CommonError::SeedTooLong { len: seed.len() });
        }
        hasher.update(seed);
    }
    hasher.update(program_id.as_bytes());
    hasher.update(PDA_MARKER);
    let hash: [u8; 32] = hasher.finalize().into();

    if is_on_curve(&hash) {
        return Err(CommonError::OnCurve);
    }
    Ok(Address::new(hash))
}

/// Search bump seeds from 255 down for the first off-curve address.
pub fn find_program_address(seeds: &[&[u8]], program_id: &Address) -> Result<(Address, u8), CommonError> {
    // The bump occupies one seed slot.
    if seeds.len() >= MAX_SEEDS {
        return Err(CommonError::TooManySeeds(seeds.len() + 1));
    }
    for bump in (0..=u8::MAX).rev() {
        let bump_seed = [bump];
        let mut with_bump: Vec<&[u8]> = seeds.to_vec();
        with_bump.push(&bump_seed);
        match create_program_address(&with_bump, program_id) {
            Ok(address) => return Ok((address, bump)),
            Err(CommonError::OnCurve) => continue,
            Err(e) => return Err(e),
        }
    }
    Err(CommonError::NoViableBump)
}

/// `derive("rule", authority, rule_id)`.
pub fn rule_address(program_id: &Address, authority: &Address, rule_id: &str) -> Result<Address, CommonError> {
    find_program_address(&[RULE_SEED, authority.as_ref(), rule_id.as_bytes()], program_id)
        .map(|(address, _)| address)
}

/// `derive("proof", rule, user, epoch as 8-byte little-endian)`.
pub fn proof_address(
    program_id: &Address,
    rule: &Address,
    user: &Address,
    epoch: u64,
) -> Result<Address, CommonError> {
    let epoch_le = epoch.to_le_bytes();
    find_program_address(&[PROOF_SEED, rule.as_ref(), user.as_ref(), &epoch_le[..]], program_id)
        .map(|(address, _)| address)
}
