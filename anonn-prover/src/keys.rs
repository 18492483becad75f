//! Per-request key material.

use rand::rngs::OsRng;
use rand::RngCore;
use x25519_dalek::{EphemeralSecret, PublicKey, SharedSecret};

pub const NONCE_LEN: usize = 16;

/// Session keypair used once to agree a shared secret with the cluster.
pub struct SessionKeys {
    secret: EphemeralSecret,
    public: PublicKey,
}

impl SessionKeys {
    pub fn generate() -> Self {
        let secret = EphemeralSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.public.to_bytes()
    }

    /// Consume the secret; it cannot be reused for a second agreement.
    pub fn agree(self, cluster_public_key: &[u8; 32]) -> SharedSecret {
        self.secret
            .diffie_hellman(&PublicKey::from(*cluster_public_key))
    }
}

pub fn random_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Nonce as submitted on the wire: little-endian `u128`.
pub fn nonce_to_u128(nonce: &[u8; NONCE_LEN]) -> u128 {
    u128::from_le_bytes(*nonce)
}

/// Random per-request computation identifier.
pub fn random_computation_offset() -> u64 {
    OsRng.next_u64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use x25519_dalek::StaticSecret;

    #[test]
    fn test_agreement_matches_cluster_side() {
        let cluster = StaticSecret::random_from_rng(OsRng);
        let cluster_public = PublicKey::from(&cluster).to_bytes();

        let keys = SessionKeys::generate();
        let client_public = PublicKey::from(keys.public_key());
        let client_shared = keys.agree(&cluster_public);
        let cluster_shared = cluster.diffie_hellman(&client_public);

        assert_eq!(client_shared.as_bytes(), cluster_shared.as_bytes());
    }

    #[test]
    fn test_nonce_is_little_endian() {
        let mut nonce = [0u8; NONCE_LEN];
        nonce[0] = 1;
        assert_eq!(nonce_to_u128(&nonce), 1);
        nonce[15] = 0x80;
        assert_eq!(nonce_to_u128(&nonce) >> 127, 1);
    }
}
