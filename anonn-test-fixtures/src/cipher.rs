use anonn_prover::{CipherError, Ciphertext, SignalCipher, NONCE_LEN};
use sha2::{Digest, Sha256};

/// Deterministic stand-in for the network's batch cipher.
///
/// Each value is XORed with `SHA256(shared || nonce || index)`, so the same
/// shared secret and nonce decrypt it on the cluster side.
#[derive(Clone, Copy, Debug, Default)]
pub struct KeystreamCipher;

fn keystream(shared_secret: &[u8; 32], nonce: &[u8; NONCE_LEN], index: usize) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(shared_secret);
    hasher.update(nonce);
    hasher.update((index as u32).to_le_bytes());
    hasher.finalize().into()
}

impl KeystreamCipher {
    pub fn decrypt(
        &self,
        shared_secret: &[u8; 32],
        ciphertexts: &[Ciphertext],
        nonce: &[u8; NONCE_LEN],
    ) -> Vec<u64> {
        ciphertexts
            .iter()
            .enumerate()
            .map(|(i, ct)| {
                let ks = keystream(shared_secret, nonce, i);
                let mut value = [0u8; 8];
                for (j, byte) in value.iter_mut().enumerate() {
                    *byte = ct[j] ^ ks[j];
                }
                u64::from_le_bytes(value)
            })
            .collect()
    }
}

impl SignalCipher for KeystreamCipher {
    fn encrypt(
        &self,
        shared_secret: &[u8; 32],
        plaintexts: &[u64],
        nonce: &[u8; NONCE_LEN],
    ) -> Result<Vec<Ciphertext>, CipherError> {
        Ok(plaintexts
            .iter()
            .enumerate()
            .map(|(i, value)| {
                let mut block = [0u8; 32];
                block[..8].copy_from_slice(&value.to_le_bytes());
                let ks = keystream(shared_secret, nonce, i);
                for (b, k) in block.iter_mut().zip(ks) {
                    *b ^= k;
                }
                block
            })
            .collect())
    }
}
