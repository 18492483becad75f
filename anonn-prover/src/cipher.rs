//! Signal encryption seam.

use anonn_common::{UserSignals, SIGNAL_COUNT};

use crate::error::CipherError;
use crate::keys::NONCE_LEN;

pub type Ciphertext = [u8; 32];

/// Batch cipher shared with the computation network.
///
/// All values are encrypted in one call under one nonce: the network expects
/// a single atomic bundle, not independent ciphertexts.
pub trait SignalCipher: Send + Sync {
    fn encrypt(
        &self,
        shared_secret: &[u8; 32],
        plaintexts: &[u64],
        nonce: &[u8; NONCE_LEN],
    ) -> Result<Vec<Ciphertext>, CipherError>;
}

/// Encrypt the canonical five-element signal vector.
pub fn encrypt_signals(
    cipher: &dyn SignalCipher,
    shared_secret: &[u8; 32],
    signals: &UserSignals,
    nonce: &[u8; NONCE_LEN],
) -> Result<[Ciphertext; SIGNAL_COUNT], CipherError> {
    let plaintexts = signals.to_array().map(u64::from);
    let ciphertexts = cipher.encrypt(shared_secret, &plaintexts, nonce)?;
    let actual = ciphertexts.len();
    ciphertexts.try_into().map_err(|_| CipherError::BatchLength {
        expected: SIGNAL_COUNT,
        actual,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records each batch and echoes plaintexts into the first byte.
    #[derive(Default)]
    struct RecordingCipher {
        batches: Mutex<Vec<Vec<u64>>>,
        drop_last: bool,
    }

    impl SignalCipher for RecordingCipher {
        fn encrypt(&self, _: &[u8; 32], plaintexts: &[u64], _: &[u8; NONCE_LEN]) -> Result<Vec<Ciphertext>, CipherError> {
            self.batches.lock().unwrap().push(plaintexts.to_vec());
            let mut out: Vec<Ciphertext> = plaintexts
                .iter()
                .map(|v| {
                    let mut c = [0u8; 32];
                    c[0] = *v as u8;
                    c
                })
                .collect();
            if self.drop_last {
                out.pop();
            }
            Ok(out)
        }
    }

    #[test]
    fn test_single_batch_in_canonical_order() {
        let cipher = RecordingCipher::default();
        let signals = UserSignals::from_array([4, 4, 5, 0, 1]).unwrap();
        let out = encrypt_signals(&cipher, &[0u8; 32], &signals, &[0u8; NONCE_LEN]).unwrap();

        let batches = cipher.batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0], vec![4, 4, 5, 0, 1]);
        assert_eq!(out.map(|c| c[0]), [4, 4, 5, 0, 1]);
    }

    #[test]
    fn test_short_batch_is_rejected() {
        let cipher = RecordingCipher {
            drop_last: true,
            ..Default::default()
        };
        let signals = UserSignals::from_array([1, 1, 1, 1, 1]).unwrap();
        let err = encrypt_signals(&cipher, &[0u8; 32], &signals, &[0u8; NONCE_LEN]).unwrap_err();
        assert_eq!(err, CipherError::BatchLength { expected: 5, actual: 4 });
    }
}
