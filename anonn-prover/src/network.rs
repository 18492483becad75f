use anonn_common::Address;
use async_trait::async_trait;

use crate::error::NetworkError;

/// The remote network that evaluates encrypted signals.
#[async_trait]
pub trait ComputationNetwork: Send + Sync {
    /// Cluster x25519 public key for `program_id`; `Ok(None)` while the key
    /// has not been published yet.
    async fn fetch_cluster_public_key(&self, program_id: &Address) -> Result<Option<[u8; 32]>, NetworkError>;

    /// Resolve once the computation identified by `computation_offset` has
    /// been finalized by the network.
    async fn await_finalization(&self, computation_offset: u64, program_id: &Address) -> Result<(), NetworkError>;
}
