//! Hand-off of solved blocks to the chain.

use async_trait::async_trait;

use crate::work::SealedBlock;

/// Chain-side collaborator receiving blocks sealed by local or remote miners.
///
/// Called off the sealer task, so implementations may take their time; the
/// submitting miner waits for the outcome. An import already running when the
/// engine closes is not cancelled: the block may land in the chain while the
/// submitter is told the engine stopped.
#[async_trait]
pub trait BlockImport: Send + Sync {
    async fn import_block(&self, block: SealedBlock) -> Result<(), String>;
}
