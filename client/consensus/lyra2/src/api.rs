//! External mining API.
//!
//! Thin facade over the sealer's request queue. It never touches mining state
//! itself: each call becomes one request, and the answer (or the exit gate)
//! decides the result.

use std::sync::Arc;

use lyra2_primitives::H256;

use crate::error::{Error, Result};
use crate::hashrate::HashMeter;
use crate::sealer::{SealerHandle, SealerRequest};
use crate::work::BlockNonce;

/// API exposed to remote miners.
///
/// Cheap to clone; every clone talks to the same sealer. Built by
/// [`crate::Lyra2::api`], which leaves the sealer out when remote mining is
/// disabled.
#[derive(Clone)]
pub struct MiningApi {
    sealer: Option<SealerHandle>,
    meter: Arc<HashMeter>,
}

impl MiningApi {
    pub(crate) fn new(sealer: Option<SealerHandle>, meter: Arc<HashMeter>) -> Self {
        Self { sealer, meter }
    }

    pub fn is_enabled(&self) -> bool {
        self.sealer.is_some()
    }

    /// Current work package as `[pow_hash, header, target, number]`, all hex.
    pub async fn get_work(&self) -> Result<[String; 4]> {
        let Some(sealer) = &self.sealer else {
            return Err(Error::Unsupported);
        };
        sealer.request(|reply| SealerRequest::FetchWork { reply }).await?
    }

    /// Submit a solution for the package identified by `hash`.
    ///
    /// `true` only if the package is live, the nonce is new for it, the proof
    /// checks out and the block was imported.
    pub async fn submit_work(&self, nonce: BlockNonce, hash: H256, digest: H256) -> bool {
        let Some(sealer) = &self.sealer else {
            return false;
        };
        sealer
            .request(|reply| SealerRequest::SubmitWork {
                nonce,
                mix_digest: digest,
                pow_hash: hash,
                reply,
            })
            .await
            .unwrap_or(false)
    }

    /// Report the hash rate of the remote miner `id`. Resolves once the sealer
    /// has recorded it.
    pub async fn submit_hashrate(&self, rate: u64, id: H256) -> bool {
        let Some(sealer) = &self.sealer else {
            return false;
        };
        sealer
            .request(|done| SealerRequest::SubmitHashrate { id, rate, done })
            .await
            .is_ok()
    }

    /// Remote plus local hash rate. Falls back to the local meter alone when
    /// the sealer cannot answer.
    pub async fn get_hashrate(&self) -> u64 {
        let Some(sealer) = &self.sealer else {
            return self.meter.rate();
        };
        match sealer.request(|reply| SealerRequest::FetchHashrate { reply }).await {
            Ok(rate) => rate,
            Err(_) => self.meter.rate(),
        }
    }
}
