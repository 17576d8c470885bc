//! LYRA2 Proof-of-Work Engine
//!
//! Remote-mining core of the LYRA2 consensus engine:
//! - Work packages handed out to external miners
//! - Solution admission, verification and hand-off to block import
//! - Hash rate aggregation over many remote miners
//! - Optional local CPU miner
//!
//! All mining state lives in one sealer task. The [`Lyra2`] handle installs
//! work and owns the sealer's lifetime; [`MiningApi`] is what remote miners
//! talk to.

pub mod api;
pub mod error;
pub mod exit;
pub mod hashrate;
pub mod import;
mod ledger;
pub mod miner;
pub mod pow;
mod sealer;
pub mod work;

pub use api::MiningApi;
pub use error::{Error, Result};
pub use exit::{Exit, ExitSignal};
pub use hashrate::{HashMeter, DEFAULT_HASHRATE_EXPIRY};
pub use import::BlockImport;
pub use miner::{LocalMiner, MinerConfig};
pub use pow::{Blake3Pow, PowAlgorithm, PowOutput};
pub use work::{BlockNonce, Seal, SealedBlock, WorkPackage};

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::sealer::{SealerHandle, SealerRequest};

/// Packages kept live by default: the active one and the one it superseded
pub const DEFAULT_WORK_HISTORY: usize = 2;

#[derive(Clone, Debug)]
pub struct Lyra2Config {
    /// Serve the external mining API
    pub remote: bool,
    /// How many recent packages still accept solutions (at least 1)
    pub work_history: usize,
    /// Lifetime of a remote hash rate report without refresh
    pub hashrate_expiry: Duration,
    /// Capacity of the sealer's request queue (at least 1)
    pub request_queue: usize,
    /// Solutions allowed under verification at once
    pub max_inflight_seals: usize,
}

impl Default for Lyra2Config {
    fn default() -> Self {
        Self {
            remote: true,
            work_history: DEFAULT_WORK_HISTORY,
            hashrate_expiry: DEFAULT_HASHRATE_EXPIRY,
            request_queue: 16,
            max_inflight_seals: 64,
        }
    }
}

/// Handle to a running LYRA2 engine.
///
/// Dropping it stops the sealer just like [`Lyra2::close`], without waiting.
pub struct Lyra2 {
    config: Lyra2Config,
    sealer: SealerHandle,
    exit_signal: ExitSignal,
    meter: Arc<HashMeter>,
    work_feed: watch::Receiver<Option<Arc<WorkPackage>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Lyra2 {
    /// Start the sealer on the current tokio runtime.
    pub fn new(
        config: Lyra2Config,
        pow: Arc<dyn PowAlgorithm>,
        import: Arc<dyn BlockImport>,
    ) -> Self {
        let (exit_signal, exit) = ExitSignal::new();
        let (feed_tx, work_feed) = watch::channel(None);
        let meter = Arc::new(HashMeter::new());

        let (sealer, task) = sealer::start(&config, pow, import, meter.clone(), feed_tx, exit);

        log::info!(
            "LYRA2 engine up (remote={}, work_history={}, hashrate_expiry={:?})",
            config.remote,
            config.work_history,
            config.hashrate_expiry
        );

        Self {
            config,
            sealer,
            exit_signal,
            meter,
            work_feed,
            task: Mutex::new(Some(task)),
        }
    }

    pub fn config(&self) -> &Lyra2Config {
        &self.config
    }

    /// API for remote miners; answers `Unsupported`/`false` when remote
    /// mining is off.
    pub fn api(&self) -> MiningApi {
        let sealer = self.config.remote.then(|| self.sealer.clone());
        MiningApi::new(sealer, self.meter.clone())
    }

    /// Same API, regardless of the remote switch. Used by the local miner.
    pub(crate) fn local_api(&self) -> MiningApi {
        MiningApi::new(Some(self.sealer.clone()), self.meter.clone())
    }

    /// Install a new block template. Earlier packages stay live according to
    /// the configured history.
    pub async fn new_work(&self, work: WorkPackage) -> Result<()> {
        self.sealer.deliver(SealerRequest::NewWork(work)).await
    }

    /// Follow the installed package. The channel closes when the sealer stops.
    pub fn subscribe_work(&self) -> watch::Receiver<Option<Arc<WorkPackage>>> {
        self.work_feed.clone()
    }

    /// Remote plus local hash rate.
    pub async fn hashrate(&self) -> u64 {
        self.local_api().get_hashrate().await
    }

    pub fn meter(&self) -> Arc<HashMeter> {
        self.meter.clone()
    }

    pub fn is_running(&self) -> bool {
        !self.exit_signal.is_fired()
    }

    /// Shut the sealer down and wait for its task. Every pending and later
    /// call resolves to `Stopped`/`false`.
    pub async fn close(&self) {
        if self.exit_signal.fire() {
            log::info!("Closing LYRA2 engine");
        }
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                log::error!("LYRA2 sealer task failed: {:?}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use lyra2_primitives::H256;

    struct NoImport;

    #[async_trait]
    impl BlockImport for NoImport {
        async fn import_block(&self, _block: SealedBlock) -> std::result::Result<(), String> {
            Err("read-only".into())
        }
    }

    #[test]
    fn test_default_config() {
        let config = Lyra2Config::default();
        assert!(config.remote);
        assert_eq!(config.work_history, 2);
        assert_eq!(config.hashrate_expiry, Duration::from_secs(10));
        assert!(config.request_queue >= 1);
    }

    #[tokio::test]
    async fn test_work_feed_follows_new_work() {
        let engine = Lyra2::new(Lyra2Config::default(), Arc::new(Blake3Pow), Arc::new(NoImport));
        let mut feed = engine.subscribe_work();
        assert!(feed.borrow().is_none());

        let work = WorkPackage::with_difficulty(H256::repeat_byte(3), vec![], 1, 9);
        engine.new_work(work.clone()).await.unwrap();
        feed.changed().await.unwrap();
        assert_eq!(feed.borrow().as_deref(), Some(&work));

        engine.close().await;
        // sender went away with the sealer
        assert!(feed.changed().await.is_err());
    }

    #[tokio::test]
    async fn test_zero_sized_config_is_clamped() {
        let config = Lyra2Config {
            work_history: 0,
            request_queue: 0,
            max_inflight_seals: 0,
            ..Default::default()
        };
        let engine = Lyra2::new(config, Arc::new(Blake3Pow), Arc::new(NoImport));
        let work = WorkPackage::with_difficulty(H256::repeat_byte(1), vec![], 1, 1);
        engine.new_work(work).await.unwrap();
        assert_eq!(engine.api().get_work().await.unwrap()[3], "0x1");
        engine.close().await;
        assert!(!engine.is_running());
    }
}
