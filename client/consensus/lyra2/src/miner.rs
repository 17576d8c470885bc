//! Local CPU miner.
//!
//! OS threads following the sealer's work feed. Each thread grinds nonces in
//! chunks, re-checking the feed between chunks, and hands solutions to the
//! sealer like any remote miner would.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{SystemTime, UNIX_EPOCH};

use lyra2_primitives::hash_meets_target;
use tokio::sync::watch;

use crate::api::MiningApi;
use crate::exit::{Exit, ExitSignal};
use crate::hashrate::HashMeter;
use crate::pow::PowAlgorithm;
use crate::work::{BlockNonce, Seal, WorkPackage};
use crate::Lyra2;

/// Nonces tried between two looks at the work feed.
const CHUNK_ITERS: u64 = 4_096;

#[derive(Clone, Debug)]
pub struct MinerConfig {
    /// Number of mining threads; 0 disables local mining
    pub threads: usize,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self { threads: 1 }
    }
}

pub struct LocalMiner {
    stop: ExitSignal,
    workers: Vec<JoinHandle<()>>,
}

struct Worker {
    id: usize,
    pow: Arc<dyn PowAlgorithm>,
    api: MiningApi,
    feed: watch::Receiver<Option<Arc<WorkPackage>>>,
    meter: Arc<HashMeter>,
    stop: Exit,
}

impl LocalMiner {
    pub fn start(
        config: &MinerConfig,
        engine: &Lyra2,
        pow: Arc<dyn PowAlgorithm>,
    ) -> std::io::Result<Self> {
        let (stop, exit) = ExitSignal::new();
        let mut workers = Vec::with_capacity(config.threads);

        for id in 0..config.threads {
            let worker = Worker {
                id,
                pow: pow.clone(),
                api: engine.local_api(),
                feed: engine.subscribe_work(),
                meter: engine.meter(),
                stop: exit.clone(),
            };
            let handle = std::thread::Builder::new()
                .name(format!("lyra2-miner-{}", id))
                .spawn(move || worker.run())?;
            workers.push(handle);
        }

        log::info!("⛏️  Local miner started with {} threads", config.threads);
        Ok(Self { stop, workers })
    }

    pub fn threads(&self) -> usize {
        self.workers.len()
    }

    /// Stop all threads and wait for them.
    pub fn stop(mut self) {
        self.stop.fire();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                log::error!("Miner thread panicked");
            }
        }
        log::info!("🛑 Local miner stopped");
    }
}

impl Drop for LocalMiner {
    fn drop(&mut self) {
        self.stop.fire();
    }
}

impl Worker {
    fn run(mut self) {
        let mut nonce = seed_nonce(self.id);
        log::debug!("Miner thread {} started", self.id);

        loop {
            let current = self.feed.borrow_and_update().clone();
            let Some(work) = current else {
                if !self.wait_for_work() {
                    break;
                }
                continue;
            };

            match self.search(&work, &mut nonce) {
                Some(seal) => {
                    let accepted = futures::executor::block_on(self.api.submit_work(
                        seal.nonce,
                        work.pow_hash,
                        seal.mix_digest,
                    ));
                    log::debug!(
                        "Miner thread {} solved #{} nonce={:?} accepted={}",
                        self.id,
                        work.number,
                        seal.nonce,
                        accepted
                    );
                    // nothing left to do on this package
                    if !self.wait_for_work() {
                        break;
                    }
                }
                None => {
                    if self.stop.is_fired() || self.feed.has_changed().is_err() {
                        break;
                    }
                }
            }
        }

        log::debug!("Miner thread {} exiting", self.id);
    }

    /// Block until the feed moves. `false` once stopped or the sealer is gone.
    fn wait_for_work(&mut self) -> bool {
        let Worker { feed, stop, .. } = self;
        futures::executor::block_on(async {
            tokio::select! {
                biased;
                _ = stop.wait() => false,
                changed = feed.changed() => changed.is_ok(),
            }
        })
    }

    /// Grind nonces until a solution is found, new work arrives or we are
    /// told to stop.
    fn search(&mut self, work: &WorkPackage, nonce: &mut u64) -> Option<Seal> {
        loop {
            if self.stop.is_fired() || self.feed.has_changed().unwrap_or(true) {
                return None;
            }

            for tried in 1..=CHUNK_ITERS {
                let candidate = BlockNonce::from(*nonce);
                *nonce = nonce.wrapping_add(1);

                let out = self.pow.compute(&work.pow_hash, candidate);
                if hash_meets_target(&out.result, &work.target) {
                    self.meter.mark(tried);
                    return Some(Seal { nonce: candidate, mix_digest: out.mix_digest });
                }
            }
            self.meter.mark(CHUNK_ITERS);
        }
    }
}

/// Per-thread starting nonce: wall clock spread by thread id.
fn seed_nonce(id: usize) -> u64 {
    let seed_time = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    seed_time.wrapping_add((id as u64) << 48)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::BlockImport;
    use crate::pow::Blake3Pow;
    use crate::work::SealedBlock;
    use crate::Lyra2Config;
    use async_trait::async_trait;
    use lyra2_primitives::H256;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Chain {
        blocks: Mutex<Vec<SealedBlock>>,
    }

    #[async_trait]
    impl BlockImport for Chain {
        async fn import_block(&self, block: SealedBlock) -> Result<(), String> {
            self.blocks.lock().push(block);
            Ok(())
        }
    }

    #[test]
    fn test_seed_nonces_differ_per_thread() {
        assert_ne!(seed_nonce(0) >> 48, seed_nonce(1) >> 48);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_local_miner_seals_blocks() {
        let chain = Arc::new(Chain::default());
        let pow = Arc::new(Blake3Pow);
        // local mining works with the remote API switched off
        let config = Lyra2Config { remote: false, ..Default::default() };
        let engine = Lyra2::new(config, pow.clone(), chain.clone());
        let miner = LocalMiner::start(&MinerConfig { threads: 2 }, &engine, pow).unwrap();
        assert_eq!(miner.threads(), 2);

        let work = WorkPackage::with_difficulty(H256::repeat_byte(7), vec![7], 64, 1);
        engine.new_work(work).await.unwrap();

        let mined = tokio::time::timeout(Duration::from_secs(10), async {
            while chain.blocks.lock().is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(mined.is_ok());
        assert!(engine.meter().total() > 0);

        // each thread may land its own nonce
        let blocks = chain.blocks.lock().clone();
        assert!(blocks.iter().all(|b| b.work.pow_hash == H256::repeat_byte(7)));

        tokio::task::spawn_blocking(move || miner.stop()).await.unwrap();
        engine.close().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_threads_exit_when_engine_closes() {
        let chain = Arc::new(Chain::default());
        let pow = Arc::new(Blake3Pow);
        let engine = Lyra2::new(Lyra2Config::default(), pow.clone(), chain);
        let mut miner = LocalMiner::start(&MinerConfig { threads: 1 }, &engine, pow).unwrap();

        // unreachable target keeps the thread grinding
        let work = WorkPackage::new(H256::repeat_byte(1), vec![], H256::zero(), 1);
        engine.new_work(work).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        engine.close().await;

        let workers = std::mem::take(&mut miner.workers);
        let joined = tokio::task::spawn_blocking(move || {
            for handle in workers {
                handle.join().unwrap();
            }
        });
        assert!(tokio::time::timeout(Duration::from_secs(5), joined).await.is_ok());
    }
}
