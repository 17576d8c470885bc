//! Development node service.
//!
//! Wires the LYRA2 engine to an in-memory chain: every import (and every
//! block-time tick) produces a fresh template, local threads and remote miners
//! compete for it, and the chain only accepts blocks extending its best head.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use lyra2_primitives::{difficulty_to_target, BlockNumber, H256};
use parking_lot::Mutex;
use sc_consensus_lyra2::{
    BlockImport, Blake3Pow, Exit, ExitSignal, LocalMiner, Lyra2, Lyra2Config, MinerConfig,
    PowAlgorithm, SealedBlock, WorkPackage,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// parent hash (32) || number (8) || timestamp ms (8)
const HEADER_LEN: usize = 48;

#[derive(Clone, Debug)]
pub struct NodeConfig {
    pub engine: Lyra2Config,
    pub miner: MinerConfig,
    pub difficulty: u128,
    pub block_time: Duration,
    pub report_interval: Duration,
}

// ============================================================
// IN-MEMORY CHAIN
// ============================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChainHead {
    pub hash: H256,
    pub number: BlockNumber,
}

/// Longest-chain-only block store; keeps just the best head.
pub struct DevChain {
    head: Mutex<ChainHead>,
    imported: watch::Sender<ChainHead>,
}

impl Default for DevChain {
    fn default() -> Self {
        Self::new()
    }
}

impl DevChain {
    pub fn new() -> Self {
        let genesis = ChainHead { hash: H256::zero(), number: 0 };
        let (imported, _) = watch::channel(genesis);
        Self { head: Mutex::new(genesis), imported }
    }

    pub fn head(&self) -> ChainHead {
        *self.head.lock()
    }

    /// Notified with the new head after every successful import.
    pub fn subscribe(&self) -> watch::Receiver<ChainHead> {
        self.imported.subscribe()
    }

    fn extend(&self, block: &SealedBlock) -> Result<ChainHead, String> {
        let (parent, number) = decode_header(&block.work.header)
            .ok_or_else(|| format!("malformed header for #{}", block.number()))?;

        let mut head = self.head.lock();
        if parent != head.hash || number != head.number + 1 {
            return Err(format!(
                "block #{} (parent {:?}) does not extend best #{}",
                number, parent, head.number
            ));
        }

        *head = ChainHead { hash: sealed_hash(block), number };
        Ok(*head)
    }
}

#[async_trait]
impl BlockImport for DevChain {
    async fn import_block(&self, block: SealedBlock) -> Result<(), String> {
        let head = self.extend(&block)?;
        log::info!("✅ Imported block #{} hash={:?}", head.number, head.hash);
        self.imported.send_replace(head);
        Ok(())
    }
}

fn encode_header(parent: &H256, number: BlockNumber, timestamp_ms: u64) -> Vec<u8> {
    let mut header = Vec::with_capacity(HEADER_LEN);
    header.extend_from_slice(parent.as_bytes());
    header.extend_from_slice(&number.to_be_bytes());
    header.extend_from_slice(&timestamp_ms.to_be_bytes());
    header
}

fn decode_header(header: &[u8]) -> Option<(H256, BlockNumber)> {
    if header.len() != HEADER_LEN {
        return None;
    }
    let parent = H256::from_slice(&header[..32]);
    let number = u64::from_be_bytes(header[32..40].try_into().ok()?);
    Some((parent, number))
}

fn sealed_hash(block: &SealedBlock) -> H256 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&block.work.header);
    hasher.update(&block.seal.nonce.0);
    hasher.update(block.seal.mix_digest.as_bytes());
    H256::from(*hasher.finalize().as_bytes())
}

/// Template on top of `head`; the timestamp makes every refresh unique.
pub fn build_work(head: ChainHead, difficulty: u128, timestamp_ms: u64) -> WorkPackage {
    let number = head.number + 1;
    let header = encode_header(&head.hash, number, timestamp_ms);
    let pow_hash = H256::from(*blake3::hash(&header).as_bytes());
    WorkPackage::new(pow_hash, header, difficulty_to_target(difficulty), number)
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ============================================================
// BACKGROUND TASKS
// ============================================================

async fn produce_templates(
    engine: Arc<Lyra2>,
    chain: Arc<DevChain>,
    difficulty: u128,
    block_time: Duration,
    mut exit: Exit,
) {
    let mut imports = chain.subscribe();
    let mut ticker = tokio::time::interval(block_time);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = exit.wait() => break,
            changed = imports.changed() => {
                if changed.is_err() {
                    break;
                }
                ticker.reset();
            }
            _ = ticker.tick() => {}
        }

        let head = *imports.borrow_and_update();
        if let Err(e) = engine.new_work(build_work(head, difficulty, now_ms())).await {
            log::warn!("Template producer stopping: {}", e);
            break;
        }
    }
}

async fn report(engine: Arc<Lyra2>, chain: Arc<DevChain>, every: Duration, mut exit: Exit) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = exit.wait() => break,
            _ = ticker.tick() => {
                let head = chain.head();
                let total = engine.hashrate().await;
                log::info!(
                    "📊 Best #{} ({:?}) | hashrate {} H/s (local {} H/s)",
                    head.number,
                    head.hash,
                    total,
                    engine.meter().rate()
                );
            }
        }
    }
}

// ============================================================
// SERVICE
// ============================================================

pub struct Service {
    pub chain: Arc<DevChain>,
    pub engine: Arc<Lyra2>,
    miner: Option<LocalMiner>,
    stop: ExitSignal,
    tasks: Vec<JoinHandle<()>>,
}

impl Service {
    /// Start the engine, background tasks and (if configured) local miner on
    /// the current runtime.
    pub fn start(config: NodeConfig) -> std::io::Result<Self> {
        let chain = Arc::new(DevChain::new());
        let pow: Arc<dyn PowAlgorithm> = Arc::new(Blake3Pow);
        let engine = Arc::new(Lyra2::new(config.engine, pow.clone(), chain.clone()));
        let (stop, exit) = ExitSignal::new();

        log::info!(
            "⛏️  Mining at difficulty {} with {} local threads",
            config.difficulty,
            config.miner.threads
        );
        if engine.api().is_enabled() {
            log::info!("🌐 Remote mining API enabled");
        }

        let tasks = vec![
            tokio::spawn(produce_templates(
                engine.clone(),
                chain.clone(),
                config.difficulty,
                config.block_time,
                exit.clone(),
            )),
            tokio::spawn(report(engine.clone(), chain.clone(), config.report_interval, exit)),
        ];

        let miner = if config.miner.threads > 0 {
            Some(LocalMiner::start(&config.miner, &engine, pow)?)
        } else {
            None
        };

        Ok(Self { chain, engine, miner, stop, tasks })
    }

    pub async fn shutdown(self) -> Result<(), tokio::task::JoinError> {
        log::info!("Shutting down...");
        self.stop.fire();
        self.engine.close().await;

        if let Some(miner) = self.miner {
            tokio::task::spawn_blocking(move || miner.stop()).await?;
        }
        for task in self.tasks {
            task.await?;
        }

        let head = self.chain.head();
        log::info!("👋 Stopped at best #{} ({:?})", head.number, head.hash);
        Ok(())
    }
}

/// Run until Ctrl-C.
pub async fn run(config: NodeConfig) -> Result<(), Box<dyn std::error::Error>> {
    let service = Service::start(config)?;
    tokio::signal::ctrl_c().await?;
    service.shutdown().await?;
    Ok(())
}
