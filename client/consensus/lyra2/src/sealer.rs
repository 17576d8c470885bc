//! Remote sealer - the single task owning all mining state.
//!
//! Every read or write of the current work, the submission ledger and the
//! hash rate table happens inside [`RemoteSealer::run`], one request at a
//! time. Callers talk to it through [`SealerHandle`]: a request carries a
//! oneshot sender for the answer, and both the send and the wait race the
//! exit gate so nobody hangs once the sealer is gone.
//!
//! PoW verification and block import are slow, so a submitted solution is
//! only *admitted* inside the task (live package, fresh nonce) and then
//! checked on a separate task. The verdict comes back through an internal
//! channel and is recorded in the ledger before the caller is answered.

use std::sync::Arc;

use lyra2_primitives::H256;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;

use crate::error::{Error, Result};
use crate::exit::Exit;
use crate::hashrate::{HashMeter, HashrateTable};
use crate::import::BlockImport;
use crate::ledger::{Admission, SubmissionLedger};
use crate::pow::PowAlgorithm;
use crate::work::{BlockNonce, Seal, SealedBlock, WorkPackage};
use crate::Lyra2Config;

/// Requests served by the sealer task.
pub(crate) enum SealerRequest {
    FetchWork {
        reply: oneshot::Sender<Result<[String; 4]>>,
    },
    SubmitWork {
        nonce: BlockNonce,
        mix_digest: H256,
        pow_hash: H256,
        reply: oneshot::Sender<bool>,
    },
    SubmitHashrate {
        id: H256,
        rate: u64,
        done: oneshot::Sender<()>,
    },
    FetchHashrate {
        reply: oneshot::Sender<u64>,
    },
    NewWork(WorkPackage),
}

/// Outcome of an off-task verification, routed back for bookkeeping.
struct SealVerdict {
    pow_hash: H256,
    nonce: BlockNonce,
    accepted: bool,
    reply: oneshot::Sender<bool>,
}

/// Sending side of the sealer's request queue.
#[derive(Clone)]
pub(crate) struct SealerHandle {
    requests: mpsc::Sender<SealerRequest>,
    exit: Exit,
}

impl SealerHandle {
    /// Enqueue a request unless the sealer exits first.
    pub(crate) async fn deliver(&self, request: SealerRequest) -> Result<()> {
        let mut exit = self.exit.clone();
        tokio::select! {
            biased;
            _ = exit.wait() => Err(Error::Stopped),
            sent = self.requests.send(request) => sent.map_err(|_| Error::Stopped),
        }
    }

    /// Deliver a request and wait for its single answer.
    pub(crate) async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> SealerRequest,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.deliver(build(tx)).await?;

        let mut exit = self.exit.clone();
        tokio::select! {
            biased;
            answer = rx => match answer {
                Ok(value) => Ok(value),
                Err(_) if self.exit.is_fired() => Err(Error::Stopped),
                Err(_) => {
                    log::error!("LYRA2 sealer dropped a request without answering");
                    Err(Error::Internal("response channel dropped".into()))
                }
            },
            _ = exit.wait() => Err(Error::Stopped),
        }
    }
}

pub(crate) struct RemoteSealer {
    pow: Arc<dyn PowAlgorithm>,
    import: Arc<dyn BlockImport>,
    ledger: SubmissionLedger,
    rates: HashrateTable,
    meter: Arc<HashMeter>,
    work_feed: watch::Sender<Option<Arc<WorkPackage>>>,
    verdict_tx: mpsc::UnboundedSender<SealVerdict>,
    inflight: usize,
    max_inflight: usize,
    exit: Exit,
}

/// Spawn the sealer on the current runtime.
pub(crate) fn start(
    config: &Lyra2Config,
    pow: Arc<dyn PowAlgorithm>,
    import: Arc<dyn BlockImport>,
    meter: Arc<HashMeter>,
    work_feed: watch::Sender<Option<Arc<WorkPackage>>>,
    exit: Exit,
) -> (SealerHandle, tokio::task::JoinHandle<()>) {
    let (requests, request_rx) = mpsc::channel(config.request_queue.max(1));
    let (verdict_tx, verdict_rx) = mpsc::unbounded_channel();

    let sealer = RemoteSealer {
        pow,
        import,
        ledger: SubmissionLedger::new(config.work_history),
        rates: HashrateTable::new(config.hashrate_expiry),
        meter,
        work_feed,
        verdict_tx,
        inflight: 0,
        max_inflight: config.max_inflight_seals.max(1),
        exit: exit.clone(),
    };

    let task = tokio::spawn(sealer.run(request_rx, verdict_rx, exit.clone()));
    (SealerHandle { requests, exit }, task)
}

impl RemoteSealer {
    async fn run(
        mut self,
        mut requests: mpsc::Receiver<SealerRequest>,
        mut verdicts: mpsc::UnboundedReceiver<SealVerdict>,
        mut exit: Exit,
    ) {
        log::info!("🚀 LYRA2 remote sealer started");

        loop {
            tokio::select! {
                biased;
                _ = exit.wait() => break,
                Some(verdict) = verdicts.recv() => self.settle(verdict),
                request = requests.recv() => {
                    let Some(request) = request else { break; };
                    self.handle(request);
                }
            }
        }

        // Queued requests and in-flight verdicts are dropped here; their
        // callers observe the exit gate.
        requests.close();
        verdicts.close();

        log::info!("🛑 LYRA2 remote sealer stopped");
    }

    fn handle(&mut self, request: SealerRequest) {
        match request {
            SealerRequest::FetchWork { reply } => {
                let work = self
                    .ledger
                    .current()
                    .map(|work| work.to_work())
                    .ok_or(Error::NoWorkAvailable);
                let _ = reply.send(work);
            }
            SealerRequest::SubmitWork { nonce, mix_digest, pow_hash, reply } => {
                self.submit_work(pow_hash, Seal { nonce, mix_digest }, reply);
            }
            SealerRequest::SubmitHashrate { id, rate, done } => {
                self.rates.submit(id, rate, Instant::now());
                let _ = done.send(());
            }
            SealerRequest::FetchHashrate { reply } => {
                let remote = self.rates.total(Instant::now());
                let _ = reply.send(remote.saturating_add(self.meter.rate()));
            }
            SealerRequest::NewWork(work) => self.install(work),
        }
    }

    fn install(&mut self, work: WorkPackage) {
        let work = Arc::new(work);
        let refreshed = self.ledger.contains(&work.pow_hash);
        let evicted = self.ledger.insert(work.clone());

        log::info!(
            "⛏️  New work #{} pow_hash={:?} target={:?} (live={}, evicted={}, refreshed={})",
            work.number,
            work.pow_hash,
            work.target,
            self.ledger.len(),
            evicted.len(),
            refreshed,
        );

        self.work_feed.send_replace(Some(work));
    }

    fn submit_work(&mut self, pow_hash: H256, seal: Seal, reply: oneshot::Sender<bool>) {
        if self.inflight >= self.max_inflight {
            log::warn!(
                "Too many seals under verification ({}), rejecting nonce={:?}",
                self.inflight,
                seal.nonce
            );
            let _ = reply.send(false);
            return;
        }

        let work = match self.ledger.admit(&pow_hash, seal.nonce) {
            Admission::Admitted(work) => work,
            Admission::Unknown => {
                log::warn!("Work submitted but none pending pow_hash={:?}", pow_hash);
                let _ = reply.send(false);
                return;
            }
            Admission::Duplicate => {
                log::debug!("Duplicate work submitted pow_hash={:?} nonce={:?}", pow_hash, seal.nonce);
                let _ = reply.send(false);
                return;
            }
        };

        self.inflight += 1;
        let pow = self.pow.clone();
        let import = self.import.clone();
        let verdicts = self.verdict_tx.clone();
        let exit = self.exit.clone();

        tokio::spawn(async move {
            let accepted = verify_and_import(pow, import, work, seal, exit).await;
            let verdict = SealVerdict { pow_hash, nonce: seal.nonce, accepted, reply };
            // The sealer may be gone; the dropped reply then reads as stopped.
            let _ = verdicts.send(verdict);
        });
    }

    fn settle(&mut self, verdict: SealVerdict) {
        let SealVerdict { pow_hash, nonce, accepted, reply } = verdict;
        self.inflight = self.inflight.saturating_sub(1);
        self.ledger.settle(&pow_hash, nonce, accepted);
        let _ = reply.send(accepted);
    }
}

async fn verify_and_import(
    pow: Arc<dyn PowAlgorithm>,
    import: Arc<dyn BlockImport>,
    work: Arc<WorkPackage>,
    seal: Seal,
    exit: Exit,
) -> bool {
    let verified = {
        let work = work.clone();
        tokio::task::spawn_blocking(move || pow.verify(&work, &seal)).await
    };

    match verified {
        Ok(true) => {}
        Ok(false) => {
            log::warn!(
                "Invalid proof-of-work submitted #{} pow_hash={:?} nonce={:?}",
                work.number,
                work.pow_hash,
                seal.nonce
            );
            return false;
        }
        Err(e) => {
            log::error!("PoW verification task failed: {:?}", e);
            return false;
        }
    }

    // Nobody is waiting for the answer any more.
    if exit.is_fired() {
        log::debug!("Dropping verified seal #{} after shutdown", work.number);
        return false;
    }

    let number = work.number;
    let pow_hash = work.pow_hash;
    // Own task so a panicking importer still yields a verdict.
    let imported = tokio::spawn(async move {
        import.import_block(SealedBlock { work, seal }).await
    })
    .await;

    match imported {
        Ok(Ok(())) if exit.is_fired() => {
            log::warn!(
                "Sealed block #{} imported after shutdown, submitter was told stopped pow_hash={:?}",
                number,
                pow_hash
            );
            false
        }
        Ok(Ok(())) => {
            log::info!(
                "🎯 Sealed block #{} accepted pow_hash={:?} nonce={:?}",
                number,
                pow_hash,
                seal.nonce
            );
            true
        }
        Ok(Err(e)) => {
            log::warn!("❌ Failed to import sealed block #{}: {}", number, e);
            false
        }
        Err(e) => {
            log::error!("Block import task failed #{}: {:?}", number, e);
            false
        }
    }
}
