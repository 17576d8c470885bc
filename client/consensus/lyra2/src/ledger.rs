//! Submission ledger - bounded history of live work packages
//!
//! Keeps the last `capacity` packages keyed by pow-hash (the active one plus
//! the ones it recently superseded) and, per package, which nonces are being
//! verified or were already accepted. Anything not in the history is stale.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use lyra2_primitives::H256;

use crate::work::{BlockNonce, WorkPackage};

/// Outcome of the admission check for a submitted solution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Admission {
    /// Package is live and the nonce is new; it is now marked pending
    Admitted(Arc<WorkPackage>),
    /// Pow-hash was never issued or has fallen out of the history
    Unknown,
    /// Nonce is already accepted or under verification for this package
    Duplicate,
}

struct LedgerEntry {
    work: Arc<WorkPackage>,
    pending: HashSet<BlockNonce>,
    accepted: HashSet<BlockNonce>,
}

pub(crate) struct SubmissionLedger {
    capacity: usize,
    order: VecDeque<H256>,
    works: HashMap<H256, LedgerEntry>,
}

impl SubmissionLedger {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            works: HashMap::new(),
        }
    }

    /// Install a package as the most recent one. Re-installing a pow-hash
    /// already in the history refreshes its position but keeps its nonces.
    /// Returns the pow-hashes evicted to stay within capacity.
    pub(crate) fn insert(&mut self, work: Arc<WorkPackage>) -> Vec<H256> {
        let hash = work.pow_hash;

        if let Some(entry) = self.works.get_mut(&hash) {
            entry.work = work;
            self.order.retain(|h| *h != hash);
        } else {
            self.works.insert(
                hash,
                LedgerEntry { work, pending: HashSet::new(), accepted: HashSet::new() },
            );
        }
        self.order.push_back(hash);

        let mut evicted = Vec::new();
        while self.order.len() > self.capacity {
            if let Some(old) = self.order.pop_front() {
                self.works.remove(&old);
                evicted.push(old);
            }
        }
        evicted
    }

    /// Check a submission and, if it may proceed, mark the nonce pending.
    pub(crate) fn admit(&mut self, pow_hash: &H256, nonce: BlockNonce) -> Admission {
        let Some(entry) = self.works.get_mut(pow_hash) else {
            return Admission::Unknown;
        };
        if entry.accepted.contains(&nonce) || !entry.pending.insert(nonce) {
            return Admission::Duplicate;
        }
        Admission::Admitted(entry.work.clone())
    }

    /// Record the verdict for a previously admitted nonce. Packages evicted
    /// while the nonce was being verified are silently skipped.
    pub(crate) fn settle(&mut self, pow_hash: &H256, nonce: BlockNonce, accepted: bool) {
        let Some(entry) = self.works.get_mut(pow_hash) else {
            return;
        };
        entry.pending.remove(&nonce);
        if accepted {
            entry.accepted.insert(nonce);
        }
    }

    pub(crate) fn contains(&self, pow_hash: &H256) -> bool {
        self.works.contains_key(pow_hash)
    }

    /// Most recently installed package
    pub(crate) fn current(&self) -> Option<&Arc<WorkPackage>> {
        self.order.back().and_then(|h| self.works.get(h)).map(|e| &e.work)
    }

    pub(crate) fn len(&self) -> usize {
        self.works.len()
    }
}
