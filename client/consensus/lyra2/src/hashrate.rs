//! Hash rate bookkeeping
//!
//! `HashrateTable` holds the rates reported by remote miners and is owned by
//! the sealer task. [`HashMeter`] counts hashes done by local mining threads and
//! is shared with them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use lyra2_primitives::H256;
use parking_lot::Mutex;
use tokio::time::Instant;

/// Default lifetime of a remote report without refresh
pub const DEFAULT_HASHRATE_EXPIRY: Duration = Duration::from_secs(10);

/// Minimum span the local meter averages over
pub const METER_WINDOW: Duration = Duration::from_secs(1);

#[derive(Clone, Copy, Debug)]
struct HashrateEntry {
    rate: u64,
    last_seen: Instant,
}

/// Rates reported by remote miners, keyed by their self-chosen id.
pub(crate) struct HashrateTable {
    expiry: Duration,
    entries: HashMap<H256, HashrateEntry>,
}

impl HashrateTable {
    pub(crate) fn new(expiry: Duration) -> Self {
        Self { expiry, entries: HashMap::new() }
    }

    /// Insert or refresh the report of `id`.
    pub(crate) fn submit(&mut self, id: H256, rate: u64, now: Instant) {
        self.purge(now);
        self.entries.insert(id, HashrateEntry { rate, last_seen: now });
    }

    /// Drop reports older than the expiry window.
    fn purge(&mut self, now: Instant) {
        let expiry = self.expiry;
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.last_seen) <= expiry);

        let expired = before - self.entries.len();
        if expired > 0 {
            log::debug!(
                "Expired {} hash rate reports, {} remote miners left",
                expired,
                self.entries.len()
            );
        }
    }

    /// Sum of all live reports.
    pub(crate) fn total(&mut self, now: Instant) -> u64 {
        self.purge(now);
        self.entries
            .values()
            .fold(0u64, |acc, entry| acc.saturating_add(entry.rate))
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

struct MeterWindow {
    started: std::time::Instant,
    base: u64,
    rate: u64,
}

/// Hash counter for local mining threads.
///
/// Threads call [`HashMeter::mark`] lock-free; [`HashMeter::rate`] turns the
/// counter into hashes per second, re-sampling at most once per window.
pub struct HashMeter {
    total: AtomicU64,
    window: Mutex<MeterWindow>,
}

impl HashMeter {
    pub fn new() -> Self {
        Self {
            total: AtomicU64::new(0),
            window: Mutex::new(MeterWindow {
                started: std::time::Instant::now(),
                base: 0,
                rate: 0,
            }),
        }
    }

    pub fn mark(&self, hashes: u64) {
        self.total.fetch_add(hashes, Ordering::Relaxed);
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Hashes per second over the last completed window.
    pub fn rate(&self) -> u64 {
        self.rate_at(std::time::Instant::now())
    }

    fn rate_at(&self, now: std::time::Instant) -> u64 {
        let total = self.total();
        let mut window = self.window.lock();
        let elapsed = now.saturating_duration_since(window.started);
        if elapsed >= METER_WINDOW {
            let hashes = total.saturating_sub(window.base);
            window.rate = (hashes as f64 / elapsed.as_secs_f64()) as u64;
            window.started = now;
            window.base = total;
        }
        window.rate
    }
}

impl Default for HashMeter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_sums_distinct_miners() {
        let now = Instant::now();
        let mut table = HashrateTable::new(DEFAULT_HASHRATE_EXPIRY);
        table.submit(H256::repeat_byte(1), 100, now);
        table.submit(H256::repeat_byte(2), 250, now);
        assert_eq!(table.total(now), 350);
    }

    #[test]
    fn test_resubmission_replaces_rate() {
        let now = Instant::now();
        let mut table = HashrateTable::new(DEFAULT_HASHRATE_EXPIRY);
        table.submit(H256::repeat_byte(1), 100, now);
        table.submit(H256::repeat_byte(1), 40, now + Duration::from_secs(1));
        assert_eq!(table.len(), 1);
        assert_eq!(table.total(now + Duration::from_secs(1)), 40);
    }

    #[test]
    fn test_expired_reports_are_dropped() {
        let now = Instant::now();
        let mut table = HashrateTable::new(Duration::from_secs(10));
        table.submit(H256::repeat_byte(1), 100, now);
        table.submit(H256::repeat_byte(2), 50, now + Duration::from_secs(6));

        // exactly at the window edge the report still counts
        assert_eq!(table.total(now + Duration::from_secs(10)), 150);
        assert_eq!(table.total(now + Duration::from_secs(11)), 50);
        assert!(!table.entries.contains_key(&H256::repeat_byte(1)));
        assert_eq!(table.total(now + Duration::from_secs(17)), 0);
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_submit_purges_lazily() {
        let now = Instant::now();
        let mut table = HashrateTable::new(Duration::from_secs(1));
        table.submit(H256::repeat_byte(1), 1, now);
        table.submit(H256::repeat_byte(2), 2, now + Duration::from_secs(5));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_total_saturates() {
        let now = Instant::now();
        let mut table = HashrateTable::new(DEFAULT_HASHRATE_EXPIRY);
        table.submit(H256::repeat_byte(1), u64::MAX, now);
        table.submit(H256::repeat_byte(2), 1, now);
        assert_eq!(table.total(now), u64::MAX);
    }

    #[test]
    fn test_meter_rate_over_window() {
        let meter = HashMeter::new();
        let start = meter.window.lock().started;

        meter.mark(500);
        // window not complete yet
        assert_eq!(meter.rate_at(start + Duration::from_millis(500)), 0);

        meter.mark(1_500);
        assert_eq!(meter.rate_at(start + Duration::from_secs(2)), 1_000);
        assert_eq!(meter.total(), 2_000);

        // next window starts from the sampled total
        meter.mark(300);
        assert_eq!(meter.rate_at(start + Duration::from_secs(3)), 300);
    }
}
