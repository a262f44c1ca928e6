//! Counters for the raffle backend.
//!
//! All counters are backed by atomics for lock-free concurrent access.

use std::sync::atomic::{AtomicU64, Ordering};

/// Aggregated metrics for the raffle backend.
///
/// Thread-safe via atomics; shared via `Arc<Metrics>`.
pub struct Metrics {
    /// Entries accepted into a round.
    pub entries_recorded: AtomicU64,
    /// Draws started (randomness requested).
    pub draws_requested: AtomicU64,
    /// Rounds closed with a successful payout.
    pub rounds_completed: AtomicU64,
    /// Payouts rejected by the treasury.
    pub payouts_failed: AtomicU64,
    /// Keeper draw attempts that failed for a reason other than "not needed".
    pub upkeep_failures: AtomicU64,
    /// Fulfillments the raffle rejected.
    pub fulfillments_rejected: AtomicU64,
    /// Sum of request-to-fulfillment latencies in milliseconds.
    pub fulfillment_latency_sum_ms: AtomicU64,
    /// Number of fulfillments contributing to the latency sum.
    pub fulfillment_count: AtomicU64,
}

impl Metrics {
    /// Create a new zeroed metrics instance.
    pub fn new() -> Self {
        Self {
            entries_recorded: AtomicU64::new(0),
            draws_requested: AtomicU64::new(0),
            rounds_completed: AtomicU64::new(0),
            payouts_failed: AtomicU64::new(0),
            upkeep_failures: AtomicU64::new(0),
            fulfillments_rejected: AtomicU64::new(0),
            fulfillment_latency_sum_ms: AtomicU64::new(0),
            fulfillment_count: AtomicU64::new(0),
        }
    }

    pub fn record_entry(&self) {
        self.entries_recorded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_draw_requested(&self) {
        self.draws_requested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_round_completed(&self) {
        self.rounds_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_payout_failure(&self) {
        self.payouts_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_upkeep_failure(&self) {
        self.upkeep_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected_fulfillment(&self) {
        self.fulfillments_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a delivered fulfillment with its latency.
    pub fn record_fulfillment(&self, latency_ms: u64) {
        self.fulfillment_latency_sum_ms
            .fetch_add(latency_ms, Ordering::Relaxed);
        self.fulfillment_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Compute average fulfillment latency in milliseconds, or 0 if none.
    pub fn avg_latency_ms(&self) -> u64 {
        let count = self.fulfillment_count.load(Ordering::Relaxed);
        if count == 0 {
            return 0;
        }
        self.fulfillment_latency_sum_ms.load(Ordering::Relaxed) / count
    }

    /// Serialize metrics as a JSON value.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "entries_recorded": self.entries_recorded.load(Ordering::Relaxed),
            "draws_requested": self.draws_requested.load(Ordering::Relaxed),
            "rounds_completed": self.rounds_completed.load(Ordering::Relaxed),
            "payouts_failed": self.payouts_failed.load(Ordering::Relaxed),
            "upkeep_failures": self.upkeep_failures.load(Ordering::Relaxed),
            "fulfillments_rejected": self.fulfillments_rejected.load(Ordering::Relaxed),
            "avg_fulfillment_latency_ms": self.avg_latency_ms(),
            "fulfillment_count": self.fulfillment_count.load(Ordering::Relaxed),
        })
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
