//! Lightweight in-process operational counters.
//!
//! Not a metrics exporter: just atomic counts that a component can snapshot
//! and a diagnostics endpoint can render. No histograms, no labels, no
//! Prometheus registry — each counting component owns its own [`Counter`]s
//! and exposes a plain snapshot struct.

use std::sync::atomic::{AtomicU64, Ordering};

/// A single monotonic count, safe to increment from any number of threads.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn incr(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_accumulates_across_incr_and_add() {
        let counter = Counter::new();
        counter.incr();
        counter.add(4);
        assert_eq!(counter.get(), 5);
    }
}
