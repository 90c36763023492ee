//! Delivery metrics for observability
//!
//! Counters describing what happened to payloads handed to a delivery
//! bridge: how many were published, confirmed, rejected, or resolved with
//! nobody left to observe the outcome.

use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics for one delivery bridge
///
/// # Example
///
/// ```
/// use rust_bus_logger::DeliveryMetrics;
///
/// let metrics = DeliveryMetrics::new();
/// metrics.record_published();
/// metrics.record_delivered();
///
/// assert_eq!(metrics.published(), 1);
/// assert_eq!(metrics.in_flight(), 0);
/// ```
#[derive(Debug, Default)]
pub struct DeliveryMetrics {
    published: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    /// Outcomes nobody was waiting for any more
    abandoned: AtomicU64,
    /// Payloads still pending when the bridge closed
    unconfirmed: AtomicU64,
    /// Second resolution attempts that were rejected
    duplicate_completions: AtomicU64,
}

impl DeliveryMetrics {
    pub const fn new() -> Self {
        Self {
            published: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            abandoned: AtomicU64::new(0),
            unconfirmed: AtomicU64::new(0),
            duplicate_completions: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn abandoned(&self) -> u64 {
        self.abandoned.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn unconfirmed(&self) -> u64 {
        self.unconfirmed.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn duplicate_completions(&self) -> u64 {
        self.duplicate_completions.load(Ordering::Relaxed)
    }

    /// Published payloads without a delivery outcome yet. Payloads dropped
    /// unconfirmed at close are no longer in flight.
    pub fn in_flight(&self) -> u64 {
        self.published()
            .saturating_sub(self.delivered())
            .saturating_sub(self.failed())
            .saturating_sub(self.unconfirmed())
    }

    #[inline]
    pub fn record_published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_abandoned(&self, count: u64) {
        self.abandoned.fetch_add(count, Ordering::Relaxed);
    }

    /// Pending payloads dropped at close; counted as abandoned too
    #[inline]
    pub fn record_unconfirmed(&self, count: u64) {
        self.unconfirmed.fetch_add(count, Ordering::Relaxed);
        self.abandoned.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_duplicate(&self) {
        self.duplicate_completions.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_flight_accounting() {
        let metrics = DeliveryMetrics::new();
        for _ in 0..5 {
            metrics.record_published();
        }
        metrics.record_delivered();
        metrics.record_delivered();
        metrics.record_failed();

        assert_eq!(metrics.in_flight(), 2);
        assert_eq!(metrics.failed(), 1);

        metrics.record_unconfirmed(2);
        assert_eq!(metrics.in_flight(), 0);
        assert_eq!(metrics.abandoned(), 2);
    }

    #[test]
    fn test_concurrent_updates() {
        use std::sync::Arc;

        let metrics = Arc::new(DeliveryMetrics::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let metrics = Arc::clone(&metrics);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        metrics.record_published();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(metrics.published(), 8000);
    }
}
