//! Eviction policy: how many tail entries a sweep reclaims.
//!
//! Both sweep triggers (on-finished and periodic) run the same policy;
//! neither subsumes the other. On-finished gives immediate capacity
//! enforcement when a use count returns to zero; periodic sweeps also
//! cover workloads that keep entries pinned for long stretches and are
//! required for the background persistence mode's flush cycle.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Decides how many queue-tail entries with use count zero a sweep should
/// reclaim. The capacity is adjustable at runtime; deactivation drops it
/// to zero so draining sweeps reclaim everything.
#[derive(Debug)]
pub struct EvictionPolicy {
    capacity: AtomicUsize,
}

impl EvictionPolicy {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: AtomicUsize::new(capacity),
        }
    }

    /// Current effective capacity in entries.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Relaxed)
    }

    /// Replace the effective capacity (used by deactivation).
    pub fn set_capacity(&self, capacity: usize) {
        self.capacity.store(capacity, Ordering::Relaxed);
    }

    /// Number of entries a sweep should try to reclaim at the given cache
    /// size. Zero when at or under capacity.
    #[must_use]
    pub fn reclaim_count(&self, size: usize) -> usize {
        size.saturating_sub(self.capacity())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reclaim_count() {
        let policy = EvictionPolicy::new(2);
        assert_eq!(policy.reclaim_count(0), 0);
        assert_eq!(policy.reclaim_count(2), 0);
        assert_eq!(policy.reclaim_count(5), 3);
    }

    #[test]
    fn test_zero_capacity_reclaims_everything() {
        let policy = EvictionPolicy::new(8);
        policy.set_capacity(0);
        assert_eq!(policy.reclaim_count(3), 3);
    }
}
