//! Per-identity cache node.

use orbit_common::Record;
use std::sync::Arc;

/// Lifecycle state of a cache entry.
///
/// `Loading` is transient: it exists only while the store load and the
/// `instantiate` down-call are in flight, and other locates for the same
/// identity block behind it. `Evicting` marks an entry whose flush/removal
/// is in progress with the cache mutex released; it either proceeds to
/// removal or returns to `Idle` if the flush fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Loading,
    Active,
    Idle,
    Evicting,
    Evicted,
}

/// Cache bookkeeping for one identity: the servant handle, the cached
/// durable record, pin count, dirty flag, and queue position.
pub(crate) struct Entry<S> {
    /// Live servant; `None` only while `Loading`.
    pub servant: Option<Arc<S>>,
    /// Last known durable (or to-be-made-durable) record.
    pub record: Record,
    /// Number of requests currently holding this entry.
    pub use_count: u32,
    /// True when `record` has diverged from the last durable write.
    pub dirty: bool,
    /// Bumped on every record update; guards flush/clear races.
    pub mod_seq: u64,
    /// Handle into the recency queue (assigned by the cache).
    pub queue_pos: u64,
    pub state: EntryState,
    /// Set by destroy(); the entry is unlinked when the last pin drops.
    pub destroyed: bool,
}

impl<S> Entry<S> {
    /// A pinned placeholder for an in-flight load.
    pub fn loading() -> Self {
        Self {
            servant: None,
            record: Record::from_slice(&[]),
            use_count: 1,
            dirty: false,
            mod_seq: 0,
            queue_pos: 0,
            state: EntryState::Loading,
            destroyed: false,
        }
    }

    /// True if the entry is currently serving at least one request.
    pub fn pinned(&self) -> bool {
        self.use_count > 0
    }

    /// True if a sweep may reclaim this entry.
    pub fn reclaimable(&self) -> bool {
        !self.pinned() && self.state == EntryState::Idle
    }
}
