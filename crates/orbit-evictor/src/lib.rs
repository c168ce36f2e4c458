//! Orbit Evictor - Capacity-bounded, persistence-backed servant cache
//!
//! This crate implements the core of Orbit's request path between the
//! dispatcher and durable storage:
//! - Map + LRU recency queue under a single mutex
//! - Entry lifecycle with pinning (`locate`/lease-drop as `finished`)
//! - Three persistence strategies (immediate, transactional, background)
//! - A background sweeper flushing dirty entries and reclaiming tail
//!   entries down to capacity
//! - Deactivation draining for shutdown
//!
//! Guarantees, at every point where the cache mutex is not held: at most
//! one in-memory servant per identity, pinned entries are never evicted,
//! dirty entries are flushed before reclamation, and the mutex is never
//! held across storage I/O or the `instantiate`/`evict` down-calls.

mod cache;
mod entry;
mod sweeper;

pub mod evictor;
pub mod policy;
pub mod strategy;
pub mod transaction;

// Re-exports
pub use cache::CacheStats;
pub use entry::EntryState;
pub use evictor::{Activator, Evictor, EvictorConfig, EvictorStats, Lease};
pub use policy::EvictionPolicy;
pub use strategy::{
    BackgroundStrategy, ImmediateStrategy, PersistenceStrategy, SaveOutcome,
    TransactionalStrategy,
};
pub use transaction::Transaction;
