//! The evictor façade: the dispatcher-facing locate/finished/deactivate
//! contract over the servant cache.
//!
//! Locking discipline: the cache mutex guards only map/queue/use-count/
//! dirty-flag bookkeeping and is held for O(1) critical sections. Storage
//! I/O and the `instantiate`/`evict` down-calls always run with the mutex
//! released, so unrelated identities stay lock-free while one identity
//! blocks on the store. A servant's own state is guarded by its own lock,
//! which this module never takes.

use crate::cache::{CacheStats, EvictorCache};
use crate::entry::{Entry, EntryState};
use crate::policy::EvictionPolicy;
use crate::strategy::{
    BackgroundStrategy, ImmediateStrategy, PersistenceStrategy, SaveOutcome, TransactionalStrategy,
};
use crate::sweeper::BackgroundSweeper;
use crate::transaction::Transaction;
use orbit_common::config::{EvictorSettings, PersistenceMode, SweepTriggerSetting};
use orbit_common::{Error, Identity, Record, Result};
use orbit_store::TransactionalStore;
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Down-calls from the generic cache into object-kind-specific logic.
///
/// The evictor is generic over this interface rather than over concrete
/// object types: `instantiate` turns a durable record into a live
/// servant on a cache miss, `evict` is notified immediately before a
/// servant leaves memory.
pub trait Activator: Send + Sync + 'static {
    type Servant: Send + Sync + 'static;

    /// Build a servant from its durable record.
    fn instantiate(&self, id: &Identity, record: &Record) -> Result<Self::Servant>;

    /// Notification that the servant is about to leave memory. Its record
    /// has already been made durable.
    fn evict(&self, id: &Identity, servant: &Self::Servant) {
        let _ = (id, servant);
    }
}

/// Runtime evictor configuration.
#[derive(Clone, Debug)]
pub struct EvictorConfig {
    /// Cache capacity in entries.
    pub capacity: usize,
    /// Background flush / periodic sweep interval.
    pub flush_interval: Duration,
    /// When eviction sweeps run.
    pub sweep_trigger: SweepTriggerSetting,
    /// How long deactivation waits for in-flight requests.
    pub drain_timeout: Duration,
}

impl Default for EvictorConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            flush_interval: Duration::from_millis(1000),
            sweep_trigger: SweepTriggerSetting::OnFinished,
            drain_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&EvictorSettings> for EvictorConfig {
    fn from(settings: &EvictorSettings) -> Self {
        Self {
            capacity: settings.capacity,
            flush_interval: settings.flush_interval(),
            sweep_trigger: settings.sweep_trigger,
            drain_timeout: settings.drain_timeout(),
        }
    }
}

/// Counter snapshot for the telemetry collaborator.
#[derive(Debug, Clone, Copy)]
pub struct EvictorStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Current cache size including pinned entries.
    pub size: usize,
    /// Entries whose record has diverged from the last durable write.
    pub dirty: usize,
}

/// State shared between the façade, its leases, and the sweeper thread.
pub(crate) struct Shared<A: Activator> {
    pub cache: Mutex<EvictorCache<A::Servant>>,
    pub cond: Condvar,
    pub policy: EvictionPolicy,
    pub trigger: SweepTriggerSetting,
    pub strategy: Arc<dyn PersistenceStrategy>,
    pub activator: A,
    pub counters: CacheStats,
    pub deactivated: AtomicBool,
}

struct SweepItem<S> {
    id: Identity,
    record: Record,
    dirty: bool,
    mod_seq: u64,
    servant: Option<Arc<S>>,
}

impl<A: Activator> Shared<A> {
    fn on_finished_trigger(&self) -> bool {
        matches!(
            self.trigger,
            SweepTriggerSetting::OnFinished | SweepTriggerSetting::Both
        )
    }

    /// Release one pin. Runs the on-finished sweep when the count returns
    /// to zero and the cache is over capacity.
    pub(crate) fn finished(&self, id: &Identity) {
        let mut evict_notice = None;
        let run_sweep;
        {
            let mut cache = self.cache.lock();
            let remove_now = match cache.lookup_mut(id) {
                None => {
                    error!("finished() for unknown entry {id}");
                    return;
                }
                Some(entry) => {
                    if entry.use_count == 0 {
                        // Defensive: never underflow, even on misuse.
                        error!("{}", Error::UseCountUnderflow(id.clone()));
                        return;
                    }
                    entry.use_count -= 1;
                    if entry.use_count > 0 {
                        false
                    } else if entry.destroyed {
                        true
                    } else {
                        entry.state = EntryState::Idle;
                        false
                    }
                }
            };
            if remove_now {
                if let Some(entry) = cache.remove(id) {
                    evict_notice = entry.servant.map(|servant| (id.clone(), servant));
                }
            }
            run_sweep = self.on_finished_trigger() && self.policy.reclaim_count(cache.len()) > 0;
        }
        self.cond.notify_all();
        if let Some((id, servant)) = evict_notice {
            self.activator.evict(&id, &servant);
        }
        if run_sweep {
            self.sweep();
        }
    }

    /// One eviction pass: collect tail candidates under the lock, flush
    /// and notify with the lock released, remove under the lock after
    /// re-checking that nothing re-pinned or re-dirtied the entry.
    pub(crate) fn sweep(&self) -> usize {
        let work: Vec<SweepItem<A::Servant>> = {
            let mut cache = self.cache.lock();
            let overflow = self.policy.reclaim_count(cache.len());
            if overflow == 0 {
                return 0;
            }
            let candidates = cache.eviction_candidates(overflow);
            candidates
                .into_iter()
                .filter_map(|id| {
                    cache.lookup_mut(&id).map(|entry| {
                        entry.state = EntryState::Evicting;
                        SweepItem {
                            record: entry.record.clone(),
                            dirty: entry.dirty,
                            mod_seq: entry.mod_seq,
                            servant: entry.servant.clone(),
                            id,
                        }
                    })
                })
                .collect()
        };

        let mut evicted = 0;
        for item in work {
            if item.dirty {
                if let Err(err) = self.strategy.flush(&item.id, &item.record) {
                    // The entry stays cached and dirty; losing it here
                    // would be silent data loss.
                    let err = Error::EvictionSaveFailed {
                        identity: item.id.clone(),
                        reason: err.to_string(),
                    };
                    error!("{err}");
                    let mut cache = self.cache.lock();
                    if let Some(entry) = cache.lookup_mut(&item.id) {
                        if entry.state == EntryState::Evicting {
                            entry.state = EntryState::Idle;
                        }
                    }
                    drop(cache);
                    self.cond.notify_all();
                    continue;
                }
            }
            if let Some(servant) = &item.servant {
                self.activator.evict(&item.id, servant);
            }
            {
                let mut cache = self.cache.lock();
                let removable = cache.lookup(&item.id).is_some_and(|entry| {
                    entry.state == EntryState::Evicting
                        && entry.use_count == 0
                        && entry.mod_seq == item.mod_seq
                });
                debug_assert!(removable, "evicting entry changed under sweep");
                if removable {
                    cache.remove(&item.id);
                    evicted += 1;
                    self.counters.evictions.fetch_add(1, Ordering::Relaxed);
                } else if let Some(entry) = cache.lookup_mut(&item.id) {
                    // Fail closed: keep the entry rather than risk loss.
                    if entry.state == EntryState::Evicting {
                        entry.state = EntryState::Idle;
                    }
                }
            }
            self.cond.notify_all();
        }
        if evicted > 0 {
            debug!("sweep reclaimed {evicted} entries");
        }
        evicted
    }

    /// Flush every dirty entry (pinned or not) to the store. Clears the
    /// dirty flag only if the record was not re-mutated mid-flush.
    pub(crate) fn flush_dirty(&self) -> usize {
        let snapshot = self.cache.lock().dirty_snapshot();
        let mut flushed = 0;
        for (id, record, mod_seq) in snapshot {
            match self.strategy.flush(&id, &record) {
                Ok(()) => {
                    let mut cache = self.cache.lock();
                    if let Some(entry) = cache.lookup_mut(&id) {
                        if entry.mod_seq == mod_seq {
                            entry.dirty = false;
                        }
                    }
                    flushed += 1;
                }
                Err(err) => {
                    warn!("background flush of {id} failed: {err}");
                }
            }
        }
        flushed
    }
}

/// A pinned servant, valid between `locate` and release.
///
/// Dropping the lease is the `finished` call: the entry's use count is
/// decremented on every exit path, including panics in the caller.
pub struct Lease<'e, A: Activator> {
    shared: &'e Shared<A>,
    identity: Identity,
    servant: Arc<A::Servant>,
}

impl<A: Activator> std::fmt::Debug for Lease<'_, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

impl<A: Activator> Lease<'_, A> {
    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    #[must_use]
    pub fn servant(&self) -> &Arc<A::Servant> {
        &self.servant
    }
}

impl<A: Activator> Deref for Lease<'_, A> {
    type Target = A::Servant;

    fn deref(&self) -> &Self::Target {
        &self.servant
    }
}

impl<A: Activator> Drop for Lease<'_, A> {
    fn drop(&mut self) {
        self.shared.finished(&self.identity);
    }
}

/// Capacity-bounded, persistence-backed servant cache.
///
/// Turns stored records into live servants on demand and evicts the
/// least-recently-used ones back to storage under load. At most one
/// servant exists per identity; pinned entries are never evicted; dirty
/// entries are flushed before reclamation.
pub struct Evictor<A: Activator> {
    shared: Arc<Shared<A>>,
    sweeper: Mutex<Option<BackgroundSweeper>>,
    drain_timeout: Duration,
}

impl<A: Activator> Evictor<A> {
    /// Create an evictor from the configuration surface, choosing the
    /// persistence strategy from `settings.mode`.
    pub fn new<S>(settings: &EvictorSettings, store: Arc<S>, activator: A) -> Self
    where
        S: TransactionalStore + 'static,
    {
        let strategy: Arc<dyn PersistenceStrategy> = match settings.mode {
            PersistenceMode::Immediate => Arc::new(ImmediateStrategy::new(store)),
            PersistenceMode::Transactional => Arc::new(TransactionalStrategy::new(store)),
            PersistenceMode::Background => Arc::new(BackgroundStrategy::new(store)),
        };
        Self::with_strategy(EvictorConfig::from(settings), strategy, activator)
    }

    /// Create an evictor with an explicit persistence strategy.
    pub fn with_strategy(
        config: EvictorConfig,
        strategy: Arc<dyn PersistenceStrategy>,
        activator: A,
    ) -> Self {
        let shared = Arc::new(Shared {
            cache: Mutex::new(EvictorCache::default()),
            cond: Condvar::new(),
            policy: EvictionPolicy::new(config.capacity),
            trigger: config.sweep_trigger,
            strategy,
            activator,
            counters: CacheStats::default(),
            deactivated: AtomicBool::new(false),
        });
        let flush = shared.strategy.defers_writes();
        let periodic = matches!(
            config.sweep_trigger,
            SweepTriggerSetting::Periodic | SweepTriggerSetting::Both
        );
        let sweeper = (flush || periodic).then(|| {
            BackgroundSweeper::start(Arc::clone(&shared), config.flush_interval, flush, periodic)
        });
        Self {
            shared,
            sweeper: Mutex::new(sweeper),
            drain_timeout: config.drain_timeout,
        }
    }

    /// Locate the servant for `id`, pinning its entry until the returned
    /// lease is dropped.
    ///
    /// On a miss the record is loaded and the servant instantiated with
    /// the cache mutex released; concurrent locates for the same identity
    /// block behind the in-flight load rather than loading twice. An
    /// absent record is `NotFound`; a failing store is `StoreUnavailable`.
    pub fn locate(&self, id: &Identity) -> Result<Lease<'_, A>> {
        let shared = &*self.shared;
        if shared.deactivated.load(Ordering::Relaxed) {
            return Err(Error::Deactivated);
        }

        let mut cache = shared.cache.lock();
        loop {
            let status = cache.lookup(id).map(|e| (e.state, e.destroyed));
            match status {
                None => break,
                Some((EntryState::Loading | EntryState::Evicting, _)) => {
                    // Another thread owns the load or eviction; wait for
                    // the outcome and re-check.
                    shared.cond.wait(&mut cache);
                    if shared.deactivated.load(Ordering::Relaxed) {
                        return Err(Error::Deactivated);
                    }
                }
                Some((_, true)) => return Err(Error::NotFound(id.clone())),
                Some((EntryState::Evicted, false)) => {
                    debug_assert!(false, "evicted entry reachable from the map");
                    return Err(Error::NotFound(id.clone()));
                }
                Some((EntryState::Active | EntryState::Idle, false)) => {
                    let Some(entry) = cache.lookup_mut(id) else {
                        continue;
                    };
                    entry.use_count += 1;
                    entry.state = EntryState::Active;
                    let servant = entry.servant.clone();
                    cache.touch(id);
                    drop(cache);

                    let Some(servant) = servant else {
                        debug_assert!(false, "resident entry without servant");
                        shared.finished(id);
                        return Err(Error::NotFound(id.clone()));
                    };
                    shared.counters.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(Lease {
                        shared,
                        identity: id.clone(),
                        servant,
                    });
                }
            }
        }

        // Miss: pin a Loading placeholder, then load and instantiate with
        // the lock released.
        cache.insert_front(id.clone(), Entry::loading())?;
        drop(cache);

        let loaded = shared.strategy.load(id).and_then(|maybe| match maybe {
            None => Ok(None),
            Some(record) => shared
                .activator
                .instantiate(id, &record)
                .map(|servant| Some((record, servant))),
        });

        let mut cache = shared.cache.lock();
        match loaded {
            Ok(Some((record, servant))) => {
                let servant = Arc::new(servant);
                if let Some(entry) = cache.lookup_mut(id) {
                    entry.servant = Some(servant.clone());
                    entry.record = record;
                    entry.state = EntryState::Active;
                } else {
                    debug_assert!(false, "loading placeholder vanished");
                    drop(cache);
                    shared.cond.notify_all();
                    return Err(Error::Deactivated);
                }
                drop(cache);
                shared.cond.notify_all();
                shared.counters.misses.fetch_add(1, Ordering::Relaxed);
                Ok(Lease {
                    shared,
                    identity: id.clone(),
                    servant,
                })
            }
            Ok(None) => {
                cache.remove(id);
                drop(cache);
                shared.cond.notify_all();
                shared.counters.misses.fetch_add(1, Ordering::Relaxed);
                Err(Error::NotFound(id.clone()))
            }
            Err(err) => {
                cache.remove(id);
                drop(cache);
                shared.cond.notify_all();
                Err(err)
            }
        }
    }

    /// Persist a mutation of the leased servant's state through the
    /// configured strategy, then update the cached record.
    pub fn save(&self, lease: &Lease<'_, A>, record: Record) -> Result<()> {
        let outcome = self.shared.strategy.save(lease.identity(), &record)?;
        let mut cache = self.shared.cache.lock();
        if let Some(entry) = cache.lookup_mut(lease.identity()) {
            entry.record = record;
            entry.mod_seq += 1;
            entry.dirty = matches!(outcome, SaveOutcome::Deferred);
        }
        Ok(())
    }

    /// Destroy the leased object: remove its durable record and unlink
    /// the cache entry once the last pin drops.
    pub fn destroy(&self, lease: Lease<'_, A>) -> Result<()> {
        let id = lease.identity().clone();
        self.shared.strategy.remove(&id)?;
        {
            let mut cache = self.shared.cache.lock();
            if let Some(entry) = cache.lookup_mut(&id) {
                entry.destroyed = true;
                // The durable record is gone; nothing left to flush.
                entry.dirty = false;
            }
        }
        drop(lease);
        Ok(())
    }

    /// Open a multi-operation transaction. Fails unless the configured
    /// persistence strategy is transactional.
    pub fn transaction(&self) -> Result<Transaction<'_, A>> {
        let store = self.shared.strategy.transactional().ok_or_else(|| {
            Error::configuration("persistence mode does not support transactions")
        })?;
        let handle = store.begin()?;
        Ok(Transaction::new(self, store, handle))
    }

    pub(crate) fn apply_committed(&self, staged: &HashMap<Identity, Record>) {
        let mut cache = self.shared.cache.lock();
        for (id, record) in staged {
            if let Some(entry) = cache.lookup_mut(id) {
                entry.record = record.clone();
                entry.mod_seq += 1;
                entry.dirty = false;
            }
        }
    }

    /// Run one eviction sweep now; returns the number of entries
    /// reclaimed.
    pub fn sweep(&self) -> usize {
        self.shared.sweep()
    }

    /// Flush every dirty entry now; returns the number flushed.
    pub fn flush_dirty(&self) -> usize {
        self.shared.flush_dirty()
    }

    /// Drain the cache and refuse further locates.
    ///
    /// Sets the effective capacity to zero, stops the sweeper, then
    /// repeatedly flushes and sweeps, waiting for in-flight requests to
    /// finish, until the cache is empty or `drain_timeout` elapses. On
    /// timeout the remaining entries are logged and left in place.
    pub fn deactivate(&self) -> Result<()> {
        if self.shared.deactivated.swap(true, Ordering::Relaxed) {
            return Ok(());
        }
        info!("deactivating evictor");
        self.shared.policy.set_capacity(0);
        self.shared.cond.notify_all();
        if let Some(sweeper) = self.sweeper.lock().take() {
            sweeper.shutdown();
        }

        let deadline = Instant::now() + self.drain_timeout;
        loop {
            self.shared.flush_dirty();
            self.shared.sweep();

            let mut cache = self.shared.cache.lock();
            if cache.is_empty() {
                info!("evictor drained");
                return Ok(());
            }
            if Instant::now() >= deadline {
                let pinned = cache.pinned_count();
                error!(
                    "deactivation timed out with {} entries remaining ({pinned} pinned)",
                    cache.len()
                );
                return Err(Error::DrainTimeout { pinned });
            }
            let _ = self.shared.cond.wait_until(&mut cache, deadline);
        }
    }

    /// Counter snapshot for the telemetry collaborator.
    pub fn stats(&self) -> EvictorStats {
        let cache = self.shared.cache.lock();
        EvictorStats {
            hits: self.shared.counters.hits.load(Ordering::Relaxed),
            misses: self.shared.counters.misses.load(Ordering::Relaxed),
            evictions: self.shared.counters.evictions.load(Ordering::Relaxed),
            size: cache.len(),
            dirty: cache.dirty_count(),
        }
    }

    /// Configured (effective) capacity in entries.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.shared.policy.capacity()
    }
}

impl<A: Activator> Drop for Evictor<A> {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.lock().take() {
            sweeper.shutdown();
        }
    }
}
