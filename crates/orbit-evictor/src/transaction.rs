//! Multi-operation transaction demarcation.
//!
//! A `Transaction` wraps one or more load+mutate+save operations against
//! the transactional persistence strategy. Every identity it touches is
//! pinned (a lease is held) for the transaction's duration, so eviction
//! cannot race a commit or rollback. Commit and rollback each happen at
//! most once; dropping an unterminated transaction rolls it back.

use crate::evictor::{Activator, Evictor, Lease};
use orbit_common::{Identity, Record, Result};
use orbit_store::{TransactionalStore, TxnHandle};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// One unit of work against the store, with implicit pinning of every
/// touched entry.
pub struct Transaction<'e, A: Activator> {
    evictor: &'e Evictor<A>,
    store: &'e dyn TransactionalStore,
    handle: TxnHandle,
    pins: HashMap<Identity, Lease<'e, A>>,
    staged: HashMap<Identity, Record>,
    done: bool,
}

impl<'e, A: Activator> Transaction<'e, A> {
    pub(crate) fn new(
        evictor: &'e Evictor<A>,
        store: &'e dyn TransactionalStore,
        handle: TxnHandle,
    ) -> Self {
        Self {
            evictor,
            store,
            handle,
            pins: HashMap::new(),
            staged: HashMap::new(),
            done: false,
        }
    }

    fn pin(&mut self, id: &Identity) -> Result<()> {
        if !self.pins.contains_key(id) {
            let lease = self.evictor.locate(id)?;
            self.pins.insert(id.clone(), lease);
        }
        Ok(())
    }

    /// The servant for `id`, pinned until the transaction terminates.
    pub fn servant(&mut self, id: &Identity) -> Result<Arc<A::Servant>> {
        self.pin(id)?;
        Ok(self.pins[id].servant().clone())
    }

    /// Read through the transaction (staged writes are visible).
    pub fn load(&mut self, id: &Identity) -> Result<Option<Record>> {
        self.pin(id)?;
        self.store.load_in(self.handle, id)
    }

    /// Stage a save; durable only at commit.
    pub fn save(&mut self, id: &Identity, record: Record) -> Result<()> {
        self.pin(id)?;
        self.store.put_in(self.handle, id, &record)?;
        self.staged.insert(id.clone(), record);
        Ok(())
    }

    /// Atomically apply every staged save. On `TransactionConflict` the
    /// staged writes are discarded and cached entries are left exactly as
    /// they were; the error is retryable.
    pub fn commit(mut self) -> Result<()> {
        self.done = true;
        self.store.commit(self.handle)?;
        self.evictor.apply_committed(&self.staged);
        Ok(())
    }

    /// Discard every staged save; the durable records are untouched.
    pub fn rollback(mut self) -> Result<()> {
        self.done = true;
        self.store.rollback(self.handle)
    }
}

impl<A: Activator> Drop for Transaction<'_, A> {
    fn drop(&mut self) {
        if !self.done {
            debug!("rolling back dropped transaction");
            let _ = self.store.rollback(self.handle);
        }
    }
}
