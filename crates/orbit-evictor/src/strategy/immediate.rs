//! Write-through persistence.

use super::{PersistenceStrategy, SaveOutcome};
use orbit_common::{Identity, Record, Result};
use orbit_store::PersistentStore;
use std::sync::Arc;

/// Every save writes through to the store synchronously before returning
/// control to the caller. No data loss window; every mutation pays one
/// storage round trip.
pub struct ImmediateStrategy {
    store: Arc<dyn PersistentStore>,
}

impl ImmediateStrategy {
    #[must_use]
    pub fn new(store: Arc<dyn PersistentStore>) -> Self {
        Self { store }
    }
}

impl PersistenceStrategy for ImmediateStrategy {
    fn load(&self, id: &Identity) -> Result<Option<Record>> {
        self.store.load(id)
    }

    fn save(&self, id: &Identity, record: &Record) -> Result<SaveOutcome> {
        self.store.put(id, record)?;
        Ok(SaveOutcome::Durable)
    }

    fn flush(&self, _id: &Identity, _record: &Record) -> Result<()> {
        // The store is always current under write-through; eviction never
        // needs a flush.
        Ok(())
    }

    fn remove(&self, id: &Identity) -> Result<()> {
        self.store.remove(id)
    }
}
