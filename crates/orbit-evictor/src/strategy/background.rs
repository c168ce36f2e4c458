//! Background-batched persistence.

use super::{PersistenceStrategy, SaveOutcome};
use orbit_common::{Identity, Record, Result};
use orbit_store::PersistentStore;
use std::sync::Arc;

/// Saves mark the entry dirty and return immediately; no store write
/// happens on the request path. The background sweeper flushes dirty
/// entries on its interval, and eviction flushes a dirty candidate before
/// removing it.
///
/// Durability trade-off, opt-in by selecting this mode: a crash between a
/// dirty mutation and the next flush loses that mutation. The other two
/// strategies have no such window.
pub struct BackgroundStrategy {
    store: Arc<dyn PersistentStore>,
}

impl BackgroundStrategy {
    #[must_use]
    pub fn new(store: Arc<dyn PersistentStore>) -> Self {
        Self { store }
    }
}

impl PersistenceStrategy for BackgroundStrategy {
    fn load(&self, id: &Identity) -> Result<Option<Record>> {
        self.store.load(id)
    }

    fn save(&self, _id: &Identity, _record: &Record) -> Result<SaveOutcome> {
        Ok(SaveOutcome::Deferred)
    }

    fn flush(&self, id: &Identity, record: &Record) -> Result<()> {
        self.store.put(id, record)
    }

    fn remove(&self, id: &Identity) -> Result<()> {
        self.store.remove(id)
    }

    fn defers_writes(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orbit_store::MemoryStore;

    fn id(name: &str) -> Identity {
        Identity::new_unchecked("bg", name)
    }

    #[test]
    fn test_save_defers() {
        let store = Arc::new(MemoryStore::new());
        let strategy = BackgroundStrategy::new(store.clone());

        let outcome = strategy.save(&id("a"), &Record::from_slice(b"v")).unwrap();
        assert_eq!(outcome, SaveOutcome::Deferred);
        // Nothing reached the store yet
        assert!(store.is_empty());
    }

    #[test]
    fn test_flush_writes_through() {
        let store = Arc::new(MemoryStore::new());
        let strategy = BackgroundStrategy::new(store.clone());

        strategy.flush(&id("a"), &Record::from_slice(b"v")).unwrap();
        assert!(store.contains(&id("a")));
    }
}
