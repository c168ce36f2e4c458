//! Transactional persistence.

use super::{PersistenceStrategy, SaveOutcome};
use orbit_common::{Identity, Record, Result};
use orbit_store::TransactionalStore;
use std::sync::Arc;

/// Saves run in store transactions. A standalone save gets its own
/// single-operation transaction; multi-operation demarcation is driven by
/// the evictor's `Transaction` type, which pins every touched entry for
/// the transaction's duration so eviction cannot race a commit or
/// rollback. Conflicts surface as retryable `TransactionConflict` errors.
pub struct TransactionalStrategy {
    store: Arc<dyn TransactionalStore>,
}

impl TransactionalStrategy {
    #[must_use]
    pub fn new(store: Arc<dyn TransactionalStore>) -> Self {
        Self { store }
    }
}

impl PersistenceStrategy for TransactionalStrategy {
    fn load(&self, id: &Identity) -> Result<Option<Record>> {
        self.store.load(id)
    }

    fn save(&self, id: &Identity, record: &Record) -> Result<SaveOutcome> {
        let txn = self.store.begin()?;
        self.store.put_in(txn, id, record)?;
        self.store.commit(txn)?;
        Ok(SaveOutcome::Durable)
    }

    fn flush(&self, id: &Identity, record: &Record) -> Result<()> {
        // Entries only stay dirty here if a commit raced a shutdown;
        // a direct put restores durability.
        self.store.put(id, record)
    }

    fn remove(&self, id: &Identity) -> Result<()> {
        self.store.remove(id)
    }

    fn transactional(&self) -> Option<&dyn TransactionalStore> {
        Some(&*self.store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orbit_store::MemoryStore;

    fn id(name: &str) -> Identity {
        Identity::new_unchecked("txn", name)
    }

    #[test]
    fn test_standalone_save_commits() {
        let store = Arc::new(MemoryStore::new());
        let strategy = TransactionalStrategy::new(store.clone());

        let outcome = strategy.save(&id("a"), &Record::from_slice(b"v")).unwrap();
        assert_eq!(outcome, SaveOutcome::Durable);
        assert!(store.contains(&id("a")));
    }

    #[test]
    fn test_exposes_transaction_support() {
        let store = Arc::new(MemoryStore::new());
        let strategy = TransactionalStrategy::new(store);
        assert!(strategy.transactional().is_some());
    }
}
