//! In-memory record store.
//!
//! Backend of choice for tests and for deployments that only need the
//! eviction machinery without durability. Supports injected failures so
//! callers can exercise `StoreUnavailable` paths.

use crate::traits::{PersistentStore, TransactionalStore, TxnHandle};
use crate::txn::TxnTable;
use orbit_common::{Error, Identity, Record, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// In-memory record store with failure injection.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<Identity, Record>>,
    txns: TxnTable,
    fail_puts: AtomicUsize,
    fail_loads: AtomicUsize,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` puts (direct or commit-applied) fail with
    /// `StoreUnavailable`.
    pub fn fail_next_puts(&self, n: usize) {
        self.fail_puts.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` loads fail with `StoreUnavailable`.
    pub fn fail_next_loads(&self, n: usize) {
        self.fail_loads.store(n, Ordering::SeqCst);
    }

    /// Number of records currently stored.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Check if the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Check if a record exists for `id`.
    pub fn contains(&self, id: &Identity) -> bool {
        self.records.lock().contains_key(id)
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl PersistentStore for MemoryStore {
    fn load(&self, id: &Identity) -> Result<Option<Record>> {
        if Self::take_failure(&self.fail_loads) {
            return Err(Error::store_unavailable("injected load failure"));
        }
        Ok(self.records.lock().get(id).cloned())
    }

    fn put(&self, id: &Identity, record: &Record) -> Result<()> {
        if Self::take_failure(&self.fail_puts) {
            return Err(Error::store_unavailable("injected put failure"));
        }
        self.records.lock().insert(id.clone(), record.clone());
        self.txns.bump(id);
        Ok(())
    }

    fn remove(&self, id: &Identity) -> Result<()> {
        self.records.lock().remove(id);
        self.txns.bump(id);
        Ok(())
    }
}

impl TransactionalStore for MemoryStore {
    fn begin(&self) -> Result<TxnHandle> {
        Ok(self.txns.begin())
    }

    fn load_in(&self, txn: TxnHandle, id: &Identity) -> Result<Option<Record>> {
        if let Some(record) = self.txns.staged(txn, id)? {
            return Ok(Some(record));
        }
        self.load(id)
    }

    fn put_in(&self, txn: TxnHandle, id: &Identity, record: &Record) -> Result<()> {
        self.txns.stage_put(txn, id, record)
    }

    fn commit(&self, txn: TxnHandle) -> Result<()> {
        match self.txns.take_for_commit(txn)? {
            // Already terminated: idempotent no-op
            None => Ok(()),
            Some(writes) => {
                if Self::take_failure(&self.fail_puts) {
                    return Err(Error::store_unavailable("injected put failure"));
                }
                let mut records = self.records.lock();
                for (id, record) in writes {
                    records.insert(id, record);
                }
                Ok(())
            }
        }
    }

    fn rollback(&self, txn: TxnHandle) -> Result<()> {
        self.txns.discard(txn);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(name: &str) -> Identity {
        Identity::new_unchecked("account", name)
    }

    #[test]
    fn test_put_load_round_trip() {
        let store = MemoryStore::new();
        let record = Record::from_slice(b"state");
        store.put(&id("a"), &record).unwrap();
        assert_eq!(store.load(&id("a")).unwrap(), Some(record));
    }

    #[test]
    fn test_injected_put_failure() {
        let store = MemoryStore::new();
        store.fail_next_puts(1);

        let err = store.put(&id("a"), &Record::from_slice(b"x")).unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable(_)));

        // Injected failure consumed; next put succeeds
        store.put(&id("a"), &Record::from_slice(b"x")).unwrap();
        assert!(store.contains(&id("a")));
    }

    #[test]
    fn test_injected_load_failure() {
        let store = MemoryStore::new();
        store.put(&id("a"), &Record::from_slice(b"x")).unwrap();
        store.fail_next_loads(1);

        assert!(store.load(&id("a")).is_err());
        assert!(store.load(&id("a")).is_ok());
    }

    #[test]
    fn test_transaction_commit() {
        let store = MemoryStore::new();
        let txn = store.begin().unwrap();
        store.put_in(txn, &id("a"), &Record::from_slice(b"1")).unwrap();
        assert!(store.is_empty());

        store.commit(txn).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_transaction_conflict() {
        let store = MemoryStore::new();
        let first = store.begin().unwrap();
        let second = store.begin().unwrap();
        store.put_in(first, &id("x"), &Record::from_slice(b"1")).unwrap();
        store.put_in(second, &id("x"), &Record::from_slice(b"2")).unwrap();

        store.commit(first).unwrap();
        assert!(matches!(
            store.commit(second).unwrap_err(),
            Error::TransactionConflict(_)
        ));
        assert_eq!(store.load(&id("x")).unwrap(), Some(Record::from_slice(b"1")));
    }
}
