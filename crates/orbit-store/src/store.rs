//! Durable record store backed by redb.
//!
//! Direct writes are synchronous (write txn + commit per operation).
//! Multi-operation transactions are staged client-side and applied in a
//! single redb write transaction at commit; per-identity versions detect
//! write-write conflicts optimistically.

use crate::tables;
use crate::traits::{PersistentStore, TransactionalStore, TxnHandle};
use crate::txn::TxnTable;
use orbit_common::{Error, Identity, Record, Result};
use redb::{Database, ReadableTable};
use std::fmt;
use std::path::Path;
use tracing::debug;

fn store_err(e: impl fmt::Display) -> Error {
    Error::store_unavailable(e.to_string())
}

/// Durable record store backed by redb.
pub struct RedbStore {
    db: Database,
    txns: TxnTable,
}

impl RedbStore {
    /// Open (or create) the redb database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path).map_err(store_err)?;

        // Create the table eagerly so later read txns don't fail
        let write_txn = db.begin_write().map_err(store_err)?;
        {
            let _t = write_txn.open_table(tables::RECORDS).map_err(store_err)?;
        }
        write_txn.commit().map_err(store_err)?;

        debug!("opened record store at {:?}", path);
        Ok(Self {
            db,
            txns: TxnTable::default(),
        })
    }

    fn key_of(id: &Identity) -> (&str, &str) {
        (id.category(), id.name())
    }

    fn write_batch(&self, writes: &[(Identity, Record)]) -> Result<()> {
        let write_txn = self.db.begin_write().map_err(store_err)?;
        {
            let mut table = write_txn.open_table(tables::RECORDS).map_err(store_err)?;
            for (id, record) in writes {
                table
                    .insert(Self::key_of(id), record.as_slice())
                    .map_err(store_err)?;
            }
        }
        write_txn.commit().map_err(store_err)?;
        Ok(())
    }

}

impl PersistentStore for RedbStore {
    fn load(&self, id: &Identity) -> Result<Option<Record>> {
        let read_txn = self.db.begin_read().map_err(store_err)?;
        let table = read_txn.open_table(tables::RECORDS).map_err(store_err)?;
        let value = table.get(Self::key_of(id)).map_err(store_err)?;
        Ok(value.map(|v| Record::from_slice(v.value())))
    }

    fn put(&self, id: &Identity, record: &Record) -> Result<()> {
        let write_txn = self.db.begin_write().map_err(store_err)?;
        {
            let mut table = write_txn.open_table(tables::RECORDS).map_err(store_err)?;
            table
                .insert(Self::key_of(id), record.as_slice())
                .map_err(store_err)?;
        }
        write_txn.commit().map_err(store_err)?;
        self.txns.bump(id);
        Ok(())
    }

    fn remove(&self, id: &Identity) -> Result<()> {
        let write_txn = self.db.begin_write().map_err(store_err)?;
        {
            let mut table = write_txn.open_table(tables::RECORDS).map_err(store_err)?;
            table.remove(Self::key_of(id)).map_err(store_err)?;
        }
        write_txn.commit().map_err(store_err)?;
        self.txns.bump(id);
        Ok(())
    }
}

impl TransactionalStore for RedbStore {
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
            Some(writes) => self.write_batch(&writes),
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

    fn open_store() -> (tempfile::TempDir, RedbStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = RedbStore::open(dir.path().join("records.redb")).unwrap();
        (dir, store)
    }

    fn id(name: &str) -> Identity {
        Identity::new_unchecked("account", name)
    }

    #[test]
    fn test_put_load_round_trip() {
        let (_dir, store) = open_store();
        let record = Record::from_slice(b"balance=10");

        store.put(&id("alice"), &record).unwrap();
        let loaded = store.load(&id("alice")).unwrap();
        assert_eq!(loaded, Some(record));
    }

    #[test]
    fn test_load_absent_is_none() {
        let (_dir, store) = open_store();
        assert_eq!(store.load(&id("ghost")).unwrap(), None);
    }

    #[test]
    fn test_remove() {
        let (_dir, store) = open_store();
        store.put(&id("alice"), &Record::from_slice(b"x")).unwrap();
        store.remove(&id("alice")).unwrap();
        assert_eq!(store.load(&id("alice")).unwrap(), None);

        // Removing an absent record is not an error
        store.remove(&id("alice")).unwrap();
    }

    #[test]
    fn test_identities_with_same_name_different_category() {
        let (_dir, store) = open_store();
        let a = Identity::new_unchecked("account", "x");
        let b = Identity::new_unchecked("ledger", "x");

        store.put(&a, &Record::from_slice(b"a")).unwrap();
        store.put(&b, &Record::from_slice(b"b")).unwrap();

        assert_eq!(store.load(&a).unwrap(), Some(Record::from_slice(b"a")));
        assert_eq!(store.load(&b).unwrap(), Some(Record::from_slice(b"b")));
    }

    #[test]
    fn test_transaction_commit_applies_atomically() {
        let (_dir, store) = open_store();
        let txn = store.begin().unwrap();
        store.put_in(txn, &id("a"), &Record::from_slice(b"1")).unwrap();
        store.put_in(txn, &id("b"), &Record::from_slice(b"2")).unwrap();

        // Nothing durable before commit
        assert_eq!(store.load(&id("a")).unwrap(), None);

        store.commit(txn).unwrap();
        assert_eq!(store.load(&id("a")).unwrap(), Some(Record::from_slice(b"1")));
        assert_eq!(store.load(&id("b")).unwrap(), Some(Record::from_slice(b"2")));
    }

    #[test]
    fn test_transaction_read_your_writes() {
        let (_dir, store) = open_store();
        store.put(&id("a"), &Record::from_slice(b"old")).unwrap();

        let txn = store.begin().unwrap();
        store.put_in(txn, &id("a"), &Record::from_slice(b"new")).unwrap();

        assert_eq!(
            store.load_in(txn, &id("a")).unwrap(),
            Some(Record::from_slice(b"new"))
        );
        // Durable state unchanged until commit
        assert_eq!(store.load(&id("a")).unwrap(), Some(Record::from_slice(b"old")));
        store.rollback(txn).unwrap();
    }

    #[test]
    fn test_transaction_rollback_discards() {
        let (_dir, store) = open_store();
        let txn = store.begin().unwrap();
        store.put_in(txn, &id("a"), &Record::from_slice(b"1")).unwrap();
        store.rollback(txn).unwrap();

        assert_eq!(store.load(&id("a")).unwrap(), None);
        // Idempotent-safe on the terminated handle
        store.rollback(txn).unwrap();
        store.commit(txn).unwrap();
    }

    #[test]
    fn test_transaction_conflict_is_retryable() {
        let (_dir, store) = open_store();
        let first = store.begin().unwrap();
        let second = store.begin().unwrap();
        store.put_in(first, &id("x"), &Record::from_slice(b"1")).unwrap();
        store.put_in(second, &id("x"), &Record::from_slice(b"2")).unwrap();

        store.commit(first).unwrap();
        let err = store.commit(second).unwrap_err();
        assert!(err.is_retryable());

        // First committer's write survives
        assert_eq!(store.load(&id("x")).unwrap(), Some(Record::from_slice(b"1")));
    }
}
