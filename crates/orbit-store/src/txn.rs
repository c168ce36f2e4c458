//! Client-side transaction staging shared by the store backends.
//!
//! Writes are staged in memory against the version of the identity
//! observed at staging time; commit validates every staged version and
//! applies the batch only if none moved. First committer wins, the loser
//! gets `TransactionConflict`.

use crate::traits::TxnHandle;
use orbit_common::{Error, Identity, Record, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Writes staged by one open transaction.
#[derive(Debug, Default)]
struct PendingTxn {
    /// Staged record per identity, with the version observed at first
    /// staging.
    writes: HashMap<Identity, (u64, Record)>,
}

/// Transaction bookkeeping: open transactions plus per-identity commit
/// versions for optimistic conflict detection.
#[derive(Debug, Default)]
pub(crate) struct TxnTable {
    next: AtomicU64,
    open: Mutex<HashMap<TxnHandle, PendingTxn>>,
    versions: Mutex<HashMap<Identity, u64>>,
}

impl TxnTable {
    pub fn begin(&self) -> TxnHandle {
        let handle = TxnHandle(self.next.fetch_add(1, Ordering::Relaxed) + 1);
        self.open.lock().insert(handle, PendingTxn::default());
        handle
    }

    fn version_of(&self, id: &Identity) -> u64 {
        self.versions.lock().get(id).copied().unwrap_or(0)
    }

    /// Look up a staged write (read-your-writes).
    pub fn staged(&self, txn: TxnHandle, id: &Identity) -> Result<Option<Record>> {
        let open = self.open.lock();
        let pending = open.get(&txn).ok_or(Error::TransactionTerminated)?;
        Ok(pending.writes.get(id).map(|(_, record)| record.clone()))
    }

    /// Stage a write. Re-staging the same identity keeps the originally
    /// observed version.
    pub fn stage_put(&self, txn: TxnHandle, id: &Identity, record: &Record) -> Result<()> {
        let version = self.version_of(id);
        let mut open = self.open.lock();
        let pending = open.get_mut(&txn).ok_or(Error::TransactionTerminated)?;
        pending
            .writes
            .entry(id.clone())
            .and_modify(|(_, staged)| *staged = record.clone())
            .or_insert((version, record.clone()));
        Ok(())
    }

    /// Validate and consume the transaction. Returns `None` for an
    /// already-terminated handle, the write batch on success, or
    /// `TransactionConflict` (with the transaction discarded) if any
    /// staged identity was committed concurrently.
    pub fn take_for_commit(&self, txn: TxnHandle) -> Result<Option<Vec<(Identity, Record)>>> {
        let Some(pending) = self.open.lock().remove(&txn) else {
            return Ok(None);
        };
        let mut versions = self.versions.lock();
        for (id, (seen, _)) in &pending.writes {
            if versions.get(id).copied().unwrap_or(0) != *seen {
                return Err(Error::TransactionConflict(id.clone()));
            }
        }
        let mut writes = Vec::with_capacity(pending.writes.len());
        for (id, (_, record)) in pending.writes {
            *versions.entry(id.clone()).or_insert(0) += 1;
            writes.push((id, record));
        }
        Ok(Some(writes))
    }

    /// Drop the transaction if still open.
    pub fn discard(&self, txn: TxnHandle) {
        self.open.lock().remove(&txn);
    }

    /// Record a direct (non-transactional) write so open transactions that
    /// staged against the old version fail their commit.
    pub fn bump(&self, id: &Identity) {
        *self.versions.lock().entry(id.clone()).or_insert(0) += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(name: &str) -> Identity {
        Identity::new_unchecked("txn", name)
    }

    #[test]
    fn test_commit_returns_staged_writes() {
        let table = TxnTable::default();
        let txn = table.begin();
        table.stage_put(txn, &id("a"), &Record::from_slice(b"1")).unwrap();
        table.stage_put(txn, &id("b"), &Record::from_slice(b"2")).unwrap();

        let writes = table.take_for_commit(txn).unwrap().unwrap();
        assert_eq!(writes.len(), 2);
    }

    #[test]
    fn test_commit_idempotent_on_terminated_handle() {
        let table = TxnTable::default();
        let txn = table.begin();
        table.discard(txn);
        assert!(table.take_for_commit(txn).unwrap().is_none());
    }

    #[test]
    fn test_first_committer_wins() {
        let table = TxnTable::default();
        let a = table.begin();
        let b = table.begin();
        table.stage_put(a, &id("x"), &Record::from_slice(b"a")).unwrap();
        table.stage_put(b, &id("x"), &Record::from_slice(b"b")).unwrap();

        assert!(table.take_for_commit(a).unwrap().is_some());
        let err = table.take_for_commit(b).unwrap_err();
        assert!(matches!(err, Error::TransactionConflict(_)));
    }

    #[test]
    fn test_direct_write_conflicts_open_txn() {
        let table = TxnTable::default();
        let txn = table.begin();
        table.stage_put(txn, &id("x"), &Record::from_slice(b"staged")).unwrap();
        table.bump(&id("x"));
        assert!(table.take_for_commit(txn).is_err());
    }

    #[test]
    fn test_stage_after_termination_is_an_error() {
        let table = TxnTable::default();
        let txn = table.begin();
        table.discard(txn);
        let err = table
            .stage_put(txn, &id("x"), &Record::from_slice(b"late"))
            .unwrap_err();
        assert!(matches!(err, Error::TransactionTerminated));
    }
}
