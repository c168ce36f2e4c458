//! Storage-facing traits for the evictor subsystem.
//!
//! The evictor talks to durable storage exclusively through these traits.
//! `load` distinguishes "no such record" (`Ok(None)`) from a failing store
//! (`Err(StoreUnavailable)`) so the caller can tell a routing miss from a
//! fault.

use orbit_common::{Identity, Record, Result};

/// Handle identifying an open store transaction.
///
/// Handles are plain tokens: cheap to copy, meaningless once the
/// transaction has been committed or rolled back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxnHandle(pub(crate) u64);

/// A durable store of records keyed by identity.
pub trait PersistentStore: Send + Sync {
    /// Load the record for `id`, or `None` if the store has no such record.
    fn load(&self, id: &Identity) -> Result<Option<Record>>;

    /// Durably write the record for `id`, replacing any previous one.
    fn put(&self, id: &Identity, record: &Record) -> Result<()>;

    /// Remove the record for `id`. Removing an absent record is not an
    /// error.
    fn remove(&self, id: &Identity) -> Result<()>;
}

/// A store supporting multi-operation transactions.
///
/// Writes staged with `put_in` become durable atomically at `commit`.
/// Conflicting concurrent transactions on the same identity are serialized
/// by the store: the first committer wins and the loser's commit fails
/// with `TransactionConflict`. `commit` and `rollback` are idempotent-safe:
/// calling either on an already-terminated handle is a no-op.
pub trait TransactionalStore: PersistentStore {
    /// Open a new transaction.
    fn begin(&self) -> Result<TxnHandle>;

    /// Read through the transaction: staged writes are visible, otherwise
    /// falls back to the durable state.
    fn load_in(&self, txn: TxnHandle, id: &Identity) -> Result<Option<Record>>;

    /// Stage a write; nothing becomes durable until `commit`.
    fn put_in(&self, txn: TxnHandle, id: &Identity, record: &Record) -> Result<()>;

    /// Atomically apply all staged writes.
    fn commit(&self, txn: TxnHandle) -> Result<()>;

    /// Discard all staged writes.
    fn rollback(&self, txn: TxnHandle) -> Result<()>;
}
