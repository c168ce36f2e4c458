//! Error types for Orbit
//!
//! This module defines the common error taxonomy used throughout the
//! evictor subsystem.

use crate::types::{Identity, IdentityError};
use thiserror::Error;

/// Common result type for Orbit operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for Orbit
#[derive(Debug, Error)]
pub enum Error {
    // Routing outcomes
    /// Identity absent from both cache and store. An ordinary miss, not a
    /// fault.
    #[error("object not found: {0}")]
    NotFound(Identity),

    // Storage errors
    /// Transient storage failure during load/save. Retryable; never
    /// silently treated as a miss.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// Concurrent writers collided on the same identity. The transaction
    /// was rolled back; the caller decides whether to re-attempt.
    #[error("transaction conflict on {0}")]
    TransactionConflict(Identity),

    /// A dirty entry could not be flushed before reclamation. The entry
    /// stays in the cache; data is never dropped silently.
    #[error("failed to save {identity} before eviction: {reason}")]
    EvictionSaveFailed { identity: Identity, reason: String },

    /// Transaction handle already committed or rolled back.
    #[error("transaction already terminated")]
    TransactionTerminated,

    // Lifecycle errors
    /// locate() called after deactivation began.
    #[error("evictor deactivated")]
    Deactivated,

    /// Deactivation drain gave up with entries still pinned.
    #[error("deactivation timed out with {pinned} entries still pinned")]
    DrainTimeout { pinned: usize },

    // Invariant violations (programming errors, not user errors)
    /// Duplicate insert for an identity that is already cached.
    #[error("entry already present: {0}")]
    AlreadyPresent(Identity),

    /// finished() observed a use count of zero.
    #[error("use count underflow on {0}")]
    UseCountUnderflow(Identity),

    // Plumbing
    #[error("invalid identity: {0}")]
    InvalidIdentity(#[from] IdentityError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Create a store-unavailable error
    pub fn store_unavailable(msg: impl Into<String>) -> Self {
        Self::StoreUnavailable(msg.into())
    }

    /// Create a serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Check if this is a retryable error
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable(_) | Self::TransactionConflict(_)
        )
    }

    /// Check if this is a not found error
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if this is an internal invariant violation rather than a
    /// recoverable condition.
    #[must_use]
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, Self::AlreadyPresent(_) | Self::UseCountUnderflow(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(name: &str) -> Identity {
        Identity::new_unchecked("test", name)
    }

    #[test]
    fn test_error_retryable() {
        assert!(Error::StoreUnavailable("down".into()).is_retryable());
        assert!(Error::TransactionConflict(id("a")).is_retryable());
        assert!(!Error::NotFound(id("a")).is_retryable());
        assert!(!Error::Deactivated.is_retryable());
    }

    #[test]
    fn test_error_not_found() {
        assert!(Error::NotFound(id("a")).is_not_found());
        assert!(!Error::StoreUnavailable("down".into()).is_not_found());
    }

    #[test]
    fn test_error_invariant_violation() {
        assert!(Error::AlreadyPresent(id("a")).is_invariant_violation());
        assert!(Error::UseCountUnderflow(id("a")).is_invariant_violation());
        assert!(!Error::Deactivated.is_invariant_violation());
    }
}
