//! Core type definitions for Orbit
//!
//! This module defines the fundamental types used throughout the evictor
//! subsystem: object identities and their durable records.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Stable identity of a durable object.
///
/// Equality, hashing, and ordering are defined over `(category, name)`.
/// An identity is both the cache key and the storage key and is never
/// mutated after creation.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identity {
    category: String,
    name: String,
}

impl Identity {
    /// Create a new identity (validates that the name is non-empty).
    pub fn new(
        category: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<Self, IdentityError> {
        let category = category.into();
        let name = name.into();
        if name.is_empty() {
            return Err(IdentityError::EmptyName);
        }
        Ok(Self { category, name })
    }

    /// Create without validation (internal use only)
    #[must_use]
    pub fn new_unchecked(category: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            name: name.into(),
        }
    }

    /// Get the category component
    #[must_use]
    pub fn category(&self) -> &str {
        &self.category
    }

    /// Get the name component
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.category.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}/{}", self.category, self.name)
        }
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({self})")
    }
}

/// Validation errors for [`Identity`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("identity name must be non-empty")]
    EmptyName,
}

/// The durable serialized form of an object's state.
///
/// Opaque to the cache; it round-trips through the persistent store byte
/// for byte. Cloning is cheap (reference-counted bytes).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record(Bytes);

impl Record {
    /// Create a record from a byte buffer
    #[must_use]
    pub fn new(bytes: Bytes) -> Self {
        Self(bytes)
    }

    /// Create a record by copying a slice
    #[must_use]
    pub fn from_slice(bytes: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(bytes))
    }

    /// Get the record contents
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Length in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the record is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for Record {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Bytes::from(bytes))
    }
}

impl From<Bytes> for Record {
    fn from(bytes: Bytes) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Record({} bytes)", self.0.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_display() {
        let id = Identity::new("account", "alice").unwrap();
        assert_eq!(id.to_string(), "account/alice");

        let bare = Identity::new("", "alice").unwrap();
        assert_eq!(bare.to_string(), "alice");
    }

    #[test]
    fn test_identity_rejects_empty_name() {
        assert_eq!(Identity::new("account", ""), Err(IdentityError::EmptyName));
    }

    #[test]
    fn test_identity_equality_over_both_components() {
        let a = Identity::new("account", "alice").unwrap();
        let b = Identity::new("account", "alice").unwrap();
        let c = Identity::new("ledger", "alice").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_record_round_trip() {
        let r = Record::from_slice(b"state");
        assert_eq!(r.as_slice(), b"state");
        assert_eq!(r.len(), 5);
        assert!(!r.is_empty());
    }
}
