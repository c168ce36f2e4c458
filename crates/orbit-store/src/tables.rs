//! redb table definitions for the record store.

use redb::TableDefinition;

/// Records keyed by `(category, name)`.
pub const RECORDS: TableDefinition<(&str, &str), &[u8]> = TableDefinition::new("records");
