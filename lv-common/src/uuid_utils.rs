//! UUID utilities

use uuid::Uuid;

use crate::{Error, Result};

/// Generate a new UUIDv4
pub fn generate() -> Uuid {
    Uuid::new_v4()
}

/// Parse a UUID read back from a TEXT column
///
/// A malformed id in the store is corruption, not user error.
pub fn parse_stored(column: &'static str, value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| Error::CorruptRow {
        column,
        detail: format!("invalid UUID '{}' ({})", value, e),
    })
}
