//! Identifier checks for names that end up in DDL.
//!
//! Table and column names come from job definitions and schedule files, so
//! they are validated before any statement is built and quoted when used.

use crate::error::SchemaError;

/// Columns every entity table carries besides its key and attribute fields.
pub const VERSIONING_COLUMNS: &[&str] = &["id", "valid_from", "valid_to", "is_current", "row_hash"];

/// Accept `[A-Za-z0-9_]+`, reject everything else.
pub fn validate_identifier(name: &str) -> Result<(), SchemaError> {
    if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(SchemaError::InvalidIdentifier(name.to_string()))
    }
}

/// Double-quote an identifier that already passed [`validate_identifier`].
pub fn quote(name: &str) -> String {
    format!("\"{name}\"")
}

pub fn is_versioning_column(name: &str) -> bool {
    VERSIONING_COLUMNS.iter().any(|c| c.eq_ignore_ascii_case(name))
}
