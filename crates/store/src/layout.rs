use std::collections::HashSet;

use crate::error::SchemaError;
use crate::ident::{is_versioning_column, validate_identifier};
use crate::store::HISTORY_TABLE;

/// Validated shape of an entity table: its name, key fields and attribute
/// fields, in declared order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityLayout {
    table: String,
    key_fields: Vec<String>,
    attribute_fields: Vec<String>,
}

impl EntityLayout {
    /// Check every name against the identifier grammar and the reserved
    /// names before anything is allowed near DDL.
    pub fn new<K: AsRef<str>, A: AsRef<str>>(
        table: &str,
        key_fields: &[K],
        attribute_fields: &[A],
    ) -> Result<Self, SchemaError> {
        validate_identifier(table)?;
        let lowered = table.to_ascii_lowercase();
        if lowered == HISTORY_TABLE || lowered.starts_with("sqlite_") {
            return Err(SchemaError::ReservedTable(table.to_string()));
        }
        if key_fields.is_empty() {
            return Err(SchemaError::NoKeyFields(table.to_string()));
        }

        let key_fields: Vec<String> = key_fields.iter().map(|k| k.as_ref().to_string()).collect();
        let attribute_fields: Vec<String> =
            attribute_fields.iter().map(|a| a.as_ref().to_string()).collect();

        // SQLite column names are case-insensitive.
        let mut seen = HashSet::new();
        for field in key_fields.iter().chain(attribute_fields.iter()) {
            validate_identifier(field)?;
            if is_versioning_column(field) {
                return Err(SchemaError::ReservedColumn(field.clone()));
            }
            if !seen.insert(field.to_ascii_lowercase()) {
                return Err(SchemaError::DuplicateColumn(field.clone()));
            }
        }

        Ok(Self {
            table: table.to_string(),
            key_fields,
            attribute_fields,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn key_fields(&self) -> &[String] {
        &self.key_fields
    }

    pub fn attribute_fields(&self) -> &[String] {
        &self.attribute_fields
    }

    /// Key fields followed by attribute fields.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.key_fields
            .iter()
            .chain(self.attribute_fields.iter())
            .map(String::as_str)
    }
}
