use std::collections::HashSet;

use rusqlite::{Connection, OptionalExtension};
use tracing::warn;

use crate::error::{SchemaError, StoreError};
use crate::ident::quote;
use crate::layout::EntityLayout;

use super::{VersionedStore, HISTORY_TABLE};

const HISTORY_DDL: &str = "
    CREATE TABLE IF NOT EXISTS ingestion_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        job_name TEXT,
        event_type TEXT,
        status TEXT,
        started_at TEXT,
        ended_at TEXT,
        duration_ms INTEGER,
        row_count INTEGER,
        details TEXT
    );";

const ENTITY_SAVEPOINT: &str = "ensure_entity_table";

impl VersionedStore {
    // ── History ─────────────────────────────────────────────────

    /// Create `ingestion_history` if absent. Idempotent.
    pub fn ensure_history_schema(&self) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute_batch(HISTORY_DDL).map_err(|source| SchemaError::Ddl {
            table: HISTORY_TABLE.to_string(),
            source,
        })?;
        Ok(())
    }

    // ── Entity tables ───────────────────────────────────────────

    /// Create an SCD2 entity table with its indexes if absent. Idempotent.
    ///
    /// Every name is validated before DDL is built. If the table already
    /// exists it must contain every declared column.
    pub fn ensure_entity_table<K: AsRef<str>, A: AsRef<str>>(
        &self,
        table: &str,
        key_fields: &[K],
        attribute_fields: &[A],
    ) -> Result<(), StoreError> {
        let layout = EntityLayout::new(table, key_fields, attribute_fields)?;
        self.ensure_layout(&layout)
    }

    /// Runs inside a savepoint: joins the enclosing transaction when called
    /// from an upsert, otherwise commits on its own.
    pub(crate) fn ensure_layout(&self, layout: &EntityLayout) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute_batch(&format!("SAVEPOINT {ENTITY_SAVEPOINT};"))?;
        match create_entity_table(&conn, layout) {
            Ok(()) => {
                conn.execute_batch(&format!("RELEASE {ENTITY_SAVEPOINT};"))?;
                Ok(())
            }
            Err(e) => {
                if let Err(rollback) = conn.execute_batch(&format!(
                    "ROLLBACK TO {ENTITY_SAVEPOINT}; RELEASE {ENTITY_SAVEPOINT};"
                )) {
                    warn!(
                        table = layout.table(),
                        error = %rollback,
                        "failed to roll back schema savepoint"
                    );
                }
                Err(e)
            }
        }
    }
}

fn create_entity_table(conn: &Connection, layout: &EntityLayout) -> Result<(), StoreError> {
    let table = layout.table();
    let ddl_error = |source| SchemaError::Ddl {
        table: table.to_string(),
        source,
    };

    let mut columns = vec!["id INTEGER PRIMARY KEY AUTOINCREMENT".to_string()];
    columns.extend(
        layout
            .key_fields()
            .iter()
            .map(|k| format!("{} TEXT NOT NULL", quote(k))),
    );
    columns.extend(
        layout
            .attribute_fields()
            .iter()
            .map(|a| format!("{} TEXT", quote(a))),
    );
    columns.extend([
        "valid_from TEXT NOT NULL".to_string(),
        "valid_to TEXT NOT NULL".to_string(),
        "is_current INTEGER NOT NULL".to_string(),
        "row_hash TEXT NOT NULL".to_string(),
    ]);

    let key_list = layout
        .key_fields()
        .iter()
        .map(|k| quote(k))
        .collect::<Vec<_>>()
        .join(", ");
    // Names are not unique across tables: `a_b(c)` and `a(b_c)` both map to
    // `idx_a_b_c`. The second table then keeps only its current-row index.
    let key_index = format!("idx_{}_{}", table, layout.key_fields().join("_"));
    let current_index = format!("idx_{table}_current");
    for index in [&key_index, &current_index] {
        if let Some(owner) = index_owner(conn, index)? {
            if !owner.eq_ignore_ascii_case(table) {
                warn!(table, index = %index, owner = %owner, "index name already used by another table, skipping");
            }
        }
    }

    let ddl = format!(
        "CREATE TABLE IF NOT EXISTS {t} (\n    {cols}\n);\n\
         CREATE INDEX IF NOT EXISTS {ki} ON {t} ({keys});\n\
         CREATE INDEX IF NOT EXISTS {ci} ON {t} (is_current);",
        t = quote(table),
        cols = columns.join(",\n    "),
        ki = quote(&key_index),
        keys = key_list,
        ci = quote(&current_index),
    );
    conn.execute_batch(&ddl).map_err(ddl_error)?;

    let existing = table_columns(conn, table)?;
    for column in layout.columns() {
        if !existing.contains(&column.to_ascii_lowercase()) {
            return Err(SchemaError::MissingColumn {
                table: table.to_string(),
                column: column.to_string(),
            }
            .into());
        }
    }
    Ok(())
}

/// Table an index of this name belongs to, if it exists.
fn index_owner(conn: &Connection, index: &str) -> Result<Option<String>, StoreError> {
    let owner = conn
        .query_row(
            "SELECT tbl_name FROM sqlite_master WHERE type = 'index' AND name = ?1 COLLATE NOCASE",
            [index],
            |row| row.get(0),
        )
        .optional()?;
    Ok(owner)
}

/// Lower-cased column names of an existing table.
fn table_columns(conn: &Connection, table: &str) -> Result<HashSet<String>, StoreError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote(table)))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names.into_iter().map(|n| n.to_ascii_lowercase()).collect())
}
