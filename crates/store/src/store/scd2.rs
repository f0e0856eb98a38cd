use std::collections::BTreeSet;

use histo_core::Record;
use rusqlite::{params_from_iter, Connection};
use tracing::warn;

use crate::clock::now_iso;
use crate::error::{StoreError, UpsertError};
use crate::hash::row_hash;
use crate::ident::quote;
use crate::layout::EntityLayout;

use super::{VersionedStore, OPEN_ENDED_VALID_TO};

impl VersionedStore {
    /// Apply SCD2 versioning to a batch of records and return how many new
    /// versions were inserted.
    ///
    /// - a record whose attributes hash the same as the current version of
    ///   its key is a no-op
    /// - otherwise the current version (if any) is closed with
    ///   `valid_to = now` and a new current version is inserted
    ///
    /// When `attribute_fields` is `None` the attributes are inferred from
    /// the first record (all of its fields except the keys) and every other
    /// record must carry exactly the same fields.
    ///
    /// The batch, including table creation, is one transaction: any error
    /// rolls back every version written by this call.
    pub fn upsert<I, K>(
        &self,
        table: &str,
        records: I,
        key_fields: &[K],
        attribute_fields: Option<&[K]>,
    ) -> Result<usize, StoreError>
    where
        I: IntoIterator<Item = Record>,
        K: AsRef<str>,
    {
        let records: Vec<Record> = records.into_iter().collect();
        let Some(first) = records.first() else {
            return Ok(0);
        };

        let keys: Vec<&str> = key_fields.iter().map(|k| k.as_ref()).collect();
        let inferred = attribute_fields.is_none();
        let attributes: Vec<&str> = match attribute_fields {
            Some(fields) => fields.iter().map(|k| k.as_ref()).collect(),
            None => first.field_names().filter(|f| !keys.contains(f)).collect(),
        };
        let layout = EntityLayout::new(table, &keys, &attributes)?;
        let expected_fields = inferred.then(|| field_set(first));

        let conn = self.lock();
        let tx = conn.unchecked_transaction()?;
        self.ensure_layout(&layout)?;

        let sql = Scd2Sql::new(&layout);
        let now = now_iso();
        let mut inserted = 0;

        for (index, record) in records.iter().enumerate() {
            let key_values = extract_keys(index, record, &layout)?;
            if let Some(expected) = &expected_fields {
                check_fields(index, record, expected)?;
            }
            let hash = row_hash(record, layout.attribute_fields());

            if let Some((_, current_hash)) = current_version(&tx, &sql, &layout, &key_values)? {
                if current_hash == hash {
                    continue;
                }
                let mut close_params = vec![now.clone()];
                close_params.extend(key_values.iter().cloned());
                tx.prepare_cached(&sql.close_current)?
                    .execute(params_from_iter(close_params))?;
            }

            let mut values: Vec<Option<String>> =
                key_values.iter().cloned().map(Some).collect();
            values.extend(
                layout
                    .attribute_fields()
                    .iter()
                    .map(|a| record.text(a).map(|t| t.into_owned())),
            );
            values.extend([
                Some(now.clone()),
                Some(OPEN_ENDED_VALID_TO.to_string()),
                Some(hash),
            ]);
            tx.prepare_cached(&sql.insert_version)?
                .execute(params_from_iter(values))?;
            inserted += 1;
        }

        tx.commit()?;
        Ok(inserted)
    }
}

/// Statements for one entity layout. Identifiers are validated and quoted.
struct Scd2Sql {
    select_current: String,
    close_current: String,
    insert_version: String,
}

impl Scd2Sql {
    fn new(layout: &EntityLayout) -> Self {
        let table = quote(layout.table());
        let key_match = layout
            .key_fields()
            .iter()
            .map(|k| format!("{} = ?", quote(k)))
            .collect::<Vec<_>>()
            .join(" AND ");
        let columns = layout.columns().map(quote).collect::<Vec<_>>();
        let placeholders = vec!["?"; columns.len()].join(", ");

        Self {
            select_current: format!(
                "SELECT id, row_hash FROM {table} WHERE {key_match} AND is_current = 1 ORDER BY id DESC"
            ),
            close_current: format!(
                "UPDATE {table} SET valid_to = ?, is_current = 0 WHERE {key_match} AND is_current = 1"
            ),
            insert_version: format!(
                "INSERT INTO {table} ({cols}, valid_from, valid_to, is_current, row_hash) \
                 VALUES ({placeholders}, ?, ?, 1, ?)",
                cols = columns.join(", "),
            ),
        }
    }
}

/// Current version of a key as `(id, row_hash)`. Should there be more than
/// one, the highest id wins and the anomaly is reported.
fn current_version(
    conn: &Connection,
    sql: &Scd2Sql,
    layout: &EntityLayout,
    key_values: &[String],
) -> Result<Option<(i64, String)>, StoreError> {
    let mut stmt = conn.prepare_cached(&sql.select_current)?;
    let rows = stmt
        .query_map(params_from_iter(key_values), |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    if rows.len() > 1 {
        warn!(
            table = layout.table(),
            key = %key_values.join("|"),
            current_rows = rows.len(),
            "multiple current versions for one key, using the most recent"
        );
    }
    Ok(rows.into_iter().next())
}

fn extract_keys(
    index: usize,
    record: &Record,
    layout: &EntityLayout,
) -> Result<Vec<String>, UpsertError> {
    layout
        .key_fields()
        .iter()
        .map(|field| match record.get(field) {
            None => Err(UpsertError::MissingKeyField {
                index,
                field: field.clone(),
            }),
            Some(value) => value
                .as_text()
                .map(|t| t.into_owned())
                .ok_or_else(|| UpsertError::NullKeyField {
                    index,
                    field: field.clone(),
                }),
        })
        .collect()
}

fn field_set(record: &Record) -> BTreeSet<&str> {
    record.field_names().collect()
}

fn check_fields(
    index: usize,
    record: &Record,
    expected: &BTreeSet<&str>,
) -> Result<(), UpsertError> {
    let found = field_set(record);
    if &found == expected {
        return Ok(());
    }
    let join = |set: &BTreeSet<&str>| set.iter().copied().collect::<Vec<_>>().join(", ");
    Err(UpsertError::InconsistentFields {
        index,
        expected: join(expected),
        found: join(&found),
    })
}
