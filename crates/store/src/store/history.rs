use rusqlite::params;

use crate::clock::now_iso;
use crate::error::StoreError;
use crate::history::{HistoryEvent, NewHistoryEvent};

use super::VersionedStore;

impl VersionedStore {
    /// Append one event to `ingestion_history` and return its id.
    ///
    /// Structured details are serialized before the lock is taken, so a
    /// serialization failure only affects this call.
    pub fn log_event(&self, event: &NewHistoryEvent) -> Result<i64, StoreError> {
        let details = event
            .details
            .as_ref()
            .map(|d| d.to_text())
            .transpose()?;
        let started_at = event.started_at.clone().unwrap_or_else(now_iso);

        let conn = self.lock();
        conn.execute(
            "INSERT INTO ingestion_history
             (job_name, event_type, status, started_at, ended_at, duration_ms, row_count, details)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                event.job_name,
                event.event_type,
                event.status,
                started_at,
                event.ended_at,
                event.duration_ms,
                event.row_count,
                details,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// The `limit` most recent events, newest first.
    pub fn fetch_recent(&self, limit: usize) -> Result<Vec<HistoryEvent>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let conn = self.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT id, job_name, event_type, status, started_at, ended_at,
                    duration_ms, row_count, details
             FROM ingestion_history
             ORDER BY id DESC
             LIMIT ?1",
        )?;
        let events = stmt
            .query_map(params![limit], |row| {
                Ok(HistoryEvent {
                    id: row.get(0)?,
                    job_name: row.get(1)?,
                    event_type: row.get(2)?,
                    status: row.get(3)?,
                    started_at: row.get(4)?,
                    ended_at: row.get(5)?,
                    duration_ms: row.get(6)?,
                    row_count: row.get(7)?,
                    details: row.get(8)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }
}
