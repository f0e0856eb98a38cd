//! Types for the `ingestion_history` audit log.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Lifecycle point of a job run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Start,
    Success,
    Failure,
    /// A failed attempt that the executor is about to retry.
    Retry,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::Start => "start",
            EventType::Success => "success",
            EventType::Failure => "failure",
            EventType::Retry => "retry",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<EventType> for String {
    fn from(e: EventType) -> Self {
        e.as_str().to_string()
    }
}

/// Free-form payload attached to a history event.
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryDetails {
    Text(String),
    /// Stored as its JSON text.
    Json(serde_json::Value),
}

impl HistoryDetails {
    /// Capture any serializable value as structured details.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self, StoreError> {
        Ok(Self::Json(serde_json::to_value(value)?))
    }

    pub(crate) fn to_text(&self) -> Result<String, StoreError> {
        match self {
            HistoryDetails::Text(s) => Ok(s.clone()),
            HistoryDetails::Json(v) => Ok(serde_json::to_string(v)?),
        }
    }
}

impl From<&str> for HistoryDetails {
    fn from(s: &str) -> Self {
        HistoryDetails::Text(s.to_string())
    }
}

impl From<String> for HistoryDetails {
    fn from(s: String) -> Self {
        HistoryDetails::Text(s)
    }
}

impl From<serde_json::Value> for HistoryDetails {
    fn from(v: serde_json::Value) -> Self {
        HistoryDetails::Json(v)
    }
}

/// An event to append. `started_at` defaults to the time of logging.
#[derive(Debug, Clone, PartialEq)]
pub struct NewHistoryEvent {
    pub job_name: String,
    pub event_type: String,
    pub status: String,
    pub started_at: Option<String>,
    pub ended_at: Option<String>,
    pub duration_ms: Option<i64>,
    pub row_count: Option<i64>,
    pub details: Option<HistoryDetails>,
}

impl NewHistoryEvent {
    pub fn new(
        job_name: impl Into<String>,
        event_type: impl Into<String>,
        status: impl Into<String>,
    ) -> Self {
        Self {
            job_name: job_name.into(),
            event_type: event_type.into(),
            status: status.into(),
            started_at: None,
            ended_at: None,
            duration_ms: None,
            row_count: None,
            details: None,
        }
    }

    pub fn started_at(mut self, ts: impl Into<String>) -> Self {
        self.started_at = Some(ts.into());
        self
    }

    pub fn ended_at(mut self, ts: impl Into<String>) -> Self {
        self.ended_at = Some(ts.into());
        self
    }

    pub fn duration_ms(mut self, ms: i64) -> Self {
        self.duration_ms = Some(ms);
        self
    }

    pub fn row_count(mut self, rows: i64) -> Self {
        self.row_count = Some(rows);
        self
    }

    pub fn details(mut self, details: impl Into<HistoryDetails>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// A persisted row of `ingestion_history`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEvent {
    pub id: i64,
    pub job_name: String,
    pub event_type: String,
    pub status: String,
    pub started_at: Option<String>,
    pub ended_at: Option<String>,
    pub duration_ms: Option<i64>,
    pub row_count: Option<i64>,
    pub details: Option<String>,
}

impl HistoryEvent {
    /// Parse `details` back into JSON, if it holds JSON.
    pub fn details_json(&self) -> Option<serde_json::Value> {
        self.details
            .as_deref()
            .and_then(|d| serde_json::from_str(d).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn builder_sets_optional_fields() {
        let ev = NewHistoryEvent::new("fetch_transactions", EventType::Success, "ok")
            .duration_ms(120)
            .row_count(5)
            .details(json!({ "source": "mock" }));
        assert_eq!(ev.event_type, "success");
        assert_eq!(ev.duration_ms, Some(120));
        assert_eq!(ev.row_count, Some(5));
        assert!(ev.started_at.is_none());
    }

    #[test]
    fn json_details_become_json_text() {
        let details = HistoryDetails::from(json!({ "error": "boom" }));
        assert_eq!(details.to_text().unwrap(), r#"{"error":"boom"}"#);
        let plain = HistoryDetails::from("plain note");
        assert_eq!(plain.to_text().unwrap(), "plain note");
    }

    #[test]
    fn non_string_map_keys_fail_to_serialize() {
        let mut bad: HashMap<(i32, i32), i32> = HashMap::new();
        bad.insert((1, 2), 3);
        let err = HistoryDetails::from_serialize(&bad).unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));
    }
}
