use async_trait::async_trait;
use histo_core::Record;

use crate::error::SourceError;

/// Free-form parameters handed to a source, usually from a schedule entry.
pub type SourceParams = serde_json::Map<String, serde_json::Value>;

/// A pluggable external data source producing flat records.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Registry name, e.g. `"mock"`.
    fn name(&self) -> &str;

    /// Fetch one batch of records.
    async fn fetch(&self, params: &SourceParams) -> Result<Vec<Record>, SourceError>;
}

/// Optional unsigned integer parameter. Numbers and numeric strings are
/// accepted; anything else is an error.
pub fn param_u64(params: &SourceParams, key: &str) -> Result<Option<u64>, SourceError> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::Number(n)) => n
            .as_u64()
            .map(Some)
            .ok_or_else(|| SourceError::InvalidArgument(format!("'{key}' must be a non-negative integer"))),
        Some(serde_json::Value::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| SourceError::InvalidArgument(format!("'{key}' must be a non-negative integer"))),
        Some(_) => Err(SourceError::InvalidArgument(format!(
            "'{key}' must be a non-negative integer"
        ))),
    }
}

/// Optional string parameter.
pub fn param_str<'a>(params: &'a SourceParams, key: &str) -> Result<Option<&'a str>, SourceError> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(SourceError::InvalidArgument(format!("'{key}' must be a string"))),
    }
}

/// Optional boolean parameter.
pub fn param_bool(params: &SourceParams, key: &str) -> Result<Option<bool>, SourceError> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(SourceError::InvalidArgument(format!("'{key}' must be a boolean"))),
    }
}
