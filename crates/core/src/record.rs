use std::borrow::Cow;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::RecordError;

/// A flat record: an ordered mapping from field name to a scalar value.
///
/// Field order is the insertion order, which matters when attribute fields
/// are inferred from the first record of a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: IndexMap<String, FieldValue>,
}

/// Typed scalar values. Sources may hand over numbers and booleans; everything is
/// persisted as text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Null,
}

impl FieldValue {
    /// Text rendering used for storage and hashing. `Null` has none.
    ///
    /// Floats always carry a fraction or exponent (`100.0`, `1e+16`) and
    /// booleans are `True`/`False`, so hashes match rows already written by
    /// the existing ingestion jobs.
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            FieldValue::Text(s) => Some(Cow::Borrowed(s.as_str())),
            FieldValue::Integer(i) => Some(Cow::Owned(i.to_string())),
            FieldValue::Float(f) => Some(Cow::Owned(float_text(*f))),
            FieldValue::Boolean(true) => Some(Cow::Borrowed("True")),
            FieldValue::Boolean(false) => Some(Cow::Borrowed("False")),
            FieldValue::Null => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Convert a JSON scalar. Arrays and objects are kept as their JSON text.
    pub fn from_json(value: &serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Boolean(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::Integer(i),
                None => n.as_f64().map(FieldValue::Float).unwrap_or(FieldValue::Null),
            },
            Value::String(s) => FieldValue::Text(s.clone()),
            other => FieldValue::Text(other.to_string()),
        }
    }
}

/// Shortest round-trip digits; fixed notation for exponents in `-4..16`,
/// otherwise `<mantissa>e<sign><at least two digits>`.
fn float_text(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let scientific = format!("{f:e}");
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return scientific;
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);
    if (-4..16).contains(&exponent) {
        let fixed = f.to_string();
        if fixed.contains('.') {
            fixed
        } else {
            format!("{fixed}.0")
        }
    } else {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", exponent.abs())
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_text() {
            Some(text) => f.write_str(&text),
            None => f.write_str("null"),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Integer(i)
    }
}

impl From<f64> for FieldValue {
    fn from(f: f64) -> Self {
        FieldValue::Float(f)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Boolean(b)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(field, value);
        self
    }

    /// Insert or replace a field, keeping its original position on replace.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Remove a field, preserving the order of the remaining ones.
    pub fn remove(&mut self, field: &str) -> Option<FieldValue> {
        self.fields.shift_remove(field)
    }

    /// Text value of a field; missing and `Null` both yield `None`.
    pub fn text(&self, field: &str) -> Option<Cow<'_, str>> {
        self.fields.get(field).and_then(FieldValue::as_text)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Flatten a JSON object into a record.
    ///
    /// Nested objects are joined with `_` (`{"address": {"road": ..}}` becomes
    /// `address_road`); arrays are kept as JSON text.
    pub fn from_json_object(value: &serde_json::Value) -> Result<Self, RecordError> {
        let object = value
            .as_object()
            .ok_or_else(|| RecordError::NotAnObject(json_kind(value).to_string()))?;
        let mut record = Record::new();
        flatten_into(&mut record, None, object)?;
        Ok(record)
    }
}

fn flatten_into(
    record: &mut Record,
    prefix: Option<&str>,
    object: &serde_json::Map<String, serde_json::Value>,
) -> Result<(), RecordError> {
    for (key, value) in object {
        let name = match prefix {
            Some(p) => format!("{p}_{key}"),
            None => key.clone(),
        };
        if let serde_json::Value::Object(nested) = value {
            flatten_into(record, Some(&name), nested)?;
            continue;
        }
        if record.contains(&name) {
            return Err(RecordError::FieldCollision(name));
        }
        record.insert(name, FieldValue::from_json(value));
    }
    Ok(())
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

impl<K: Into<String>, V: Into<FieldValue>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_rendering() {
        assert_eq!(FieldValue::from("abc").as_text().as_deref(), Some("abc"));
        assert_eq!(FieldValue::from(42i64).as_text().as_deref(), Some("42"));
        assert_eq!(FieldValue::from(true).as_text().as_deref(), Some("True"));
        assert_eq!(FieldValue::from(false).as_text().as_deref(), Some("False"));
        assert_eq!(FieldValue::Null.as_text(), None);
    }

    #[test]
    fn float_rendering() {
        let text = |f: f64| FieldValue::Float(f).as_text().map(Cow::into_owned);
        assert_eq!(text(100.0).as_deref(), Some("100.0"));
        assert_eq!(text(0.0).as_deref(), Some("0.0"));
        assert_eq!(text(-0.0).as_deref(), Some("-0.0"));
        assert_eq!(text(12.5).as_deref(), Some("12.5"));
        assert_eq!(text(0.1).as_deref(), Some("0.1"));
        assert_eq!(text(0.0001).as_deref(), Some("0.0001"));
        assert_eq!(text(0.00001).as_deref(), Some("1e-05"));
        assert_eq!(text(1.5e-7).as_deref(), Some("1.5e-07"));
        assert_eq!(text(1e15).as_deref(), Some("1000000000000000.0"));
        assert_eq!(text(1e16).as_deref(), Some("1e+16"));
        assert_eq!(text(1.2345e20).as_deref(), Some("1.2345e+20"));
        assert_eq!(text(1e100).as_deref(), Some("1e+100"));
        assert_eq!(text(f64::NAN).as_deref(), Some("nan"));
        assert_eq!(text(f64::NEG_INFINITY).as_deref(), Some("-inf"));
    }

    #[test]
    fn insertion_order_is_kept() {
        let rec = Record::new().with("b", "1").with("a", "2").with("c", "3");
        let names: Vec<&str> = rec.field_names().collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn missing_and_null_have_no_text() {
        let rec = Record::new().with("x", FieldValue::Null);
        assert!(rec.text("x").is_none());
        assert!(rec.text("y").is_none());
        assert!(rec.contains("x"));
    }

    #[test]
    fn flatten_nested_json() {
        let value = json!({
            "id": "1111010100100010000",
            "address": { "road": "서울특별시 종로구 세종대로 175", "zipcode": "03154" },
            "point": { "x": "126.97", "y": "37.57" },
            "tags": ["a", "b"]
        });
        let rec = Record::from_json_object(&value).unwrap();
        assert_eq!(rec.text("address_road").as_deref(), Some("서울특별시 종로구 세종대로 175"));
        assert_eq!(rec.text("point_y").as_deref(), Some("37.57"));
        assert_eq!(rec.text("tags").as_deref(), Some(r#"["a","b"]"#));
        assert_eq!(rec.len(), 6);
    }

    #[test]
    fn flatten_rejects_non_objects() {
        let err = Record::from_json_object(&json!([1, 2])).unwrap_err();
        assert!(matches!(err, RecordError::NotAnObject(kind) if kind == "array"));
    }

    #[test]
    fn flatten_detects_collisions() {
        let value = json!({ "a_b": 1, "a": { "b": 2 } });
        let err = Record::from_json_object(&value).unwrap_err();
        assert!(matches!(err, RecordError::FieldCollision(name) if name == "a_b"));
    }

    #[test]
    fn serializes_as_plain_map() {
        let rec = Record::new().with("tx_id", "mock-0").with("amount", 12.5);
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json, json!({ "tx_id": "mock-0", "amount": 12.5 }));
    }
}
