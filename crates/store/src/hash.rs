use histo_core::Record;
use sha2::{Digest, Sha256};

/// SHA-256 over the attribute values of a record, as 64 lowercase hex chars.
///
/// Values are fed in declared order; missing and `Null` values contribute an
/// empty string. Key fields never take part, so two entities with equal
/// payloads share a hash.
pub fn row_hash<S: AsRef<str>>(record: &Record, attribute_fields: &[S]) -> String {
    let mut hasher = Sha256::new();
    for field in attribute_fields {
        if let Some(text) = record.text(field.as_ref()) {
            hasher.update(text.as_bytes());
        }
    }
    hex::encode(hasher.finalize())
}
