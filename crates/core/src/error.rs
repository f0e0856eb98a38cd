use thiserror::Error;

/// Errors raised while building a [`Record`](crate::Record) from external data.
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("expected a JSON object, got {0}")]
    NotAnObject(String),

    #[error("flattened field name '{0}' occurs more than once")]
    FieldCollision(String),
}
