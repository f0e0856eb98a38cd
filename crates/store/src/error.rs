use thiserror::Error;

/// Every failure the store can surface. Nothing is retried or swallowed.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("upsert error: {0}")]
    Upsert(#[from] UpsertError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("connection error: {0}")]
    Connection(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Rejected table layouts and failed DDL.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("invalid identifier '{0}': only ASCII letters, digits and '_' are allowed")]
    InvalidIdentifier(String),

    #[error("'{0}' is reserved and cannot be used as an entity table name")]
    ReservedTable(String),

    #[error("field '{0}' collides with a versioning column")]
    ReservedColumn(String),

    #[error("field '{0}' is declared more than once")]
    DuplicateColumn(String),

    #[error("entity table '{0}' needs at least one key field")]
    NoKeyFields(String),

    #[error("entity table '{table}' exists without column '{column}'")]
    MissingColumn { table: String, column: String },

    #[error("DDL for '{table}' failed: {source}")]
    Ddl {
        table: String,
        #[source]
        source: rusqlite::Error,
    },
}

/// Bad input in an upsert batch. The whole batch is rolled back.
#[derive(Error, Debug)]
pub enum UpsertError {
    #[error("record {index} is missing key field '{field}'")]
    MissingKeyField { index: usize, field: String },

    #[error("record {index} has a null value for key field '{field}'")]
    NullKeyField { index: usize, field: String },

    #[error(
        "record {index} does not match the fields inferred from the first record \
         (expected [{expected}], found [{found}])"
    )]
    InconsistentFields {
        index: usize,
        expected: String,
        found: String,
    },
}
