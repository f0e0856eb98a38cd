use std::path::PathBuf;

use histo_sources::SourceError;
use histo_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("failed to read schedule file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid schedule JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("schedule entry has an empty name")]
    EmptyName,

    #[error("duplicate schedule entry '{0}'")]
    DuplicateEntry(String),

    #[error("schedule entry '{name}' references unknown job '{job}'")]
    UnknownJob { name: String, job: String },

    #[error("schedule entry '{name}': {reason}")]
    InvalidTrigger { name: String, reason: String },

    #[error("schedule entry '{name}': invalid cron expression '{expr}': {source}")]
    InvalidCron {
        name: String,
        expr: String,
        #[source]
        source: cron::error::Error,
    },
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("unknown job '{0}'")]
    UnknownJob(String),

    #[error("job '{0}' is already registered")]
    DuplicateJob(String),

    #[error("source error: {0}")]
    Source(#[from] SourceError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
