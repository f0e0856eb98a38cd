//! Ingestion manager: resolves jobs, fetches from sources and writes
//! versioned rows plus lifecycle history through [`histo_store::VersionedStore`].

pub mod error;
pub mod executor;
pub mod jobs;
pub mod schedule;
pub mod scheduler;

pub use error::{JobError, ScheduleError};
pub use executor::{JobExecutor, JobOutcome, RetryPolicy};
pub use jobs::{JobDefinition, JobRegistry};
pub use schedule::{ScheduleEntry, ScheduleFile, Trigger};
pub use scheduler::{run_all_once, run_scheduler};
