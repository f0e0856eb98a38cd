//! Pluggable record sources for the ingestion manager.
//!
//! - [`RecordSource`]: async trait every source implements
//! - [`MockSource`]: offline transaction generator
//! - [`VWorldSource`] / [`VWorldClient`]: VWorld address search
//! - [`SourceRegistry`]: name-keyed lookup used by job definitions

pub mod error;
pub mod mock;
pub mod registry;
pub mod source;
pub mod vworld;

pub use error::SourceError;
pub use mock::MockSource;
pub use registry::SourceRegistry;
pub use source::{RecordSource, SourceParams};
pub use vworld::{AddressQuery, SearchCategory, SearchOutcome, VWorldClient, VWorldSource};
