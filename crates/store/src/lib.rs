//! Persistent versioned store.
//!
//! One SQLite connection, guarded by a re-entrant lock, backs two things:
//! - `ingestion_history`: an append-only audit log of job lifecycle events
//! - one SCD2 table per entity: every past version of a record is kept,
//!   exactly one row per natural key is flagged current, and a content hash
//!   over the attribute fields decides whether a new version is needed.
//!
//! [`VersionedStore`] is the only type callers hold.

pub mod clock;
pub mod error;
pub mod hash;
pub mod history;
pub mod ident;
pub mod layout;
pub mod store;

pub use error::{SchemaError, StoreError, UpsertError};
pub use hash::row_hash;
pub use history::{EventType, HistoryDetails, HistoryEvent, NewHistoryEvent};
pub use layout::EntityLayout;
pub use store::{VersionedStore, HISTORY_TABLE, OPEN_ENDED_VALID_TO};
