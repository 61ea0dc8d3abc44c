//! SQLite persistence context and connection bootstrap.
//!
//! # Responsibility
//! - Open and configure SQLite connections from [`ContextOptions`].
//! - Own the persistence context: one connection plus its change tracker.
//! - Translate query specifications into SQL and flush staged changes.
//!
//! # Invariants
//! - A context owns exactly one connection until it is released.
//! - A released context never reopens; every later call reports release.
//! - Staged changes reach the store only through `save_changes`.

mod context;
mod open;
mod options;
pub(crate) mod tracker;

pub(crate) use context::StagingRejection;
pub use context::{IsolationLevel, PersistenceContext};
pub use open::{open_db, open_db_in_memory};
pub use options::ContextOptions;
pub use tracker::EntityState;

use thiserror::Error;

pub type DbResult<T> = Result<T, DbError>;

/// Faults surfaced by the underlying store.
#[derive(Debug, Error)]
pub enum DbError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    /// A staged update or delete matched no row when flushed.
    #[error("no row in `{table}` matched key {key}")]
    RowNotFound { table: &'static str, key: String },
    #[error("unsupported journal mode `{0}`; expected delete|truncate|persist|memory|wal|off")]
    UnsupportedJournalMode(String),
}
