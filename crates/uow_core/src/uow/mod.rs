//! Unit of Work: transaction scope over one persistence context.
//!
//! # Responsibility
//! - Own the persistence context, the transaction handle and the repository
//!   cache for one logical business operation.
//! - Demarcate transactions (begin/commit/rollback) and flush staged changes.
//! - Release the context exactly once, explicitly or on drop.
//!
//! # Invariants
//! - At most one open transaction per Unit of Work.
//! - At most one repository instance per entity type per Unit of Work.
//! - Lifecycle failures surface as `UowError`; they are never wrapped.

mod cache;
mod unit_of_work;

pub use unit_of_work::UnitOfWork;
pub(crate) use unit_of_work::UowShared;

use crate::db::{DbError, IsolationLevel};
use crate::repo::RepoError;
use thiserror::Error;

pub type UowResult<T> = Result<T, UowError>;

#[derive(Debug, Error)]
pub enum UowError {
    #[error("no active transaction to commit")]
    NoActiveTransaction,
    #[error("a transaction is already active (isolation {0:?})")]
    TransactionAlreadyActive(IsolationLevel),
    #[error("unit of work has been disposed")]
    Disposed,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl From<DbError> for UowError {
    fn from(value: DbError) -> Self {
        Self::Repo(RepoError::Db(value))
    }
}

impl From<rusqlite::Error> for UowError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Repo(RepoError::from(value))
    }
}
