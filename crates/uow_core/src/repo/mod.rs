//! Generic repository layer.
//!
//! # Responsibility
//! - Provide uniform CRUD and query operations for any `Entity`.
//! - Stage writes on the shared persistence context; the Unit of Work flushes.
//! - Surface typed failures to callers (fail fast, no result wrapping).
//!
//! # Invariants
//! - Absent arguments fail with `RepoError::Validation` and stage nothing.
//! - Field violations fail with `RepoError::PersistenceValidation` and carry
//!   every violation as structured data.
//! - Anything else raised by SQLite passes through as `RepoError::Db`.

mod query;
mod repository;

pub use query::Query;
pub use repository::Repository;

use crate::db::DbError;
use crate::model::entity::FieldViolation;
use std::fmt::{Display, Formatter};
use thiserror::Error;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository failure taxonomy.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    PersistenceValidation(#[from] PersistenceValidationError),
    #[error("unknown column `{column}` for table `{table}`")]
    UnknownColumn { table: &'static str, column: String },
    #[error("persistence context has been released")]
    ContextReleased,
    /// The context is borrowed by a call still in progress on this thread.
    #[error("persistence context is in use by an enclosing call")]
    ContextBusy,
    #[error(transparent)]
    Db(#[from] DbError),
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// A required argument was absent or could not be staged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{operation} - {message}")]
pub struct ValidationError {
    pub operation: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
        }
    }
}

/// The persistence context rejected one or more field values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistenceValidationError {
    pub operation: &'static str,
    pub entity: &'static str,
    pub violations: Vec<FieldViolation>,
}

impl PersistenceValidationError {
    /// Diagnostic text: one `"<field>: <message>"` line per violation.
    pub fn details(&self) -> String {
        self.violations
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Display for PersistenceValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} rejected `{}` entity:\n{}",
            self.operation,
            self.entity,
            self.details()
        )
    }
}

impl std::error::Error for PersistenceValidationError {}
