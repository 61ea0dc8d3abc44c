//! Unit of Work, generic repositories and outcome-wrapping services over SQLite.
//!
//! A [`UnitOfWork`] owns one persistence context, an optional transaction and
//! a per-type repository cache. [`Repository`] gives uniform CRUD and query
//! access for any [`Entity`]; [`Service`] wraps those operations in an
//! [`Outcome`] envelope that never propagates raw failures.
//!
//! Everything here is single-threaded: handles share state through `Rc`, so
//! none of them is `Send`.

pub mod db;
pub mod logging;
pub mod model;
pub mod query;
pub mod repo;
pub mod service;
pub mod uow;

pub use db::{ContextOptions, DbError, DbResult, EntityState, IsolationLevel, PersistenceContext};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::entity::{Entity, FieldViolation};
pub use query::{Direction, Filter, Include, OrderBy, QuerySpec};
pub use repo::{
    PersistenceValidationError, Query, RepoError, RepoResult, Repository, ValidationError,
};
pub use service::{Fault, Outcome, Service, StatusCode};
pub use uow::{UnitOfWork, UowError, UowResult};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
