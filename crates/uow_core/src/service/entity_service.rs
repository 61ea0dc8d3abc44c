//! Generic entity service.
//!
//! # Responsibility
//! - Forward every repository operation with the same parameter shapes.
//! - Capture every failure into an `Outcome`; nothing is propagated.
//!
//! # Invariants
//! - A captured failure is logged once as `service_call` at warn level.
//! - Absent optional reads succeed with an absent payload.

use super::outcome::Outcome;
use crate::model::entity::Entity;
use crate::query::{Filter, Include, OrderBy};
use crate::repo::{Query, RepoError, RepoResult, Repository};
use crate::uow::{UnitOfWork, UowResult};
use log::warn;
use std::fmt::{self, Debug, Formatter};
use std::rc::Rc;

/// Outcome-wrapping facade over `Repository<E>`.
///
/// Entity-specific services embed a `Service<E>`, deref to it and add their
/// own methods through [`Service::wrap`].
pub struct Service<E: Entity> {
    repository: Rc<Repository<E>>,
}

impl<E: Entity> Service<E> {
    /// Binds the service to the Unit of Work's cached repository for `E`.
    pub fn new(unit_of_work: &UnitOfWork) -> UowResult<Self> {
        Ok(Self::from_repository(unit_of_work.repository::<E>()?))
    }

    pub fn from_repository(repository: Rc<Repository<E>>) -> Self {
        Self { repository }
    }

    pub fn repository(&self) -> &Rc<Repository<E>> {
        &self.repository
    }

    /// Runs `call` against the repository and captures its outcome.
    pub fn wrap<T>(
        &self,
        operation: &'static str,
        call: impl FnOnce(&Repository<E>) -> RepoResult<T>,
    ) -> Outcome<T> {
        match call(&self.repository) {
            Ok(value) => Outcome::ok(value),
            Err(err) => self.captured(operation, err),
        }
    }

    /// Like [`Service::wrap`] for reads that may find nothing.
    pub fn wrap_optional<T>(
        &self,
        operation: &'static str,
        call: impl FnOnce(&Repository<E>) -> RepoResult<Option<T>>,
    ) -> Outcome<T> {
        match call(&self.repository) {
            Ok(value) => Outcome::optional(value),
            Err(err) => self.captured(operation, err),
        }
    }

    pub fn get_all(
        &self,
        order_by: Option<OrderBy>,
        skip: Option<usize>,
        take: Option<usize>,
        includes: &[Include<E>],
    ) -> Outcome<Vec<E>> {
        self.wrap("get_all", |repo| repo.get_all(order_by, skip, take, includes))
    }

    pub fn get(
        &self,
        filter: Option<Filter>,
        order_by: Option<OrderBy>,
        skip: Option<usize>,
        take: Option<usize>,
        includes: &[Include<E>],
    ) -> Outcome<Vec<E>> {
        self.wrap("get", |repo| repo.get(filter, order_by, skip, take, includes))
    }

    pub fn query(&self, filter: Option<Filter>, order_by: Option<OrderBy>) -> Outcome<Query<E>> {
        self.wrap("query", |repo| Ok(repo.query(filter, order_by)))
    }

    pub fn get_by_id(&self, key: &E::Key) -> Outcome<E> {
        self.wrap_optional("get_by_id", |repo| repo.get_by_id(key))
    }

    pub fn get_first_or_default(
        &self,
        filter: Option<Filter>,
        includes: &[Include<E>],
    ) -> Outcome<E> {
        self.wrap_optional("get_first_or_default", |repo| {
            repo.get_first_or_default(filter, includes)
        })
    }

    pub fn get_count(&self, filter: Option<Filter>) -> Outcome<usize> {
        self.wrap("get_count", |repo| repo.get_count(filter))
    }

    pub fn get_exists(&self, filter: Option<Filter>) -> Outcome<bool> {
        self.wrap("get_exists", |repo| repo.get_exists(filter))
    }

    pub fn insert(&self, entity: impl Into<Option<E>>) -> Outcome<E> {
        self.wrap("insert", |repo| repo.insert(entity))
    }

    pub fn update(&self, entity: impl Into<Option<E>>) -> Outcome<E> {
        self.wrap("update", |repo| repo.update(entity))
    }

    pub fn delete_by_id(&self, key: &E::Key) -> Outcome<bool> {
        self.wrap("delete_by_id", |repo| repo.delete_by_id(key).map(|()| true))
    }

    pub fn delete(&self, entity: impl Into<Option<E>>) -> Outcome<bool> {
        self.wrap("delete", |repo| repo.delete(entity).map(|()| true))
    }

    pub fn delete_where(&self, filter: Filter) -> Outcome<bool> {
        self.wrap("delete_where", |repo| repo.delete_where(filter).map(|()| true))
    }

    fn captured<T>(&self, operation: &'static str, err: RepoError) -> Outcome<T> {
        warn!(
            "event=service_call module=service status=error entity={} op={} error={}",
            E::TABLE,
            operation,
            err
        );
        Outcome::from_fault(err)
    }
}

impl<E: Entity> Debug for Service<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("repository", &self.repository)
            .finish()
    }
}
