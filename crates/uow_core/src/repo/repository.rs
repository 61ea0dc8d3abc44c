//! Generic per-entity repository.
//!
//! # Responsibility
//! - Run reads through the fixed pipeline: includes, filter, ordering, skip, take.
//! - Stage inserts, updates and deletes on the shared persistence context.
//! - Hand out sibling repositories through the owning Unit of Work.
//!
//! # Invariants
//! - List reads materialize eagerly; `query` is the only deferred read.
//! - `delete_where` without a match is a no-op, unlike `delete_by_id` and
//!   `delete`, which reject a missing entity.

use super::query::Query;
use super::{PersistenceValidationError, RepoError, RepoResult, ValidationError};
use crate::db::{PersistenceContext, StagingRejection};
use crate::model::entity::Entity;
use crate::query::{Filter, Include, OrderBy, QuerySpec};
use crate::uow::UowShared;
use std::cell::{Ref, RefCell, RefMut};
use std::fmt::{self, Debug, Formatter};
use std::marker::PhantomData;
use std::rc::{Rc, Weak};

/// Uniform data access for one entity type.
///
/// Obtain instances through `UnitOfWork::repository`; the Unit of Work keeps
/// one instance per entity type.
pub struct Repository<E: Entity> {
    context: Rc<RefCell<PersistenceContext>>,
    unit_of_work: Weak<UowShared>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Repository<E> {
    pub(crate) fn new(
        context: Rc<RefCell<PersistenceContext>>,
        unit_of_work: Weak<UowShared>,
    ) -> Self {
        Self {
            context,
            unit_of_work,
            _entity: PhantomData,
        }
    }

    /// Reads every entity, optionally ordered and paged.
    pub fn get_all(
        &self,
        order_by: Option<OrderBy>,
        skip: Option<usize>,
        take: Option<usize>,
        includes: &[Include<E>],
    ) -> RepoResult<Vec<E>> {
        self.get(None, order_by, skip, take, includes)
    }

    /// Reads the entities matching `filter`, optionally ordered and paged.
    pub fn get(
        &self,
        filter: Option<Filter>,
        order_by: Option<OrderBy>,
        skip: Option<usize>,
        take: Option<usize>,
        includes: &[Include<E>],
    ) -> RepoResult<Vec<E>> {
        let spec = QuerySpec {
            filter,
            order_by,
            skip,
            take,
            includes: includes.to_vec(),
        };
        self.context()?.select(&spec)
    }

    /// Returns a deferred query handle for further composition.
    pub fn query(&self, filter: Option<Filter>, order_by: Option<OrderBy>) -> Query<E> {
        let spec = QuerySpec {
            filter,
            order_by,
            ..QuerySpec::default()
        };
        Query::new(Rc::clone(&self.context), spec)
    }

    /// Primary-key lookup; staged entities are served from the context.
    pub fn get_by_id(&self, key: &E::Key) -> RepoResult<Option<E>> {
        self.context()?.find(key)
    }

    pub fn get_first_or_default(
        &self,
        filter: Option<Filter>,
        includes: &[Include<E>],
    ) -> RepoResult<Option<E>> {
        let spec = QuerySpec {
            filter,
            take: Some(1),
            includes: includes.to_vec(),
            ..QuerySpec::default()
        };
        Ok(self.context()?.select(&spec)?.into_iter().next())
    }

    pub fn get_count(&self, filter: Option<Filter>) -> RepoResult<usize> {
        let spec = QuerySpec::<E> {
            filter,
            ..QuerySpec::default()
        };
        self.context()?.count(&spec)
    }

    pub fn get_exists(&self, filter: Option<Filter>) -> RepoResult<bool> {
        let spec = QuerySpec::<E> {
            filter,
            ..QuerySpec::default()
        };
        self.context()?.exists(&spec)
    }

    /// Stages `entity` for insertion and returns it.
    ///
    /// The row is written by the owning Unit of Work's `save_changes`.
    pub fn insert(&self, entity: impl Into<Option<E>>) -> RepoResult<E> {
        let entity = require_entity(entity.into(), "insert")?;
        let staged = self.context_mut()?.add(&entity);
        staged.map_err(|rejection| rejected::<E>(rejection, "insert", &entity))?;
        Ok(entity)
    }

    /// Marks `entity` as modified and returns it.
    pub fn update(&self, entity: impl Into<Option<E>>) -> RepoResult<E> {
        let entity = require_entity(entity.into(), "update")?;
        let staged = self.context_mut()?.mark_modified(&entity);
        staged.map_err(|rejection| rejected::<E>(rejection, "update", &entity))?;
        Ok(entity)
    }

    /// Stages the entity stored under `key` for removal.
    pub fn delete_by_id(&self, key: &E::Key) -> RepoResult<()> {
        let Some(entity) = self.get_by_id(key)? else {
            return Err(ValidationError::new(
                "delete_by_id",
                format!("no `{}` entity with key {key:?}", E::TABLE),
            )
            .into());
        };
        self.stage_removal(&entity, "delete_by_id")
    }

    /// Stages `entity` for removal, attaching it first when untracked.
    pub fn delete(&self, entity: impl Into<Option<E>>) -> RepoResult<()> {
        let entity = require_entity(entity.into(), "delete")?;
        self.stage_removal(&entity, "delete")
    }

    /// Stages the first entity matching `filter` for removal.
    ///
    /// Completes without error when nothing matches.
    pub fn delete_where(&self, filter: Filter) -> RepoResult<()> {
        match self.get_first_or_default(Some(filter), &[])? {
            Some(entity) => self.stage_removal(&entity, "delete_where"),
            None => Ok(()),
        }
    }

    /// Returns the owning Unit of Work's repository for a related entity type.
    pub fn get_repository<T: Entity>(&self) -> RepoResult<Rc<Repository<T>>> {
        self.unit_of_work
            .upgrade()
            .and_then(|shared| shared.repository::<T>())
            .ok_or(RepoError::ContextReleased)
    }

    fn context(&self) -> RepoResult<Ref<'_, PersistenceContext>> {
        self.context.try_borrow().map_err(|_| RepoError::ContextBusy)
    }

    fn context_mut(&self) -> RepoResult<RefMut<'_, PersistenceContext>> {
        self.context
            .try_borrow_mut()
            .map_err(|_| RepoError::ContextBusy)
    }

    fn stage_removal(&self, entity: &E, operation: &'static str) -> RepoResult<()> {
        let staged = self.context_mut()?.remove(entity);
        staged.map_err(|rejection| rejected::<E>(rejection, operation, entity))
    }
}

impl<E: Entity> Debug for Repository<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("entity", &std::any::type_name::<E>())
            .field("table", &E::TABLE)
            .finish()
    }
}

fn require_entity<E>(entity: Option<E>, operation: &'static str) -> RepoResult<E> {
    entity.ok_or_else(|| ValidationError::new(operation, "entity is absent").into())
}

fn rejected<E: Entity>(
    rejection: StagingRejection,
    operation: &'static str,
    entity: &E,
) -> RepoError {
    match rejection {
        StagingRejection::Violations(violations) => {
            PersistenceValidationError {
                operation,
                entity: E::TABLE,
                violations,
            }
            .into()
        }
        StagingRejection::AlreadyTracked(state) => ValidationError::new(
            operation,
            format!(
                "`{}` entity with key {:?} is already tracked as {state:?}",
                E::TABLE,
                entity.key()
            ),
        )
        .into(),
        StagingRejection::Released => RepoError::ContextReleased,
    }
}
