//! Deferred, composable query handle.

use super::{RepoError, RepoResult};
use crate::db::PersistenceContext;
use crate::model::entity::Entity;
use crate::query::{Filter, Include, OrderBy, QuerySpec};
use std::cell::{Ref, RefCell};
use std::fmt::{self, Debug, Formatter};
use std::rc::Rc;

/// A query that has not run yet.
///
/// Builder calls only change the specification; SQL runs in the terminal
/// calls (`to_vec`, `first`, `count`, `exists`), each against the current
/// state of the store.
pub struct Query<E: Entity> {
    context: Rc<RefCell<PersistenceContext>>,
    spec: QuerySpec<E>,
}

impl<E: Entity> Query<E> {
    pub(crate) fn new(context: Rc<RefCell<PersistenceContext>>, spec: QuerySpec<E>) -> Self {
        Self { context, spec }
    }

    /// Narrows the query; combined with earlier filters using AND.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.spec = self.spec.and_filter(filter);
        self
    }

    /// Replaces the ordering.
    pub fn order_by(mut self, order_by: OrderBy) -> Self {
        self.spec.order_by = Some(order_by);
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.spec.skip = Some(skip);
        self
    }

    pub fn take(mut self, take: usize) -> Self {
        self.spec.take = Some(take);
        self
    }

    pub fn include(mut self, include: Include<E>) -> Self {
        self.spec.includes.push(include);
        self
    }

    pub fn spec(&self) -> &QuerySpec<E> {
        &self.spec
    }

    fn context(&self) -> RepoResult<Ref<'_, PersistenceContext>> {
        self.context.try_borrow().map_err(|_| RepoError::ContextBusy)
    }

    pub fn to_vec(&self) -> RepoResult<Vec<E>> {
        self.context()?.select(&self.spec)
    }

    pub fn first(&self) -> RepoResult<Option<E>> {
        let mut spec = self.spec.clone();
        spec.take = Some(spec.take.map_or(1, |take| take.min(1)));
        Ok(self.context()?.select(&spec)?.into_iter().next())
    }

    pub fn count(&self) -> RepoResult<usize> {
        self.context()?.count(&self.spec)
    }

    pub fn exists(&self) -> RepoResult<bool> {
        self.context()?.exists(&self.spec)
    }
}

impl<E: Entity> Clone for Query<E> {
    fn clone(&self) -> Self {
        Self {
            context: Rc::clone(&self.context),
            spec: self.spec.clone(),
        }
    }
}

impl<E: Entity> Debug for Query<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query").field("spec", &self.spec).finish()
    }
}
