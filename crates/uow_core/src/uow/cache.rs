//! Per-instance repository registry keyed by entity type.

use crate::model::entity::Entity;
use crate::repo::Repository;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::rc::Rc;

/// Repositories constructed by one Unit of Work.
///
/// Each entry is stored under `TypeId::of::<E>()` and always holds a
/// `Repository<E>` for that same `E`.
#[derive(Default)]
pub(crate) struct RepositoryCache {
    repositories: HashMap<TypeId, Rc<dyn Any>>,
}

impl RepositoryCache {
    pub(crate) fn get<E: Entity>(&self) -> Option<Rc<Repository<E>>> {
        let cached = self.repositories.get(&TypeId::of::<E>())?;
        Rc::clone(cached).downcast::<Repository<E>>().ok()
    }

    pub(crate) fn insert<E: Entity>(&mut self, repository: Rc<Repository<E>>) {
        self.repositories.insert(TypeId::of::<E>(), repository);
    }

    pub(crate) fn len(&self) -> usize {
        self.repositories.len()
    }

    pub(crate) fn clear(&mut self) {
        self.repositories.clear();
    }
}
