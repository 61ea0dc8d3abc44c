//! Change tracker for staged writes.
//!
//! # Responsibility
//! - Remember which entities are staged as added, modified or deleted.
//! - Serve staged entities back by key (identity-map reuse).
//! - Produce the write statement for each staged change.
//!
//! # Invariants
//! - At most one entry per `(table, key)`.
//! - Entries keep staging order; flushes replay them in that order.
//! - Removing an entity that is only staged as added drops the entry.

use crate::model::entity::Entity;
use crate::query::quote_ident;
use rusqlite::types::Value;
use std::any::Any;

/// Tracking state of a staged entity. Untracked entities have no state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    Added,
    Modified,
    Deleted,
}

pub(crate) struct TrackedEntry {
    table: &'static str,
    key_column: &'static str,
    columns: &'static [&'static str],
    key: Value,
    values: Vec<Value>,
    state: EntityState,
    entity: Box<dyn Any>,
}

impl TrackedEntry {
    fn capture<E: Entity>(entity: &E, state: EntityState) -> Self {
        Self {
            table: E::TABLE,
            key_column: E::KEY_COLUMN,
            columns: E::COLUMNS,
            key: entity.key().into(),
            values: entity.to_values(),
            state,
            entity: Box::new(entity.clone()),
        }
    }

    fn refresh<E: Entity>(&mut self, entity: &E) {
        self.values = entity.to_values();
        self.entity = Box::new(entity.clone());
    }

    pub(crate) fn table(&self) -> &'static str {
        self.table
    }

    pub(crate) fn key(&self) -> &Value {
        &self.key
    }

    pub(crate) fn state(&self) -> EntityState {
        self.state
    }

    /// Returns the SQL and bound values that persist this entry.
    pub(crate) fn write_statement(&self) -> (String, Vec<Value>) {
        let table = quote_ident(self.table);
        let key_column = quote_ident(self.key_column);
        match self.state {
            EntityState::Added => {
                let columns = self
                    .columns
                    .iter()
                    .map(|column| quote_ident(column))
                    .collect::<Vec<_>>()
                    .join(", ");
                let placeholders = vec!["?"; self.columns.len()].join(", ");
                (
                    format!("INSERT INTO {table} ({columns}) VALUES ({placeholders})"),
                    self.values.clone(),
                )
            }
            EntityState::Modified => {
                let mut assignments = Vec::new();
                let mut bind_values = Vec::new();
                for (column, value) in self.columns.iter().zip(&self.values) {
                    if *column == self.key_column {
                        continue;
                    }
                    assignments.push(format!("{} = ?", quote_ident(column)));
                    bind_values.push(value.clone());
                }
                if assignments.is_empty() {
                    assignments.push(format!("{key_column} = {key_column}"));
                }
                bind_values.push(self.key.clone());
                (
                    format!(
                        "UPDATE {table} SET {} WHERE {key_column} = ?",
                        assignments.join(", ")
                    ),
                    bind_values,
                )
            }
            EntityState::Deleted => (
                format!("DELETE FROM {table} WHERE {key_column} = ?"),
                vec![self.key.clone()],
            ),
        }
    }
}

#[derive(Default)]
pub(crate) struct ChangeTracker {
    entries: Vec<TrackedEntry>,
}

impl ChangeTracker {
    fn position(&self, table: &str, key: &Value) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.table == table && entry.key == *key)
    }

    pub(crate) fn state_of(&self, table: &str, key: &Value) -> Option<EntityState> {
        self.position(table, key)
            .map(|index| self.entries[index].state)
    }

    /// Identity-map lookup.
    ///
    /// `None` means untracked; `Some(None)` means staged for deletion.
    pub(crate) fn find_local<E: Entity>(&self, key: &Value) -> Option<Option<E>> {
        let entry = &self.entries[self.position(E::TABLE, key)?];
        match entry.state {
            EntityState::Deleted => Some(None),
            EntityState::Added | EntityState::Modified => {
                Some(entry.entity.downcast_ref::<E>().cloned())
            }
        }
    }

    /// Stages an insert. Fails with the existing state when the key is
    /// already staged as added or modified.
    pub(crate) fn track_added<E: Entity>(&mut self, entity: &E) -> Result<(), EntityState> {
        let key: Value = entity.key().into();
        match self.position(E::TABLE, &key) {
            None => {
                self.entries
                    .push(TrackedEntry::capture(entity, EntityState::Added));
                Ok(())
            }
            Some(index) => {
                let entry = &mut self.entries[index];
                match entry.state {
                    // Re-adding a row staged for deletion rewrites it in place.
                    EntityState::Deleted => {
                        entry.refresh(entity);
                        entry.state = EntityState::Modified;
                        Ok(())
                    }
                    state => Err(state),
                }
            }
        }
    }

    pub(crate) fn track_modified<E: Entity>(&mut self, entity: &E) {
        let key: Value = entity.key().into();
        match self.position(E::TABLE, &key) {
            None => self
                .entries
                .push(TrackedEntry::capture(entity, EntityState::Modified)),
            Some(index) => {
                let entry = &mut self.entries[index];
                entry.refresh(entity);
                if entry.state == EntityState::Deleted {
                    entry.state = EntityState::Modified;
                }
            }
        }
    }

    /// Stages a delete, attaching the entity first when it is untracked.
    pub(crate) fn track_removed<E: Entity>(&mut self, entity: &E) {
        let key: Value = entity.key().into();
        match self.position(E::TABLE, &key) {
            None => self
                .entries
                .push(TrackedEntry::capture(entity, EntityState::Deleted)),
            Some(index) => {
                let state = self.entries[index].state;
                match state {
                    EntityState::Added => {
                        self.entries.remove(index);
                    }
                    EntityState::Modified => self.entries[index].state = EntityState::Deleted,
                    EntityState::Deleted => {}
                }
            }
        }
    }

    pub(crate) fn entries(&self) -> &[TrackedEntry] {
        &self.entries
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}
