//! Persistence context over one SQLite connection.
//!
//! # Responsibility
//! - Execute query specifications and primary-key lookups.
//! - Track staged inserts/updates/deletes and flush them in one batch.
//! - Expose transaction primitives to the Unit of Work.
//!
//! # Invariants
//! - Lookups by key consult staged entities before the store.
//! - `save_changes` is atomic: a failed flush leaves the store and the staged
//!   changes exactly as they were.
//! - After `close`, every operation reports `RepoError::ContextReleased`.

use super::tracker::{ChangeTracker, EntityState};
use super::{open_db, open_db_in_memory, ContextOptions, DbError, DbResult};
use crate::model::entity::{describe_key, Entity, FieldViolation};
use crate::query::{Filter, QuerySpec};
use crate::repo::{RepoError, RepoResult};
use log::debug;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Requested isolation for an explicit transaction.
///
/// SQLite is serializable at every level; the level picks the lock taken at
/// `BEGIN` instead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    #[default]
    Unspecified,
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
    Snapshot,
}

impl IsolationLevel {
    /// `BEGIN` statement used for this level.
    pub fn begin_statement(self) -> &'static str {
        match self {
            Self::Unspecified | Self::ReadUncommitted | Self::ReadCommitted => "BEGIN DEFERRED;",
            Self::RepeatableRead | Self::Snapshot => "BEGIN IMMEDIATE;",
            Self::Serializable => "BEGIN EXCLUSIVE;",
        }
    }
}

/// Why the context refused to stage an entity.
#[derive(Debug)]
pub(crate) enum StagingRejection {
    Violations(Vec<FieldViolation>),
    AlreadyTracked(EntityState),
    Released,
}

/// One connection plus the changes staged against it.
pub struct PersistenceContext {
    conn: Option<Connection>,
    tracker: ChangeTracker,
}

impl PersistenceContext {
    /// Wraps an already configured connection.
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Some(conn),
            tracker: ChangeTracker::default(),
        }
    }

    pub fn open(path: impl AsRef<Path>, options: &ContextOptions) -> DbResult<Self> {
        open_db(path, options).map(Self::from_connection)
    }

    pub fn open_in_memory(options: &ContextOptions) -> DbResult<Self> {
        open_db_in_memory(options).map(Self::from_connection)
    }

    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    /// Raw connection access for schema setup and ad-hoc SQL.
    pub fn connection(&self) -> RepoResult<&Connection> {
        self.conn.as_ref().ok_or(RepoError::ContextReleased)
    }

    /// Whether SQLite currently has an open transaction on this connection.
    pub fn in_transaction(&self) -> bool {
        self.conn
            .as_ref()
            .is_some_and(|conn| !conn.is_autocommit())
    }

    pub(crate) fn begin(&self, level: IsolationLevel) -> RepoResult<()> {
        self.connection()?.execute_batch(level.begin_statement())?;
        Ok(())
    }

    pub(crate) fn commit(&self) -> RepoResult<()> {
        self.connection()?.execute_batch("COMMIT;")?;
        Ok(())
    }

    pub(crate) fn rollback(&self) -> RepoResult<()> {
        self.connection()?.execute_batch("ROLLBACK;")?;
        Ok(())
    }

    /// Runs a full query specification and materializes every row.
    pub fn select<E: Entity>(&self, spec: &QuerySpec<E>) -> RepoResult<Vec<E>> {
        let conn = self.connection()?;
        let (sql, bind_values) = spec.compile_select()?;
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut entities = Vec::new();
        while let Some(row) = rows.next()? {
            entities.push(E::from_row(row)?);
        }

        for entity in &mut entities {
            for include in &spec.includes {
                include.apply(conn, entity)?;
            }
        }

        Ok(entities)
    }

    pub fn count<E: Entity>(&self, spec: &QuerySpec<E>) -> RepoResult<usize> {
        let (sql, bind_values) = spec.compile_count()?;
        let count: i64 = self
            .connection()?
            .query_row(&sql, params_from_iter(bind_values), |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    pub fn exists<E: Entity>(&self, spec: &QuerySpec<E>) -> RepoResult<bool> {
        let (sql, bind_values) = spec.compile_exists()?;
        let exists: i64 = self
            .connection()?
            .query_row(&sql, params_from_iter(bind_values), |row| row.get(0))?;
        Ok(exists == 1)
    }

    /// Primary-key lookup. Staged entities win over stored rows; an entity
    /// staged for deletion reads as absent.
    pub fn find<E: Entity>(&self, key: &E::Key) -> RepoResult<Option<E>> {
        let key: Value = key.clone().into();
        if let Some(local) = self.tracker.find_local::<E>(&key) {
            return Ok(local);
        }

        let spec = QuerySpec::<E> {
            filter: Some(Filter::eq(E::KEY_COLUMN, key)),
            take: Some(1),
            ..QuerySpec::default()
        };
        Ok(self.select(&spec)?.into_iter().next())
    }

    /// Tracking state for the entity with `key`, `None` when detached.
    pub fn state_of<E: Entity>(&self, key: &E::Key) -> Option<EntityState> {
        self.tracker.state_of(E::TABLE, &key.clone().into())
    }

    pub(crate) fn add<E: Entity>(&mut self, entity: &E) -> Result<(), StagingRejection> {
        self.ensure_stageable(entity)?;
        self.tracker
            .track_added(entity)
            .map_err(StagingRejection::AlreadyTracked)?;
        debug!(
            "event=entity_stage module=db status=ok state=added table={} key={}",
            E::TABLE,
            describe_key(&entity.key().into())
        );
        Ok(())
    }

    pub(crate) fn mark_modified<E: Entity>(&mut self, entity: &E) -> Result<(), StagingRejection> {
        self.ensure_stageable(entity)?;
        self.tracker.track_modified(entity);
        debug!(
            "event=entity_stage module=db status=ok state=modified table={} key={}",
            E::TABLE,
            describe_key(&entity.key().into())
        );
        Ok(())
    }

    pub(crate) fn remove<E: Entity>(&mut self, entity: &E) -> Result<(), StagingRejection> {
        if !self.is_open() {
            return Err(StagingRejection::Released);
        }
        let key: Value = entity.key().into();
        if self.tracker.state_of(E::TABLE, &key).is_none() {
            debug!(
                "event=entity_attach module=db status=ok table={} key={}",
                E::TABLE,
                describe_key(&key)
            );
        }
        self.tracker.track_removed(entity);
        debug!(
            "event=entity_stage module=db status=ok state=deleted table={} key={}",
            E::TABLE,
            describe_key(&key)
        );
        Ok(())
    }

    fn ensure_stageable<E: Entity>(&self, entity: &E) -> Result<(), StagingRejection> {
        if !self.is_open() {
            return Err(StagingRejection::Released);
        }
        let violations = entity.validate();
        if !violations.is_empty() {
            return Err(StagingRejection::Violations(violations));
        }
        Ok(())
    }

    pub fn pending_changes(&self) -> usize {
        self.tracker.len()
    }

    pub fn has_changes(&self) -> bool {
        self.pending_changes() > 0
    }

    /// Drops every staged change without touching the store.
    pub fn discard_changes(&mut self) -> usize {
        let discarded = self.tracker.len();
        self.tracker.clear();
        discarded
    }

    /// Flushes staged changes in staging order and returns affected rows.
    ///
    /// The flush runs inside a savepoint, so it nests under an explicit
    /// transaction and rolls back on its own when any statement fails. Staged
    /// changes are cleared only after the savepoint is released.
    pub fn save_changes(&mut self) -> RepoResult<usize> {
        let conn = self.conn.as_mut().ok_or(RepoError::ContextReleased)?;
        if self.tracker.len() == 0 {
            return Ok(0);
        }

        let savepoint = conn.savepoint()?;
        let mut affected = 0;
        for entry in self.tracker.entries() {
            let (sql, bind_values) = entry.write_statement();
            let changed = savepoint.execute(&sql, params_from_iter(bind_values))?;
            if changed == 0 && entry.state() != EntityState::Added {
                return Err(DbError::RowNotFound {
                    table: entry.table(),
                    key: describe_key(entry.key()),
                }
                .into());
            }
            affected += changed;
        }
        savepoint.commit()?;

        self.tracker.clear();
        Ok(affected)
    }

    /// Closes the connection and drops staged changes.
    ///
    /// Returns `Ok(false)` when the context was already released. A close
    /// failure still releases the connection handle.
    pub fn close(&mut self) -> DbResult<bool> {
        self.tracker.clear();
        let Some(conn) = self.conn.take() else {
            return Ok(false);
        };
        conn.close().map_err(|(_conn, err)| DbError::from(err))?;
        Ok(true)
    }
}
