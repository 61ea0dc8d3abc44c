//! Unit of Work implementation.
//!
//! # Responsibility
//! - Track the transaction handle through begin/commit/rollback.
//! - Construct repositories lazily and cache them by entity type.
//! - Flush staged changes without touching the transaction boundary.
//!
//! # Invariants
//! - Beginning while a transaction is active is rejected; the open
//!   transaction is left untouched.
//! - Commit and rollback always clear the handle, whatever SQLite answers.
//! - Dispose never commits or rolls back on its own; an open transaction is
//!   abandoned to SQLite, which rolls it back when the connection closes.
//! - The Unit of Work counts as disposed only once the context is closed.

use super::cache::RepositoryCache;
use super::{UowError, UowResult};
use crate::db::{ContextOptions, IsolationLevel, PersistenceContext};
use crate::model::entity::Entity;
use crate::repo::{RepoError, Repository};
use log::{debug, error, info, warn};
use std::cell::{Cell, RefCell, RefMut};
use std::fmt::{self, Debug, Formatter};
use std::path::Path;
use std::rc::Rc;
use std::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
struct TransactionHandle {
    level: IsolationLevel,
    started_at: Instant,
}

/// State shared between a Unit of Work and the repositories it hands out.
pub(crate) struct UowShared {
    id: Uuid,
    context: Rc<RefCell<PersistenceContext>>,
    transaction: RefCell<Option<TransactionHandle>>,
    repositories: RefCell<RepositoryCache>,
    disposed: Cell<bool>,
}

impl UowShared {
    /// Cached repository for `E`, constructed on first request.
    ///
    /// Returns `None` once the Unit of Work is disposed.
    pub(crate) fn repository<E: Entity>(self: &Rc<Self>) -> Option<Rc<Repository<E>>> {
        if self.disposed.get() {
            return None;
        }

        let mut cache = self.repositories.borrow_mut();
        if let Some(cached) = cache.get::<E>() {
            debug!(
                "event=repo_cache module=uow status=hit uow_id={} table={}",
                self.id,
                E::TABLE
            );
            return Some(cached);
        }

        let repository = Rc::new(Repository::new(
            Rc::clone(&self.context),
            Rc::downgrade(self),
        ));
        cache.insert(Rc::clone(&repository));
        debug!(
            "event=repo_cache module=uow status=miss uow_id={} table={} cached={}",
            self.id,
            E::TABLE,
            cache.len()
        );
        Some(repository)
    }
}

/// Transaction-scoped owner of a persistence context and its repositories.
///
/// Not thread-safe: create one Unit of Work per logical operation and per
/// thread. Dropping it disposes it.
pub struct UnitOfWork {
    shared: Rc<UowShared>,
}

impl UnitOfWork {
    /// Takes exclusive ownership of `context`.
    pub fn new(context: PersistenceContext) -> Self {
        let shared = Rc::new(UowShared {
            id: Uuid::new_v4(),
            context: Rc::new(RefCell::new(context)),
            transaction: RefCell::new(None),
            repositories: RefCell::new(RepositoryCache::default()),
            disposed: Cell::new(false),
        });
        info!(
            "event=uow_create module=uow status=ok uow_id={}",
            shared.id
        );
        Self { shared }
    }

    /// Opens a file-backed context and wraps it.
    pub fn open(path: impl AsRef<Path>, options: &ContextOptions) -> UowResult<Self> {
        Ok(Self::new(PersistenceContext::open(path, options)?))
    }

    /// Opens a private in-memory context and wraps it.
    pub fn open_in_memory(options: &ContextOptions) -> UowResult<Self> {
        Ok(Self::new(PersistenceContext::open_in_memory(options)?))
    }

    /// Correlation id used in log events.
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// Returns the repository for `E`, constructing it on first request.
    ///
    /// Repeated calls return the same instance (`Rc::ptr_eq`).
    pub fn repository<E: Entity>(&self) -> UowResult<Rc<Repository<E>>> {
        self.shared.repository::<E>().ok_or(UowError::Disposed)
    }

    /// Number of repositories constructed so far.
    pub fn cached_repositories(&self) -> usize {
        self.shared.repositories.borrow().len()
    }

    /// Opens a transaction at `level`.
    ///
    /// # Errors
    /// - `TransactionAlreadyActive` when a transaction is already open.
    /// - `Disposed` after `dispose`.
    pub fn begin_transaction(&self, level: IsolationLevel) -> UowResult<()> {
        self.ensure_live()?;
        if let Some(active) = *self.shared.transaction.borrow() {
            warn!(
                "event=tx_begin module=uow status=rejected uow_id={} active_isolation={:?} requested_isolation={:?}",
                self.shared.id, active.level, level
            );
            return Err(UowError::TransactionAlreadyActive(active.level));
        }

        if let Err(err) = self.shared.context.borrow().begin(level) {
            error!(
                "event=tx_begin module=uow status=error uow_id={} isolation={:?} error={}",
                self.shared.id, level, err
            );
            return Err(err.into());
        }

        *self.shared.transaction.borrow_mut() = Some(TransactionHandle {
            level,
            started_at: Instant::now(),
        });
        info!(
            "event=tx_begin module=uow status=ok uow_id={} isolation={:?}",
            self.shared.id, level
        );
        Ok(())
    }

    /// Commits the active transaction.
    ///
    /// The handle is cleared whether or not the commit succeeds. When SQLite
    /// keeps the transaction open after a failed commit it is rolled back, so
    /// no transaction outlives its handle.
    pub fn commit_transaction(&self) -> UowResult<bool> {
        self.ensure_live()?;
        let Some(handle) = self.shared.transaction.borrow_mut().take() else {
            return Err(UowError::NoActiveTransaction);
        };

        let context = self.shared.context.borrow();
        match context.commit() {
            Ok(()) => {
                info!(
                    "event=tx_commit module=uow status=ok uow_id={} isolation={:?} duration_ms={}",
                    self.shared.id,
                    handle.level,
                    handle.started_at.elapsed().as_millis()
                );
                Ok(true)
            }
            Err(err) => {
                error!(
                    "event=tx_commit module=uow status=error uow_id={} isolation={:?} error={}",
                    self.shared.id, handle.level, err
                );
                if context.in_transaction() {
                    if let Err(rollback_err) = context.rollback() {
                        warn!(
                            "event=tx_rollback module=uow status=error uow_id={} reason=commit_failed error={}",
                            self.shared.id, rollback_err
                        );
                    }
                }
                Err(err.into())
            }
        }
    }

    /// Rolls back the active transaction; a no-op when none is open.
    pub fn rollback_transaction(&self) -> UowResult<()> {
        let Some(handle) = self.shared.transaction.borrow_mut().take() else {
            debug!(
                "event=tx_rollback module=uow status=skipped uow_id={} reason=no_active_transaction",
                self.shared.id
            );
            return Ok(());
        };

        let context = self.shared.context.borrow();
        // SQLite ends the transaction itself on some errors (e.g. SQLITE_FULL).
        if !context.in_transaction() {
            warn!(
                "event=tx_rollback module=uow status=skipped uow_id={} reason=already_closed",
                self.shared.id
            );
            return Ok(());
        }

        match context.rollback() {
            Ok(()) => {
                info!(
                    "event=tx_rollback module=uow status=ok uow_id={} isolation={:?} duration_ms={}",
                    self.shared.id,
                    handle.level,
                    handle.started_at.elapsed().as_millis()
                );
                Ok(())
            }
            Err(err) => {
                error!(
                    "event=tx_rollback module=uow status=error uow_id={} error={}",
                    self.shared.id, err
                );
                Err(err.into())
            }
        }
    }

    pub fn is_transaction_active(&self) -> bool {
        self.shared.transaction.borrow().is_some()
    }

    pub fn transaction_isolation(&self) -> Option<IsolationLevel> {
        self.shared
            .transaction
            .borrow()
            .as_ref()
            .map(|handle| handle.level)
    }

    /// Flushes every staged insert, update and delete; returns affected rows.
    ///
    /// Does not begin or commit a transaction. Callers wanting the flush to
    /// join a wider atomic scope begin a transaction first.
    pub fn save_changes(&self) -> UowResult<usize> {
        self.ensure_live()?;
        let started_at = Instant::now();
        let mut context = self.context_mut()?;
        let pending = context.pending_changes();
        match context.save_changes() {
            Ok(affected) => {
                info!(
                    "event=save_changes module=uow status=ok uow_id={} staged={} affected={} in_transaction={} duration_ms={}",
                    self.shared.id,
                    pending,
                    affected,
                    context.in_transaction(),
                    started_at.elapsed().as_millis()
                );
                Ok(affected)
            }
            Err(err) => {
                error!(
                    "event=save_changes module=uow status=error uow_id={} staged={} duration_ms={} error={}",
                    self.shared.id,
                    pending,
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err.into())
            }
        }
    }

    pub fn pending_changes(&self) -> usize {
        self.shared.context.borrow().pending_changes()
    }

    pub fn has_changes(&self) -> bool {
        self.pending_changes() > 0
    }

    /// Drops staged changes without writing them; returns how many were dropped.
    ///
    /// Drops nothing while the context is borrowed by an enclosing call.
    pub fn discard_changes(&self) -> usize {
        match self.context_mut() {
            Ok(mut context) => context.discard_changes(),
            Err(_) => {
                warn!(
                    "event=discard_changes module=uow status=skipped uow_id={} reason=context_in_use",
                    self.shared.id
                );
                0
            }
        }
    }

    /// Runs `f` with the persistence context, e.g. for schema setup.
    ///
    /// The context stays borrowed while `f` runs: repository writes and
    /// `save_changes` made from inside `f` fail with `ContextBusy`, and
    /// `dispose` is deferred until the borrow ends.
    pub fn with_context<R>(&self, f: impl FnOnce(&PersistenceContext) -> R) -> UowResult<R> {
        self.ensure_live()?;
        let context = self
            .shared
            .context
            .try_borrow()
            .map_err(|_| RepoError::ContextBusy)?;
        Ok(f(&context))
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.disposed.get()
    }

    /// Releases the persistence context.
    ///
    /// Returns `true` on the call that performed the release and `false` on
    /// every other call. A call made while the context is borrowed releases
    /// nothing and leaves the Unit of Work live, so a later `dispose` or the
    /// drop still performs the release. Close failures are logged and
    /// swallowed.
    pub fn dispose(&self) -> bool {
        let shared = &self.shared;
        if shared.disposed.get() {
            return false;
        }
        let Ok(mut context) = shared.context.try_borrow_mut() else {
            error!(
                "event=uow_dispose module=uow status=deferred uow_id={} error_code=context_in_use",
                shared.id
            );
            return false;
        };
        shared.disposed.set(true);
        let started_at = Instant::now();

        if let Some(handle) = shared.transaction.borrow_mut().take() {
            warn!(
                "event=tx_abandon module=uow status=warn uow_id={} isolation={:?} open_ms={}",
                shared.id,
                handle.level,
                handle.started_at.elapsed().as_millis()
            );
        }
        shared.repositories.borrow_mut().clear();

        let discarded = context.pending_changes();
        if discarded > 0 {
            warn!(
                "event=uow_dispose module=uow status=warn uow_id={} discarded_changes={}",
                shared.id, discarded
            );
        }
        if let Err(err) = context.close() {
            warn!(
                "event=uow_dispose module=uow status=warn uow_id={} error_code=db_close_failed error={}",
                shared.id, err
            );
        }
        drop(context);

        info!(
            "event=uow_dispose module=uow status=ok uow_id={} duration_ms={}",
            shared.id,
            started_at.elapsed().as_millis()
        );
        true
    }

    fn context_mut(&self) -> UowResult<RefMut<'_, PersistenceContext>> {
        self.shared
            .context
            .try_borrow_mut()
            .map_err(|_| RepoError::ContextBusy.into())
    }

    fn ensure_live(&self) -> UowResult<()> {
        if self.is_disposed() {
            return Err(UowError::Disposed);
        }
        Ok(())
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl Debug for UnitOfWork {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("id", &self.shared.id)
            .field("transaction", &self.transaction_isolation())
            .field("repositories", &self.cached_repositories())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
