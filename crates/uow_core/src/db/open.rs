//! Connection bootstrap utilities for SQLite.
//!
//! # Responsibility
//! - Open file or in-memory SQLite connections.
//! - Apply the pragmas requested by [`ContextOptions`].
//!
//! # Invariants
//! - Returned connections are in autocommit mode.
//! - Returned connections honor the requested `foreign_keys` and busy timeout.

use super::{ContextOptions, DbResult};
use log::{error, info, warn};
use rusqlite::Connection;
use std::path::Path;
use std::time::Instant;

/// Opens a SQLite database file and configures it.
///
/// # Side effects
/// - Creates the file when it does not exist.
/// - Emits `db_open` logging events with duration and status.
pub fn open_db(path: impl AsRef<Path>, options: &ContextOptions) -> DbResult<Connection> {
    open_with("file", options, || Connection::open(path))
}

/// Opens a private in-memory SQLite database and configures it.
///
/// # Side effects
/// - Emits `db_open` logging events with duration and status.
pub fn open_db_in_memory(options: &ContextOptions) -> DbResult<Connection> {
    open_with("memory", options, Connection::open_in_memory)
}

fn open_with(
    mode: &str,
    options: &ContextOptions,
    open: impl FnOnce() -> rusqlite::Result<Connection>,
) -> DbResult<Connection> {
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode={mode}");

    let conn = match open() {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={mode} duration_ms={} error_code=db_open_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    match bootstrap_connection(&conn, options) {
        Ok(journal_mode) => {
            info!(
                "event=db_open module=db status=ok mode={mode} journal_mode={} duration_ms={}",
                journal_mode.as_deref().unwrap_or("default"),
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={mode} duration_ms={} error_code=db_bootstrap_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

/// Applies the pragmas and returns the journal mode SQLite actually applied,
/// when one was requested.
fn bootstrap_connection(conn: &Connection, options: &ContextOptions) -> DbResult<Option<String>> {
    conn.pragma_update(None, "foreign_keys", options.foreign_keys)?;
    conn.busy_timeout(options.busy_timeout())?;
    let Some(requested) = options.normalized_journal_mode()? else {
        return Ok(None);
    };

    // SQLite answers with the mode in effect; memory databases keep `memory`.
    let applied: String =
        conn.pragma_update_and_check(None, "journal_mode", requested, |row| row.get(0))?;
    let applied = applied.to_ascii_lowercase();
    if applied != requested {
        warn!(
            "event=db_open module=db status=warn error_code=journal_mode_not_applied requested={} applied={}",
            requested, applied
        );
    }
    Ok(Some(applied))
}

#[cfg(test)]
mod tests {
    use super::{bootstrap_connection, open_db, open_db_in_memory};
    use crate::db::{ContextOptions, DbError};
    use rusqlite::Connection;

    #[test]
    fn in_memory_connection_applies_foreign_keys_option() {
        let conn = open_db_in_memory(&ContextOptions::default()).unwrap();
        let enabled: i64 = conn
            .query_row("PRAGMA foreign_keys;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(enabled, 1);

        let disabled = ContextOptions {
            foreign_keys: false,
            ..ContextOptions::default()
        };
        let conn = open_db_in_memory(&disabled).unwrap();
        let enabled: i64 = conn
            .query_row("PRAGMA foreign_keys;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(enabled, 0);
    }

    #[test]
    fn file_connection_switches_journal_mode() {
        let dir = tempfile::tempdir().unwrap();
        let options = ContextOptions {
            journal_mode: Some("wal".to_string()),
            ..ContextOptions::default()
        };
        let conn = open_db(dir.path().join("wal.db"), &options).unwrap();
        let mode: String = conn
            .query_row("PRAGMA journal_mode;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode, "wal");
    }

    #[test]
    fn bootstrap_reports_journal_mode_sqlite_kept() {
        let options = ContextOptions {
            journal_mode: Some("wal".to_string()),
            ..ContextOptions::default()
        };
        let conn = Connection::open_in_memory().unwrap();
        let applied = bootstrap_connection(&conn, &options).unwrap();
        assert_eq!(applied.as_deref(), Some("memory"));

        let dir = tempfile::tempdir().unwrap();
        let conn = Connection::open(dir.path().join("wal.db")).unwrap();
        let applied = bootstrap_connection(&conn, &options).unwrap();
        assert_eq!(applied.as_deref(), Some("wal"));

        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(
            bootstrap_connection(&conn, &ContextOptions::default()).unwrap(),
            None
        );
    }

    #[test]
    fn unknown_journal_mode_fails_bootstrap() {
        let options = ContextOptions {
            journal_mode: Some("turbo".to_string()),
            ..ContextOptions::default()
        };
        let err = open_db_in_memory(&options).unwrap_err();
        assert!(matches!(err, DbError::UnsupportedJournalMode(_)));
    }
}
