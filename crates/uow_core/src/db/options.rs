//! Connection configuration.

use super::{DbError, DbResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
const JOURNAL_MODES: &[&str] = &["delete", "truncate", "persist", "memory", "wal", "off"];

/// Options applied to every connection a persistence context opens.
///
/// Missing fields fall back to [`ContextOptions::default`] when deserialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextOptions {
    /// Enforce `FOREIGN KEY` constraints (`PRAGMA foreign_keys`).
    pub foreign_keys: bool,
    /// How long a statement waits on a locked database before failing.
    pub busy_timeout_ms: u64,
    /// Optional `PRAGMA journal_mode` value. Left untouched when `None`.
    pub journal_mode: Option<String>,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            foreign_keys: true,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: None,
        }
    }
}

impl ContextOptions {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Returns the normalized journal mode, rejecting values SQLite does not know.
    pub fn normalized_journal_mode(&self) -> DbResult<Option<&'static str>> {
        let Some(mode) = self.journal_mode.as_deref() else {
            return Ok(None);
        };
        let lowered = mode.trim().to_ascii_lowercase();
        JOURNAL_MODES
            .iter()
            .find(|known| **known == lowered)
            .map(|known| Some(*known))
            .ok_or_else(|| DbError::UnsupportedJournalMode(mode.to_string()))
    }
}
