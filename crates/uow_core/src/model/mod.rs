//! Entity contract shared by every repository.
//!
//! # Responsibility
//! - Describe how an entity type maps onto one SQLite table.
//! - Report field-level violations before a write is staged.
//!
//! # Invariants
//! - `Entity::COLUMNS` includes `Entity::KEY_COLUMN`.
//! - `Entity::to_values` is aligned with `Entity::COLUMNS`.

pub mod entity;
