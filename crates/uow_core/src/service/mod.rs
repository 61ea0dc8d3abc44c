//! Service layer: outcome-wrapping facades over repositories.
//!
//! # Responsibility
//! - Convert every repository result into a uniform `Outcome` envelope.
//! - Offer an extension point for entity-specific services.

mod entity_service;
mod outcome;

pub use entity_service::Service;
pub use outcome::{Fault, Outcome, StatusCode};
