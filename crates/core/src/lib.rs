//! `cleanslate-core` — shared building blocks.
//!
//! This crate contains **pure** primitives (identifiers, errors, entity
//! identity) used by the reconciliation domain and the infrastructure layer.

pub mod entity;
pub mod error;
pub mod id;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{DurableId, ItemKey, RunId, SourceName};
