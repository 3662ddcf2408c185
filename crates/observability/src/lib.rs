//! Tracing/logging setup shared by the sync binary and tests.

/// Tracing configuration (filters, formats, writers).
pub mod tracing;

pub use self::tracing::{LogFormat, LogSettings, ObservabilityError, init, init_default};
