//! Infrastructure layer: config, source adapters, baseline/identity sheets,
//! destination stores and the sync run itself.

pub mod baseline_store;
pub mod config;
pub mod destination;
pub mod export;
pub mod identity_store;
pub mod publish;
pub mod source;
pub mod sync;

mod integration_tests;

pub use config::{ConfigError, SyncConfig};
pub use destination::{AuditEntry, AuditStatus, DestinationError, DestinationStore, Ledger};
pub use publish::{PublishOutcome, Publisher};
pub use source::{ConnectionReport, SourceAdapter, SourceError, SourceSet};
pub use sync::{ConnectionSummary, SyncError, SyncManager, SyncReport};
