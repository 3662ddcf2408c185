//! Clean-slate inventory domain.
//!
//! Pure, deterministic logic: multi-source aggregation, identity resolution
//! and baseline reconciliation. No IO, no clock reads, no storage; adapters
//! live in `cleanslate-infra`.

pub mod aggregate;
pub mod baseline;
pub mod diagnostics;
pub mod identity;
pub mod reconcile;
pub mod snapshot;
pub mod unified;

pub use aggregate::{Aggregated, Aggregator};
pub use baseline::{BASELINE_DATE_FORMAT, Baselines, PhysicalBaseline};
pub use diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
pub use identity::{IdentityMap, IdentityPolicy, Resolution};
pub use reconcile::{
    CleanSlateResult, DEFAULT_LOOKBACK_DAYS, DEFAULT_PROVENANCE, ReconciliationEngine, parse_timestamp,
};
pub use snapshot::{
    DEFAULT_CATEGORY, DEFAULT_UNIT, MovementCategory, MovementRecord, SourceBatch, SourceOutcome,
    StockSnapshot,
};
pub use unified::{
    Movement, MovementContribution, SourceContribution, UnifiedItem, UnifiedMovement, weighted_rate,
};
