//! Clean-slate reconciliation.
//!
//! `current stock = physical baseline + Σ movements on/after the baseline date`
//!
//! The engine is a pure function of its inputs: no I/O, no clock reads (the
//! caller passes `as_of`). Bad per-record data never fails a run; it is
//! defaulted or skipped and recorded in [`Diagnostics`].

use std::collections::HashMap;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::Serialize;

use cleanslate_core::{Entity, ItemKey};

use crate::baseline::Baselines;
use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
use crate::snapshot::{DEFAULT_CATEGORY, DEFAULT_UNIT, or_default};
use crate::unified::{Movement, UnifiedItem};

/// Look-back window for items that were never physically counted.
pub const DEFAULT_LOOKBACK_DAYS: i64 = 365;

/// Provenance tag stamped on results unless configured otherwise.
pub const DEFAULT_PROVENANCE: &str = "cleanslate_sync";

/// Reconciled stock of one item for one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanSlateResult {
    pub item: ItemKey,
    pub name: String,
    pub category: String,
    pub unit: String,
    /// Baseline + delta. Not clamped: negative values are surfaced as-is.
    pub current_stock: f64,
    pub physical_baseline: f64,
    /// Net source-side movement since the baseline date.
    pub source_delta: f64,
    /// The source system's own running balance, kept for variance checks.
    pub source_balance: f64,
    pub computed_at: DateTime<Utc>,
    pub provenance: String,
}

impl CleanSlateResult {
    /// Difference between the reconciled figure and the source's own balance.
    pub fn variance(&self) -> f64 {
        self.current_stock - self.source_balance
    }
}

impl Entity for CleanSlateResult {
    type Id = ItemKey;

    fn id(&self) -> &Self::Id {
        &self.item
    }
}

#[derive(Debug, Clone)]
pub struct ReconciliationEngine {
    provenance: String,
    lookback: Duration,
}

impl Default for ReconciliationEngine {
    fn default() -> Self {
        Self::new(DEFAULT_PROVENANCE)
    }
}

impl ReconciliationEngine {
    pub fn new(provenance: impl Into<String>) -> Self {
        Self {
            provenance: provenance.into(),
            lookback: Duration::days(DEFAULT_LOOKBACK_DAYS),
        }
    }

    /// Out-of-range values saturate to the widest window.
    pub fn with_lookback_days(mut self, days: i64) -> Self {
        self.lookback = Duration::try_days(days).unwrap_or(Duration::MAX);
        self
    }

    /// Reconcile every item against its baseline.
    ///
    /// One result per item, in item order. Movements for keys with no item
    /// are ignored.
    pub fn reconcile<M: Movement>(
        &self,
        items: &[UnifiedItem],
        movements: &[M],
        baselines: &Baselines,
        as_of: DateTime<Utc>,
        diagnostics: &mut Diagnostics,
    ) -> Vec<CleanSlateResult> {
        let mut by_item: HashMap<&ItemKey, Vec<&M>> = HashMap::new();
        for m in movements {
            by_item.entry(m.item_key()).or_default().push(m);
        }

        let default_cutoff = as_of
            .naive_utc()
            .checked_sub_signed(self.lookback)
            .unwrap_or(NaiveDateTime::MIN);

        items
            .iter()
            .map(|item| {
                let (physical, cutoff) = match baselines.get(&item.key) {
                    Some(b) => (b.physical_count, start_of_day(b.baseline_date)),
                    None => {
                        diagnostics.record(
                            Diagnostic::new(
                                DiagnosticKind::MissingBaseline,
                                format!(
                                    "no physical count; assuming 0 and reconciling movements since {default_cutoff}"
                                ),
                            )
                            .with_item(&item.key),
                        );
                        (0.0, default_cutoff)
                    }
                };

                let item_movements = by_item.get(&item.key).map(Vec::as_slice).unwrap_or(&[]);
                let delta = delta_since(&item.key, item_movements, cutoff, diagnostics);
                let current_stock = physical + delta;

                if current_stock < 0.0 {
                    diagnostics.record(
                        Diagnostic::new(
                            DiagnosticKind::NegativeStock,
                            format!(
                                "reconciled stock {current_stock} is negative (baseline={physical}, delta={delta})"
                            ),
                        )
                        .with_item(&item.key),
                    );
                }

                CleanSlateResult {
                    item: item.key.clone(),
                    name: item.name.clone(),
                    category: or_default(Some(&item.category), DEFAULT_CATEGORY),
                    unit: or_default(Some(&item.unit), DEFAULT_UNIT),
                    current_stock,
                    physical_baseline: physical,
                    source_delta: delta,
                    source_balance: item.quantity,
                    computed_at: as_of,
                    provenance: self.provenance.clone(),
                }
            })
            .collect()
    }
}

/// Sum of quantity changes at or after `cutoff`.
///
/// Records whose timestamp does not parse are left out of the sum.
fn delta_since<M: Movement>(
    item: &ItemKey,
    movements: &[&M],
    cutoff: NaiveDateTime,
    diagnostics: &mut Diagnostics,
) -> f64 {
    let mut delta = 0.0;
    for m in movements {
        match parse_timestamp(m.timestamp()) {
            Some(at) if at >= cutoff => delta += m.quantity_change(),
            Some(_) => {}
            None => diagnostics.record(
                Diagnostic::new(
                    DiagnosticKind::UnparseableTimestamp,
                    format!(
                        "movement of {} skipped: unparseable timestamp '{}'",
                        m.quantity_change(),
                        m.timestamp()
                    ),
                )
                .with_item(item),
            ),
        }
    }
    delta
}

fn start_of_day(date: NaiveDate) -> NaiveDateTime {
    NaiveDateTime::new(date, NaiveTime::default())
}

/// Parse a movement timestamp.
///
/// Accepts RFC 3339 (normalized to UTC), ISO date-times with `T` or a space
/// and optional fractional seconds, and bare `YYYY-MM-DD` dates.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok().map(start_of_day)
}
