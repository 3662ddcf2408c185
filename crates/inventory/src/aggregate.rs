//! Multi-source aggregation.
//!
//! Merges every fetched source's snapshots and movements into one record per
//! unified item key. Sources are merged in the order given; output keeps
//! first-seen order so identical input always produces identical output.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::{debug, info};

use cleanslate_core::{ItemKey, SourceName};

use crate::baseline::{Baselines, PhysicalBaseline};
use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
use crate::identity::{IdentityPolicy, Resolution};
use crate::snapshot::{MovementRecord, SourceBatch, SourceOutcome};
use crate::unified::{UnifiedItem, UnifiedMovement};

/// Unified view over all sources that were fetched successfully.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Aggregated {
    /// Sources whose data was merged, in merge order.
    pub sources: Vec<SourceName>,
    /// Sources dropped because their fetch failed.
    pub skipped: Vec<SourceName>,
    pub items: Vec<UnifiedItem>,
    pub movements: Vec<UnifiedMovement>,
    /// Every fetched movement record, re-keyed to its unified item, in merge
    /// order. Reconciliation runs against these so each record keeps its own
    /// timestamp.
    pub transactions: Vec<MovementRecord>,
}

impl Aggregated {
    pub fn item(&self, key: &ItemKey) -> Option<&UnifiedItem> {
        self.items.iter().find(|i| &i.key == key)
    }

    pub fn movement(&self, key: &ItemKey) -> Option<&UnifiedMovement> {
        self.movements.iter().find(|m| &m.key == key)
    }
}

/// Merges per-source data under an [`IdentityPolicy`].
#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    policy: IdentityPolicy,
}

impl Aggregator {
    pub fn new(policy: IdentityPolicy) -> Self {
        Self { policy }
    }

    /// Aggregate items and movements of every fetched source.
    ///
    /// Failed sources are skipped with a [`DiagnosticKind::SourceSkipped`]
    /// finding; nothing they might have produced is merged.
    pub fn aggregate(&self, outcomes: &[SourceOutcome], diagnostics: &mut Diagnostics) -> Aggregated {
        let mut fetched: Vec<&SourceBatch> = Vec::with_capacity(outcomes.len());
        let mut skipped = Vec::new();

        for outcome in outcomes {
            match outcome {
                SourceOutcome::Fetched(batch) => fetched.push(batch),
                SourceOutcome::Failed { source, reason } => {
                    diagnostics.record(
                        Diagnostic::new(
                            DiagnosticKind::SourceSkipped,
                            format!("source fetch failed, contribution dropped: {reason}"),
                        )
                        .with_source(source),
                    );
                    skipped.push(source.clone());
                }
            }
        }

        let mut resolver = Resolver::new(&self.policy);
        let items = merge_items(&fetched, &mut resolver, diagnostics);
        let (movements, transactions) = merge_movements(&fetched, &mut resolver, diagnostics);

        info!(
            sources = fetched.len(),
            skipped = skipped.len(),
            items = items.len(),
            movements = movements.len(),
            "aggregated sources"
        );

        Aggregated {
            sources: fetched.iter().map(|b| b.source.clone()).collect(),
            skipped,
            items,
            movements,
            transactions,
        }
    }
}

impl Aggregator {
    /// Re-key a baseline sheet onto the unified keys of `aggregated`.
    ///
    /// A row naming a unified key is kept as is. Any other row is resolved
    /// through the identity policy for every merged source, and takes effect
    /// only when exactly one unified item matches. Rows matching no item or
    /// several are dropped with a [`DiagnosticKind::UnmatchedBaseline`] finding.
    pub fn resolve_baselines(
        &self,
        baselines: &Baselines,
        aggregated: &Aggregated,
        diagnostics: &mut Diagnostics,
    ) -> Baselines {
        let known: HashSet<&ItemKey> = aggregated.items.iter().map(|i| &i.key).collect();
        let mut rows: Vec<&PhysicalBaseline> = baselines.iter().collect();
        rows.sort_by(|a, b| a.item.cmp(&b.item));

        let mut resolved: HashMap<ItemKey, PhysicalBaseline> = HashMap::new();
        let mut pending = Vec::new();
        for row in rows {
            if known.contains(&row.item) {
                resolved.insert(row.item.clone(), row.clone());
            } else {
                pending.push(row);
            }
        }

        for row in pending {
            let mut candidates: Vec<ItemKey> = aggregated
                .sources
                .iter()
                .map(|source| self.policy.resolve(source, &row.item).into_key())
                .filter(|key| known.contains(key))
                .collect();
            candidates.sort();
            candidates.dedup();

            let problem = match candidates.as_slice() {
                [key] if !resolved.contains_key(key) => {
                    debug!(baseline = %row.item, item = %key, "baseline resolved through identity policy");
                    resolved.insert(
                        key.clone(),
                        PhysicalBaseline {
                            item: key.clone(),
                            ..row.clone()
                        },
                    );
                    continue;
                }
                [key] => format!("duplicates the count already given for '{key}'; ignored"),
                [] => "matches no item in this run; ignored".to_string(),
                several => {
                    let keys: Vec<&str> = several.iter().map(ItemKey::as_str).collect();
                    format!("matches several items ({}); ignored", keys.join(", "))
                }
            };
            diagnostics.record(
                Diagnostic::new(
                    DiagnosticKind::UnmatchedBaseline,
                    format!("physical count for '{}' {problem}", row.item),
                )
                .with_item(&row.item),
            );
        }

        resolved.into_values().collect()
    }
}

/// Resolves names once per (source, name) so unmapped findings are not repeated
/// for the movement pass.
struct Resolver<'a> {
    policy: &'a IdentityPolicy,
    flagged: HashSet<ItemKey>,
}

impl<'a> Resolver<'a> {
    fn new(policy: &'a IdentityPolicy) -> Self {
        Self {
            policy,
            flagged: HashSet::new(),
        }
    }

    fn resolve(&mut self, source: &SourceName, item: &ItemKey, diagnostics: &mut Diagnostics) -> ItemKey {
        match self.policy.resolve(source, item) {
            Resolution::Key(key) => key,
            Resolution::Unmapped(key) => {
                if self.flagged.insert(key.clone()) {
                    diagnostics.record(
                        Diagnostic::new(
                            DiagnosticKind::UnmappedIdentity,
                            format!("no identity mapping for '{item}'; kept separate as '{key}'"),
                        )
                        .with_source(source)
                        .with_item(&key),
                    );
                }
                key
            }
        }
    }
}

fn merge_items(
    batches: &[&SourceBatch],
    resolver: &mut Resolver<'_>,
    diagnostics: &mut Diagnostics,
) -> Vec<UnifiedItem> {
    let mut unified: Vec<UnifiedItem> = Vec::new();
    let mut index: HashMap<ItemKey, usize> = HashMap::new();

    for batch in batches {
        for snapshot in &batch.items {
            if snapshot.is_negative() {
                diagnostics.record(
                    Diagnostic::new(
                        DiagnosticKind::NegativeSnapshot,
                        format!(
                            "negative snapshot passed through (quantity={}, valuation={})",
                            snapshot.quantity, snapshot.valuation
                        ),
                    )
                    .with_source(&batch.source)
                    .with_item(&snapshot.item),
                );
            }

            let key = resolver.resolve(&batch.source, &snapshot.item, diagnostics);
            match index.get(&key) {
                Some(&pos) => unified[pos].absorb(&batch.source, snapshot),
                None => {
                    index.insert(key.clone(), unified.len());
                    unified.push(UnifiedItem::first_seen(key, &batch.source, snapshot));
                }
            }
        }
        debug!(source = %batch.source, items = batch.items.len(), "merged source items");
    }

    unified
}

fn merge_movements(
    batches: &[&SourceBatch],
    resolver: &mut Resolver<'_>,
    diagnostics: &mut Diagnostics,
) -> (Vec<UnifiedMovement>, Vec<MovementRecord>) {
    let mut unified: Vec<UnifiedMovement> = Vec::new();
    let mut index: HashMap<ItemKey, usize> = HashMap::new();
    let mut transactions = Vec::new();

    for batch in batches {
        for record in &batch.movements {
            let key = resolver.resolve(&batch.source, &record.item, diagnostics);
            transactions.push(MovementRecord {
                item: key.clone(),
                ..record.clone()
            });
            match index.get(&key) {
                Some(&pos) => unified[pos].absorb(&batch.source, record),
                None => {
                    index.insert(key.clone(), unified.len());
                    unified.push(UnifiedMovement::first_seen(key, &batch.source, record));
                }
            }
        }
        debug!(source = %batch.source, movements = batch.movements.len(), "merged source movements");
    }

    (unified, transactions)
}
