//! Items and movements merged across sources.

use serde::Serialize;

use cleanslate_core::{Entity, ItemKey, SourceName};

use crate::snapshot::{MovementCategory, MovementRecord, StockSnapshot};

/// What one source contributed to a [`UnifiedItem`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceContribution {
    pub source: SourceName,
    /// The source's own code for the item.
    pub item_code: String,
    pub quantity: f64,
    pub valuation: f64,
    pub rate: f64,
}

/// One logical item merged across every source that reports it.
///
/// Invariants:
/// - the sum of `sources[*].quantity` equals `quantity`
/// - `rate` is `valuation / quantity` once more than one snapshot has been
///   merged (0 when quantity is not positive)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnifiedItem {
    pub key: ItemKey,
    /// Name as first reported.
    pub name: String,
    pub category: String,
    pub unit: String,
    pub quantity: f64,
    pub valuation: f64,
    pub rate: f64,
    /// Per-source breakdown, in the order sources were merged.
    pub sources: Vec<SourceContribution>,
}

impl UnifiedItem {
    /// Start a unified record from the first snapshot seen for `key`.
    pub fn first_seen(key: ItemKey, source: &SourceName, snapshot: &StockSnapshot) -> Self {
        Self {
            key,
            name: snapshot.item.as_str().to_string(),
            category: snapshot.category.clone(),
            unit: snapshot.unit.clone(),
            quantity: snapshot.quantity,
            valuation: snapshot.valuation,
            rate: snapshot.rate,
            sources: vec![SourceContribution {
                source: source.clone(),
                item_code: snapshot.item_code.clone(),
                quantity: snapshot.quantity,
                valuation: snapshot.valuation,
                rate: snapshot.rate,
            }],
        }
    }

    /// Fold another snapshot of the same item into the running totals.
    ///
    /// Category and unit keep their first-seen values.
    pub fn absorb(&mut self, source: &SourceName, snapshot: &StockSnapshot) {
        self.quantity += snapshot.quantity;
        self.valuation += snapshot.valuation;
        self.rate = weighted_rate(self.valuation, self.quantity);

        match self.sources.iter_mut().find(|c| &c.source == source) {
            Some(existing) => {
                existing.item_code = snapshot.item_code.clone();
                existing.quantity += snapshot.quantity;
                existing.valuation += snapshot.valuation;
                existing.rate = weighted_rate(existing.valuation, existing.quantity);
            }
            None => self.sources.push(SourceContribution {
                source: source.clone(),
                item_code: snapshot.item_code.clone(),
                quantity: snapshot.quantity,
                valuation: snapshot.valuation,
                rate: snapshot.rate,
            }),
        }
    }

    /// Sum of per-source quantities (equals `quantity`).
    pub fn contributed_quantity(&self) -> f64 {
        self.sources.iter().map(|c| c.quantity).sum()
    }
}

impl Entity for UnifiedItem {
    type Id = ItemKey;

    fn id(&self) -> &Self::Id {
        &self.key
    }
}

/// Valuation per unit, or 0 when there is nothing on hand to divide by.
pub fn weighted_rate(valuation: f64, quantity: f64) -> f64 {
    if quantity > 0.0 { valuation / quantity } else { 0.0 }
}

/// What one source contributed to a [`UnifiedMovement`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MovementContribution {
    pub source: SourceName,
    pub item_code: String,
    pub quantity_change: f64,
    pub amount: f64,
}

/// Net movement of one logical item across all sources.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnifiedMovement {
    pub key: ItemKey,
    pub name: String,
    /// Timestamp of the first contributing record.
    pub timestamp: String,
    pub quantity_change: f64,
    pub billed_quantity: f64,
    pub amount: f64,
    pub category: MovementCategory,
    pub sources: Vec<MovementContribution>,
}

impl UnifiedMovement {
    pub fn first_seen(key: ItemKey, source: &SourceName, record: &MovementRecord) -> Self {
        Self {
            key,
            name: record.item.as_str().to_string(),
            timestamp: record.timestamp.clone(),
            quantity_change: record.quantity_change,
            billed_quantity: record.billed_quantity,
            amount: record.amount,
            category: MovementCategory::MultiSourceBalanceChange,
            sources: vec![MovementContribution {
                source: source.clone(),
                item_code: record.item_code.clone(),
                quantity_change: record.quantity_change,
                amount: record.amount,
            }],
        }
    }

    pub fn absorb(&mut self, source: &SourceName, record: &MovementRecord) {
        self.quantity_change += record.quantity_change;
        self.billed_quantity += record.billed_quantity;
        self.amount += record.amount;

        match self.sources.iter_mut().find(|c| &c.source == source) {
            Some(existing) => {
                existing.item_code = record.item_code.clone();
                existing.quantity_change += record.quantity_change;
                existing.amount += record.amount;
            }
            None => self.sources.push(MovementContribution {
                source: source.clone(),
                item_code: record.item_code.clone(),
                quantity_change: record.quantity_change,
                amount: record.amount,
            }),
        }
    }
}

/// Read access the reconciliation engine needs from a movement.
///
/// Implemented for raw per-source records and for unified movements, so a
/// transaction log can be reconciled without first collapsing it per item.
pub trait Movement {
    fn item_key(&self) -> &ItemKey;
    fn timestamp(&self) -> &str;
    fn quantity_change(&self) -> f64;
}

impl Movement for MovementRecord {
    fn item_key(&self) -> &ItemKey {
        &self.item
    }

    fn timestamp(&self) -> &str {
        &self.timestamp
    }

    fn quantity_change(&self) -> f64 {
        self.quantity_change
    }
}

impl Movement for UnifiedMovement {
    fn item_key(&self) -> &ItemKey {
        &self.key
    }

    fn timestamp(&self) -> &str {
        &self.timestamp
    }

    fn quantity_change(&self) -> f64 {
        self.quantity_change
    }
}
