//! Per-source stock snapshots and movement records.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use cleanslate_core::{DomainResult, ItemKey, SourceName};

/// Category assigned when a source leaves it blank.
pub const DEFAULT_CATEGORY: &str = "General";
/// Unit of measure assigned when a source leaves it blank.
pub const DEFAULT_UNIT: &str = "Nos";

/// Stock position of one item as reported by one source.
///
/// Quantity and valuation are passed through as reported, negative values
/// included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockSnapshot {
    pub item: ItemKey,
    /// Source-local item code.
    pub item_code: String,
    pub category: String,
    pub unit: String,
    pub quantity: f64,
    pub valuation: f64,
    pub rate: f64,
}

impl StockSnapshot {
    /// Build a snapshot from raw source columns.
    ///
    /// The item name is trimmed and doubles as the source-local code; blank
    /// category/unit fall back to [`DEFAULT_CATEGORY`] / [`DEFAULT_UNIT`].
    pub fn from_columns(
        name: &str,
        category: Option<&str>,
        unit: Option<&str>,
        quantity: Option<f64>,
        valuation: Option<f64>,
        rate: Option<f64>,
    ) -> DomainResult<Self> {
        let item = ItemKey::parse(name)?;
        Ok(Self {
            item_code: item.as_str().to_string(),
            item,
            category: or_default(category, DEFAULT_CATEGORY),
            unit: or_default(unit, DEFAULT_UNIT),
            quantity: quantity.unwrap_or(0.0),
            valuation: valuation.unwrap_or(0.0),
            rate: rate.unwrap_or(0.0),
        })
    }

    pub fn is_negative(&self) -> bool {
        self.quantity < 0.0 || self.valuation < 0.0
    }
}

pub(crate) fn or_default(value: Option<&str>, default: &str) -> String {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => default.to_string(),
    }
}

/// Kind of movement a record represents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementCategory {
    /// Derived from an opening/closing balance difference.
    BalanceChange,
    /// Sum of movements from more than one source.
    MultiSourceBalanceChange,
    /// Source-native tag (sale, transfer, ...).
    Other(String),
}

impl MovementCategory {
    pub fn label(&self) -> &str {
        match self {
            Self::BalanceChange => "Balance Change",
            Self::MultiSourceBalanceChange => "Multi-Company Balance Change",
            Self::Other(tag) => tag,
        }
    }
}

/// A signed quantity change for one item, as reported by one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementRecord {
    pub item: ItemKey,
    /// Source-local item code.
    pub item_code: String,
    /// Raw timestamp as produced by the source; parsed during reconciliation.
    pub timestamp: String,
    pub quantity_change: f64,
    pub billed_quantity: f64,
    pub amount: f64,
    pub category: MovementCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voucher: Option<String>,
}

impl MovementRecord {
    /// Derive a movement from two point-in-time balances.
    ///
    /// Returns `None` when the balances are equal: net-zero movements are
    /// never emitted.
    pub fn from_balances(
        item: ItemKey,
        opening: f64,
        closing: f64,
        observed_at: DateTime<Utc>,
    ) -> Option<Self> {
        let change = closing - opening;
        if change == 0.0 {
            return None;
        }
        Some(Self {
            item_code: item.as_str().to_string(),
            item,
            timestamp: observed_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            quantity_change: change,
            billed_quantity: change.abs(),
            amount: 0.0,
            category: MovementCategory::BalanceChange,
            voucher: None,
        })
    }
}

/// Everything one source produced for a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceBatch {
    pub source: SourceName,
    pub items: Vec<StockSnapshot>,
    pub movements: Vec<MovementRecord>,
}

impl SourceBatch {
    pub fn new(source: SourceName) -> Self {
        Self {
            source,
            items: Vec::new(),
            movements: Vec::new(),
        }
    }

    pub fn with_items(mut self, items: Vec<StockSnapshot>) -> Self {
        self.items = items;
        self
    }

    pub fn with_movements(mut self, movements: Vec<MovementRecord>) -> Self {
        self.movements = movements;
        self
    }
}

/// Result of fetching one source: its data, or why it was dropped.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceOutcome {
    Fetched(SourceBatch),
    Failed { source: SourceName, reason: String },
}

impl SourceOutcome {
    pub fn source(&self) -> &SourceName {
        match self {
            Self::Fetched(batch) => &batch.source,
            Self::Failed { source, .. } => source,
        }
    }
}
