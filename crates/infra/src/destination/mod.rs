//! Destination store for reconciled stock.
//!
//! Item master records are keyed by item identity and get a stable
//! [`DurableId`]; stock levels are keyed by that id. Every run appends one
//! audit entry.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use cleanslate_core::{DurableId, Entity, ItemKey, RunId};
use cleanslate_inventory::CleanSlateResult;

use crate::config::{DestinationConfig, DestinationKind};

pub mod in_memory;
pub mod json_file;

pub use in_memory::{Fault, InMemoryDestination};
pub use json_file::JsonFileDestination;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DestinationError {
    #[error("destination unreachable: {0}")]
    Unreachable(String),
    #[error("destination rejected write: {0}")]
    Rejected(String),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Item master record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemMaster {
    pub key: ItemKey,
    pub name: String,
    pub category: String,
    pub unit: String,
    pub updated_at: DateTime<Utc>,
}

impl ItemMaster {
    pub fn from_result(result: &CleanSlateResult, updated_at: DateTime<Utc>) -> Self {
        Self {
            key: result.id().clone(),
            name: result.name.clone(),
            category: result.category.clone(),
            unit: result.unit.clone(),
            updated_at,
        }
    }
}

/// Item master record with the id the store assigned to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredItem {
    pub id: DurableId,
    #[serde(flatten)]
    pub master: ItemMaster,
}

/// Stock-level detail of one item, keyed by its durable id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockLevel {
    pub item_id: DurableId,
    pub current_stock: f64,
    pub physical_baseline: f64,
    pub source_delta: f64,
    pub source_balance: f64,
    pub last_sync: DateTime<Utc>,
    pub sync_source: String,
}

impl StockLevel {
    pub fn from_result(item_id: DurableId, result: &CleanSlateResult) -> Self {
        Self {
            item_id,
            current_stock: result.current_stock,
            physical_baseline: result.physical_baseline,
            source_delta: result.source_delta,
            source_balance: result.source_balance,
            last_sync: result.computed_at,
            sync_source: result.provenance.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditStatus {
    /// Every result was published.
    Success,
    /// Publishing started but did not complete.
    Failed,
    /// The run stopped before publishing.
    Error,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
            Self::Error => "ERROR",
        }
    }
}

impl core::fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of the sync audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub run_id: RunId,
    pub timestamp: DateTime<Utc>,
    pub items_processed: usize,
    pub status: AuditStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Everything a destination holds. Ordered maps keep serialized output stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    #[serde(default)]
    pub items: BTreeMap<ItemKey, StoredItem>,
    #[serde(default)]
    pub stock_levels: BTreeMap<DurableId, StockLevel>,
    #[serde(default)]
    pub audit_log: Vec<AuditEntry>,
}

impl Ledger {
    /// Insert or update an item master; the id of an existing key never changes.
    pub fn upsert_item(&mut self, master: ItemMaster) -> DurableId {
        match self.items.get_mut(&master.key) {
            Some(existing) => {
                existing.master = master;
                existing.id
            }
            None => {
                let id = DurableId::new();
                self.items.insert(master.key.clone(), StoredItem { id, master });
                id
            }
        }
    }

    pub fn upsert_stock_level(&mut self, level: StockLevel) {
        self.stock_levels.insert(level.item_id, level);
    }
}

/// Destination store abstraction.
pub trait DestinationStore: Send + Sync {
    /// Check that the store answers.
    fn check_connection(&self) -> Result<(), DestinationError>;

    fn upsert_item(&self, master: ItemMaster) -> Result<DurableId, DestinationError>;

    fn upsert_stock_level(&self, level: StockLevel) -> Result<(), DestinationError>;

    fn append_audit(&self, entry: AuditEntry) -> Result<(), DestinationError>;

    /// Persist buffered writes, if the store buffers.
    fn flush(&self) -> Result<(), DestinationError> {
        Ok(())
    }

    /// Copy of the current contents.
    fn snapshot(&self) -> Result<Ledger, DestinationError>;
}

impl<S> DestinationStore for Arc<S>
where
    S: DestinationStore + ?Sized,
{
    fn check_connection(&self) -> Result<(), DestinationError> {
        (**self).check_connection()
    }

    fn upsert_item(&self, master: ItemMaster) -> Result<DurableId, DestinationError> {
        (**self).upsert_item(master)
    }

    fn upsert_stock_level(&self, level: StockLevel) -> Result<(), DestinationError> {
        (**self).upsert_stock_level(level)
    }

    fn append_audit(&self, entry: AuditEntry) -> Result<(), DestinationError> {
        (**self).append_audit(entry)
    }

    fn flush(&self) -> Result<(), DestinationError> {
        (**self).flush()
    }

    fn snapshot(&self) -> Result<Ledger, DestinationError> {
        (**self).snapshot()
    }
}

impl<S> DestinationStore for Box<S>
where
    S: DestinationStore + ?Sized,
{
    fn check_connection(&self) -> Result<(), DestinationError> {
        (**self).check_connection()
    }

    fn upsert_item(&self, master: ItemMaster) -> Result<DurableId, DestinationError> {
        (**self).upsert_item(master)
    }

    fn upsert_stock_level(&self, level: StockLevel) -> Result<(), DestinationError> {
        (**self).upsert_stock_level(level)
    }

    fn append_audit(&self, entry: AuditEntry) -> Result<(), DestinationError> {
        (**self).append_audit(entry)
    }

    fn flush(&self) -> Result<(), DestinationError> {
        (**self).flush()
    }

    fn snapshot(&self) -> Result<Ledger, DestinationError> {
        (**self).snapshot()
    }
}

/// Open the configured destination.
pub fn open_destination(config: &DestinationConfig) -> Result<Box<dyn DestinationStore>, DestinationError> {
    match (&config.kind, &config.path) {
        (DestinationKind::Memory, _) => Ok(Box::new(InMemoryDestination::new())),
        (DestinationKind::JsonFile, Some(path)) => Ok(Box::new(JsonFileDestination::open(path)?)),
        (DestinationKind::JsonFile, None) => Err(DestinationError::Unreachable(
            "json_file destination has no path".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn master(key: &str, name: &str) -> ItemMaster {
        ItemMaster {
            key: ItemKey::parse(key).unwrap(),
            name: name.to_string(),
            category: "General".into(),
            unit: "Nos".into(),
            updated_at: Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn upsert_keeps_the_durable_id() {
        let mut ledger = Ledger::default();
        let first = ledger.upsert_item(master("Widget", "Widget"));
        let again = ledger.upsert_item(master("Widget", "Widget (renamed)"));
        let other = ledger.upsert_item(master("Gear", "Gear"));

        assert_eq!(first, again);
        assert_ne!(first, other);
        assert_eq!(ledger.items.len(), 2);
        assert_eq!(ledger.items[&ItemKey::parse("Widget").unwrap()].master.name, "Widget (renamed)");
    }

    #[test]
    fn audit_status_serializes_upper_case() {
        assert_eq!(serde_json::to_string(&AuditStatus::Success).unwrap(), "\"SUCCESS\"");
        assert_eq!(AuditStatus::Failed.to_string(), "FAILED");
    }
}
