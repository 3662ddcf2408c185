//! Batched publishing of reconciled results.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info};

use cleanslate_inventory::CleanSlateResult;

use crate::destination::{AuditEntry, DestinationError, DestinationStore, ItemMaster, StockLevel};

/// What a publish attempt achieved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishOutcome {
    pub success: bool,
    /// Results fully written (item master and stock level).
    pub synced: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Writes results to a [`DestinationStore`] in batches. No retries.
#[derive(Debug)]
pub struct Publisher<D> {
    store: D,
    batch_size: usize,
}

impl<D: DestinationStore> Publisher<D> {
    /// `batch_size` of 0 is treated as 1.
    pub fn new(store: D, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
        }
    }

    pub fn store(&self) -> &D {
        &self.store
    }

    pub fn check_connection(&self) -> Result<(), DestinationError> {
        self.store.check_connection()
    }

    /// Upsert every result, stopping at the first failed write.
    pub fn publish(&self, results: &[CleanSlateResult], at: DateTime<Utc>) -> PublishOutcome {
        let mut synced = 0;

        for (batch_no, batch) in results.chunks(self.batch_size).enumerate() {
            for result in batch {
                if let Err(e) = self.publish_one(result, at) {
                    error!(item = %result.item, synced, error = %e, "publish failed");
                    return PublishOutcome {
                        success: false,
                        synced,
                        error: Some(e.to_string()),
                    };
                }
                synced += 1;
            }
            if let Err(e) = self.store.flush() {
                error!(batch = batch_no + 1, error = %e, "flush failed");
                return PublishOutcome {
                    success: false,
                    synced,
                    error: Some(e.to_string()),
                };
            }
            info!(batch = batch_no + 1, items = batch.len(), "published batch");
        }

        info!(synced, "published all results");
        PublishOutcome {
            success: true,
            synced,
            error: None,
        }
    }

    fn publish_one(&self, result: &CleanSlateResult, at: DateTime<Utc>) -> Result<(), DestinationError> {
        let id = self.store.upsert_item(ItemMaster::from_result(result, at))?;
        self.store.upsert_stock_level(StockLevel::from_result(id, result))
    }

    /// Append an audit entry. Failures are logged, never returned.
    pub fn record_audit(&self, entry: AuditEntry) {
        let status = entry.status;
        match self.store.append_audit(entry) {
            Ok(()) => info!(%status, "audit entry written"),
            Err(e) => error!(%status, error = %e, "failed to write audit entry"),
        }
    }
}
