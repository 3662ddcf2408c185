use std::sync::RwLock;

use cleanslate_core::DurableId;

use super::{AuditEntry, DestinationError, DestinationStore, ItemMaster, Ledger, StockLevel};

/// How an [`InMemoryDestination`] misbehaves, for tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Connection checks and every write fail.
    Unreachable(String),
    /// Connection checks and audit writes succeed; item writes fail after `after` accepted items.
    RejectItems { after: usize, reason: String },
}

/// In-memory destination for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryDestination {
    inner: RwLock<Ledger>,
    fault: Option<Fault>,
}

impl InMemoryDestination {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fault(mut self, fault: Fault) -> Self {
        self.fault = Some(fault);
        self
    }

    fn check_reachable(&self) -> Result<(), DestinationError> {
        match &self.fault {
            Some(Fault::Unreachable(reason)) => Err(DestinationError::Unreachable(reason.clone())),
            _ => Ok(()),
        }
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Ledger>, DestinationError> {
        self.inner
            .write()
            .map_err(|_| DestinationError::Storage("ledger lock poisoned".into()))
    }
}

impl DestinationStore for InMemoryDestination {
    fn check_connection(&self) -> Result<(), DestinationError> {
        self.check_reachable()
    }

    fn upsert_item(&self, master: ItemMaster) -> Result<DurableId, DestinationError> {
        self.check_reachable()?;
        let mut ledger = self.write()?;
        if let Some(Fault::RejectItems { after, reason }) = &self.fault {
            if ledger.items.len() >= *after && !ledger.items.contains_key(&master.key) {
                return Err(DestinationError::Rejected(reason.clone()));
            }
        }
        Ok(ledger.upsert_item(master))
    }

    fn upsert_stock_level(&self, level: StockLevel) -> Result<(), DestinationError> {
        self.check_reachable()?;
        self.write()?.upsert_stock_level(level);
        Ok(())
    }

    fn append_audit(&self, entry: AuditEntry) -> Result<(), DestinationError> {
        self.check_reachable()?;
        self.write()?.audit_log.push(entry);
        Ok(())
    }

    fn snapshot(&self) -> Result<Ledger, DestinationError> {
        self.inner
            .read()
            .map(|ledger| ledger.clone())
            .map_err(|_| DestinationError::Storage("ledger lock poisoned".into()))
    }
}
