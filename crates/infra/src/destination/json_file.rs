//! Destination persisted as one pretty-printed JSON document.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use tracing::debug;

use cleanslate_core::DurableId;

use super::{AuditEntry, DestinationError, DestinationStore, ItemMaster, Ledger, StockLevel};

/// Keeps the ledger in memory and rewrites the file on [`flush`] and after
/// every audit entry.
///
/// [`flush`]: DestinationStore::flush
#[derive(Debug)]
pub struct JsonFileDestination {
    path: PathBuf,
    inner: RwLock<Ledger>,
}

impl JsonFileDestination {
    /// Open `path`, starting from an empty ledger if the file does not exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, DestinationError> {
        let path = path.into();
        let ledger = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .map_err(|e| DestinationError::Unreachable(format!("{}: {e}", path.display())))?;
            serde_json::from_str(&raw)
                .map_err(|e| DestinationError::Storage(format!("{}: {e}", path.display())))?
        } else {
            Ledger::default()
        };
        Ok(Self {
            path,
            inner: RwLock::new(ledger),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Ledger>, DestinationError> {
        self.inner
            .write()
            .map_err(|_| DestinationError::Storage("ledger lock poisoned".into()))
    }

    fn persist(&self, ledger: &Ledger) -> Result<(), DestinationError> {
        let body = serde_json::to_string_pretty(ledger).map_err(|e| DestinationError::Storage(e.to_string()))?;
        // Atomic replace.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, body)
            .and_then(|()| std::fs::rename(&tmp, &self.path))
            .map_err(|e| DestinationError::Storage(format!("{}: {e}", self.path.display())))?;
        debug!(path = %self.path.display(), items = ledger.items.len(), "ledger written");
        Ok(())
    }
}

impl DestinationStore for JsonFileDestination {
    /// The parent directory must exist.
    fn check_connection(&self) -> Result<(), DestinationError> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        if parent.is_dir() {
            Ok(())
        } else {
            Err(DestinationError::Unreachable(format!(
                "directory {} does not exist",
                parent.display()
            )))
        }
    }

    fn upsert_item(&self, master: ItemMaster) -> Result<DurableId, DestinationError> {
        Ok(self.write()?.upsert_item(master))
    }

    fn upsert_stock_level(&self, level: StockLevel) -> Result<(), DestinationError> {
        self.write()?.upsert_stock_level(level);
        Ok(())
    }

    fn append_audit(&self, entry: AuditEntry) -> Result<(), DestinationError> {
        let mut ledger = self.write()?;
        ledger.audit_log.push(entry);
        self.persist(&ledger)
    }

    fn flush(&self) -> Result<(), DestinationError> {
        let ledger = self.write()?;
        self.persist(&ledger)
    }

    fn snapshot(&self) -> Result<Ledger, DestinationError> {
        self.inner
            .read()
            .map(|ledger| ledger.clone())
            .map_err(|_| DestinationError::Storage("ledger lock poisoned".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destination::AuditStatus;
    use chrono::{TimeZone, Utc};
    use cleanslate_core::{ItemKey, RunId};

    #[test]
    fn ids_survive_a_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let master = ItemMaster {
            key: ItemKey::parse("Widget").unwrap(),
            name: "Widget".into(),
            category: "General".into(),
            unit: "Nos".into(),
            updated_at: at,
        };

        let first = {
            let store = JsonFileDestination::open(&path).unwrap();
            store.check_connection().unwrap();
            let id = store.upsert_item(master.clone()).unwrap();
            store.flush().unwrap();
            store
                .append_audit(AuditEntry {
                    run_id: RunId::new(),
                    timestamp: at,
                    items_processed: 1,
                    status: AuditStatus::Success,
                    error_message: None,
                })
                .unwrap();
            id
        };

        let reopened = JsonFileDestination::open(&path).unwrap();
        assert_eq!(reopened.upsert_item(master).unwrap(), first);
        let ledger = reopened.snapshot().unwrap();
        assert_eq!(ledger.audit_log.len(), 1);
        assert_eq!(ledger.audit_log[0].status, AuditStatus::Success);
    }

    #[test]
    fn missing_directory_fails_the_connection_check() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileDestination::open(dir.path().join("nope").join("ledger.json")).unwrap();
        assert!(matches!(store.check_connection(), Err(DestinationError::Unreachable(_))));
    }
}
