//! Source backed by a per-company JSON dump of STOCKITEM rows.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use cleanslate_core::SourceName;
use cleanslate_inventory::{Diagnostics, MovementRecord, StockSnapshot};

use super::rows::{StockItemDump, balance_movements, native_movements, normalize_rows};
use super::{FetchWindow, SourceAdapter, SourceError};
use crate::config::{CompanyConfig, ConfigError};

/// Reads `location` on first use and serves every fetch from that read until
/// closed.
#[derive(Debug)]
pub struct JsonDumpSource {
    name: SourceName,
    path: PathBuf,
    timeout: Option<Duration>,
    dump: Option<StockItemDump>,
}

impl JsonDumpSource {
    pub fn new(name: SourceName, path: impl Into<PathBuf>) -> Self {
        Self {
            name,
            path: path.into(),
            timeout: None,
            dump: None,
        }
    }

    pub fn from_config(company: &CompanyConfig) -> Result<Self, ConfigError> {
        let name = SourceName::parse(&company.name)
            .map_err(|e| ConfigError::invalid(format!("company name: {e}")))?;
        let mut source = Self::new(name, company.location.trim());
        source.timeout = company.timeout_secs.map(Duration::from_secs);
        Ok(source)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&mut self) -> Result<&StockItemDump, SourceError> {
        if self.dump.is_none() {
            let raw = std::fs::read_to_string(&self.path).map_err(|e| {
                SourceError::unreachable(&self.name, format!("{}: {e}", self.path.display()))
            })?;
            let dump: StockItemDump = serde_json::from_str(&raw).map_err(|e| {
                SourceError::malformed(&self.name, format!("{}: {e}", self.path.display()))
            })?;
            debug!(
                source = %self.name,
                path = %self.path.display(),
                rows = dump.stock_items.len(),
                timeout_secs = self.timeout.map(|t| t.as_secs()),
                "source connected"
            );
            self.dump = Some(dump);
        }
        self.dump
            .as_ref()
            .ok_or_else(|| SourceError::unreachable(&self.name, "connection lost"))
    }
}

impl SourceAdapter for JsonDumpSource {
    fn name(&self) -> &SourceName {
        &self.name
    }

    fn check_connection(&mut self) -> Result<(), SourceError> {
        self.connect().map(|_| ())
    }

    fn fetch_items(&mut self, diagnostics: &mut Diagnostics) -> Result<Vec<StockSnapshot>, SourceError> {
        let name = self.name.clone();
        let dump = self.connect()?;
        Ok(normalize_rows(&name, &dump.stock_items, diagnostics))
    }

    /// Native log when the dump carries one, else balance differences.
    fn fetch_movements(&mut self, window: FetchWindow) -> Result<Vec<MovementRecord>, SourceError> {
        let dump = self.connect()?;
        Ok(match &dump.movements {
            Some(log) => native_movements(log, window.since),
            None => balance_movements(&dump.stock_items, window.observed_at),
        })
    }

    fn close(&mut self) {
        self.dump = None;
    }

    fn is_open(&self) -> bool {
        self.dump.is_some()
    }
}
