//! Source adapters.
//!
//! A source ("company") yields stock snapshots and movement records. Sources
//! are connected lazily on first use and closed at the end of every run
//! through [`SourceSession`].

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use cleanslate_core::SourceName;
use cleanslate_inventory::{Diagnostics, MovementRecord, SourceBatch, SourceOutcome, StockSnapshot};

use crate::config::{ConfigError, SourceMode, SourcesConfig};

pub mod in_memory;
pub mod json_dump;
pub mod rows;

pub use in_memory::InMemorySource;
pub use json_dump::JsonDumpSource;
pub use rows::{MovementRow, StockItemRow, StockItemDump};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("source '{name}' unreachable: {reason}")]
    Unreachable { name: SourceName, reason: String },

    #[error("source '{name}' returned malformed data: {reason}")]
    Malformed { name: SourceName, reason: String },
}

impl SourceError {
    pub fn unreachable(name: &SourceName, reason: impl Into<String>) -> Self {
        Self::Unreachable {
            name: name.clone(),
            reason: reason.into(),
        }
    }

    pub fn malformed(name: &SourceName, reason: impl Into<String>) -> Self {
        Self::Malformed {
            name: name.clone(),
            reason: reason.into(),
        }
    }
}

/// Time bounds of one fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    /// Native movement logs are read from this instant on.
    pub since: DateTime<Utc>,
    /// Stamp for movements derived from balances.
    pub observed_at: DateTime<Utc>,
}

/// One logical source of stock data.
pub trait SourceAdapter {
    fn name(&self) -> &SourceName;

    /// Connect if needed and check that the source answers.
    fn check_connection(&mut self) -> Result<(), SourceError>;

    /// Current stock snapshots; rows that cannot be used are skipped and
    /// recorded in `diagnostics`.
    fn fetch_items(&mut self, diagnostics: &mut Diagnostics) -> Result<Vec<StockSnapshot>, SourceError>;

    fn fetch_movements(&mut self, window: FetchWindow) -> Result<Vec<MovementRecord>, SourceError>;

    /// Release the connection. Closing a closed source is a no-op.
    fn close(&mut self);

    fn is_open(&self) -> bool;
}

impl<S> SourceAdapter for Box<S>
where
    S: SourceAdapter + ?Sized,
{
    fn name(&self) -> &SourceName {
        (**self).name()
    }

    fn check_connection(&mut self) -> Result<(), SourceError> {
        (**self).check_connection()
    }

    fn fetch_items(&mut self, diagnostics: &mut Diagnostics) -> Result<Vec<StockSnapshot>, SourceError> {
        (**self).fetch_items(diagnostics)
    }

    fn fetch_movements(&mut self, window: FetchWindow) -> Result<Vec<MovementRecord>, SourceError> {
        (**self).fetch_movements(window)
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }
}

/// Connectivity status of one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionReport {
    pub source: SourceName,
    pub reachable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// The configured sources, single or multi, behind one interface.
pub enum SourceSet {
    Single(Box<dyn SourceAdapter>),
    Multi(Vec<Box<dyn SourceAdapter>>),
}

impl core::fmt::Debug for SourceSet {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let names: Vec<&str> = self.adapters().iter().map(|a| a.name().as_str()).collect();
        f.debug_struct("SourceSet")
            .field("multi", &self.is_multi())
            .field("sources", &names)
            .finish()
    }
}

impl SourceSet {
    /// Build dump-backed sources for every configured company.
    pub fn from_config(config: &SourcesConfig) -> Result<Self, ConfigError> {
        let mut adapters: Vec<Box<dyn SourceAdapter>> = Vec::with_capacity(config.companies.len());
        for company in &config.companies {
            adapters.push(Box::new(JsonDumpSource::from_config(company)?));
        }

        match config.mode {
            SourceMode::Single if adapters.len() == 1 => {
                let only = adapters.remove(0);
                Ok(Self::Single(only))
            }
            SourceMode::Single => Err(ConfigError::invalid(format!(
                "single source mode needs exactly one company, found {}",
                adapters.len()
            ))),
            SourceMode::Multi => Ok(Self::Multi(adapters)),
        }
    }

    pub fn is_multi(&self) -> bool {
        matches!(self, Self::Multi(_))
    }

    pub fn adapters(&self) -> &[Box<dyn SourceAdapter>] {
        match self {
            Self::Single(one) => std::slice::from_ref(one),
            Self::Multi(all) => all,
        }
    }

    fn adapters_mut(&mut self) -> &mut [Box<dyn SourceAdapter>] {
        match self {
            Self::Single(one) => std::slice::from_mut(one),
            Self::Multi(all) => all,
        }
    }

    pub fn names(&self) -> Vec<SourceName> {
        self.adapters().iter().map(|a| a.name().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.adapters().len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters().is_empty()
    }

    /// Check the connection of every source in order.
    pub fn check_all(&mut self) -> Vec<ConnectionReport> {
        self.adapters_mut()
            .iter_mut()
            .map(|adapter| match adapter.check_connection() {
                Ok(()) => {
                    info!(source = %adapter.name(), "source reachable");
                    ConnectionReport {
                        source: adapter.name().clone(),
                        reachable: true,
                        detail: None,
                    }
                }
                Err(e) => {
                    warn!(source = %adapter.name(), error = %e, "source unreachable");
                    ConnectionReport {
                        source: adapter.name().clone(),
                        reachable: false,
                        detail: Some(e.to_string()),
                    }
                }
            })
            .collect()
    }

    /// Fetch every source in order.
    ///
    /// Sources listed in `skip` are not contacted; they, and sources whose
    /// fetch fails, come back as [`SourceOutcome::Failed`].
    pub fn collect(
        &mut self,
        window: FetchWindow,
        skip: &HashMap<SourceName, String>,
        diagnostics: &mut Diagnostics,
    ) -> Vec<SourceOutcome> {
        self.adapters_mut()
            .iter_mut()
            .map(|adapter| {
                let source = adapter.name().clone();
                if let Some(reason) = skip.get(&source) {
                    return SourceOutcome::Failed {
                        source,
                        reason: reason.clone(),
                    };
                }
                match fetch_one(&mut **adapter, window, diagnostics) {
                    Ok(batch) => {
                        info!(
                            source = %source,
                            items = batch.items.len(),
                            movements = batch.movements.len(),
                            "fetched source"
                        );
                        SourceOutcome::Fetched(batch)
                    }
                    Err(e) => {
                        warn!(source = %source, error = %e, "source fetch failed");
                        SourceOutcome::Failed {
                            source,
                            reason: e.to_string(),
                        }
                    }
                }
            })
            .collect()
    }

    pub fn close_all(&mut self) {
        for adapter in self.adapters_mut() {
            if adapter.is_open() {
                adapter.close();
                debug!(source = %adapter.name(), "source closed");
            }
        }
    }

    /// Borrow the set for one run; every source is closed when the session
    /// is dropped.
    pub fn session(&mut self) -> SourceSession<'_> {
        SourceSession { set: self }
    }
}

fn fetch_one(
    adapter: &mut dyn SourceAdapter,
    window: FetchWindow,
    diagnostics: &mut Diagnostics,
) -> Result<SourceBatch, SourceError> {
    // Findings of a source that later fails are dropped with its data.
    let mut local = Diagnostics::new();
    let items = adapter.fetch_items(&mut local)?;
    let movements = adapter.fetch_movements(window)?;
    diagnostics.append(local);
    Ok(SourceBatch::new(adapter.name().clone())
        .with_items(items)
        .with_movements(movements))
}

/// Drop guard closing every source of a [`SourceSet`].
pub struct SourceSession<'a> {
    set: &'a mut SourceSet,
}

impl std::ops::Deref for SourceSession<'_> {
    type Target = SourceSet;

    fn deref(&self) -> &Self::Target {
        self.set
    }
}

impl std::ops::DerefMut for SourceSession<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.set
    }
}

impl Drop for SourceSession<'_> {
    fn drop(&mut self) {
        self.set.close_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn name(s: &str) -> SourceName {
        SourceName::parse(s).unwrap()
    }

    fn snap(item: &str, qty: f64) -> StockSnapshot {
        StockSnapshot::from_columns(item, None, None, Some(qty), Some(qty), Some(1.0)).unwrap()
    }

    fn window() -> FetchWindow {
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        FetchWindow {
            since: at - chrono::Duration::days(30),
            observed_at: at,
        }
    }

    fn multi() -> SourceSet {
        SourceSet::Multi(vec![
            Box::new(InMemorySource::new(name("A")).with_items(vec![snap("Widget", 1.0)])),
            Box::new(InMemorySource::new(name("B")).unreachable("connection refused")),
            Box::new(InMemorySource::new(name("C")).failing_fetch("query timed out")),
        ])
    }

    #[test]
    fn check_all_reports_each_source() {
        let mut set = multi();
        let reports = set.check_all();
        let reachable: Vec<bool> = reports.iter().map(|r| r.reachable).collect();
        assert_eq!(reachable, vec![true, false, true]);
        assert!(reports[1].detail.as_deref().unwrap().contains("connection refused"));
    }

    #[test]
    fn collect_skips_and_isolates_failures() {
        let mut set = multi();
        let skip = HashMap::from([(name("B"), "unreachable at connect".to_string())]);
        let outcomes = set.collect(window(), &skip, &mut Diagnostics::new());

        assert_eq!(outcomes.len(), 3);
        assert!(matches!(&outcomes[0], SourceOutcome::Fetched(b) if b.items.len() == 1));
        assert!(matches!(&outcomes[1], SourceOutcome::Failed { reason, .. } if reason == "unreachable at connect"));
        assert!(matches!(&outcomes[2], SourceOutcome::Failed { reason, .. } if reason.contains("timed out")));
    }

    #[test]
    fn session_closes_every_source_on_drop() {
        let mut set = multi();
        {
            let mut session = set.session();
            session.check_all();
            assert!(session.adapters()[0].is_open());
        }
        assert!(set.adapters().iter().all(|a| !a.is_open()));
    }

    #[test]
    fn single_mode_comes_from_config() {
        let config = SourcesConfig {
            mode: SourceMode::Single,
            companies: vec![crate::config::CompanyConfig {
                name: "Main".into(),
                location: "main.json".into(),
                timeout_secs: Some(5),
            }],
        };
        let set = SourceSet::from_config(&config).unwrap();
        assert!(!set.is_multi());
        assert_eq!(set.names(), vec![name("Main")]);
    }
}
