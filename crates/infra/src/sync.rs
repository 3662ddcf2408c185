//! Sync run orchestration.
//!
//! check sources → check destination → fetch → aggregate → load baselines →
//! reconcile → (debug export) → publish → audit.
//!
//! Sources are closed on every exit path and one audit entry is written per
//! run, whatever the outcome.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn};

use cleanslate_core::{RunId, SourceName};
use cleanslate_inventory::{
    Aggregated, Aggregator, CleanSlateResult, Diagnostics, IdentityPolicy, ReconciliationEngine,
    SourceOutcome,
};

use crate::baseline_store::load_baselines;
use crate::config::{ConfigError, IdentityMode, SyncConfig, SyncSettings};
use crate::destination::{AuditEntry, AuditStatus, DestinationError, DestinationStore, open_destination};
use crate::export::DebugExport;
use crate::identity_store::load_identity_map;
use crate::publish::Publisher;
use crate::source::{ConnectionReport, FetchWindow, SourceError, SourceSet};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("cannot connect to sources: {}", join_names(.0))]
    SourcesUnreachable(Vec<SourceName>),

    #[error(transparent)]
    Destination(#[from] DestinationError),

    #[error("no stock items found in any source")]
    NoItems,

    #[error("publish failed after {synced} items: {reason}")]
    Publish { synced: usize, reason: String },
}

fn join_names(names: &[SourceName]) -> String {
    names.iter().map(SourceName::as_str).collect::<Vec<_>>().join(", ")
}

/// Summary of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub run_id: RunId,
    pub as_of: DateTime<Utc>,
    pub sources: Vec<SourceName>,
    pub skipped_sources: Vec<SourceName>,
    pub items: usize,
    pub movements: usize,
    pub published: usize,
    pub results: Vec<CleanSlateResult>,
    pub diagnostics: Diagnostics,
}

/// Connectivity of everything a run talks to.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionSummary {
    pub sources: Vec<ConnectionReport>,
    pub destination_reachable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_detail: Option<String>,
}

impl ConnectionSummary {
    pub fn all_reachable(&self) -> bool {
        self.destination_reachable && self.sources.iter().all(|r| r.reachable)
    }
}

/// Runs the sync pipeline over one [`SourceSet`] and one destination.
#[derive(Debug)]
pub struct SyncManager<D> {
    settings: SyncSettings,
    sources: SourceSet,
    publisher: Publisher<D>,
    aggregator: Aggregator,
    engine: ReconciliationEngine,
}

impl SyncManager<Box<dyn DestinationStore>> {
    /// Wire sources, destination and identity policy from configuration.
    pub fn from_config(config: &SyncConfig) -> Result<Self, SyncError> {
        config.validate()?;
        let sources = SourceSet::from_config(&config.sources)?;
        let destination = open_destination(&config.destination)?;
        let policy = match (config.sync.identity_policy, &config.sync.identity_map_file) {
            (IdentityMode::Mapped, Some(path)) => IdentityPolicy::Mapped(load_identity_map(path)?),
            (IdentityMode::Mapped, None) => {
                return Err(ConfigError::Invalid("identity_policy 'mapped' needs sync.identity_map_file".into()).into());
            }
            (IdentityMode::ByName, _) => IdentityPolicy::ByName,
        };
        Ok(Self::new(config.sync.clone(), sources, destination, policy))
    }
}

impl<D: DestinationStore> SyncManager<D> {
    pub fn new(settings: SyncSettings, sources: SourceSet, destination: D, policy: IdentityPolicy) -> Self {
        let engine = ReconciliationEngine::new(settings.provenance_tag.clone());
        Self {
            publisher: Publisher::new(destination, settings.batch_size),
            settings,
            sources,
            aggregator: Aggregator::new(policy),
            engine,
        }
    }

    pub fn destination(&self) -> &D {
        self.publisher.store()
    }

    pub fn sources(&self) -> &SourceSet {
        &self.sources
    }

    /// Check every source and the destination without fetching anything.
    pub fn check_connections(&mut self) -> ConnectionSummary {
        let mut session = self.sources.session();
        let sources = session.check_all();
        let destination = self.publisher.check_connection();
        if let Err(e) = &destination {
            warn!(error = %e, "destination unreachable");
        }
        ConnectionSummary {
            sources,
            destination_reachable: destination.is_ok(),
            destination_detail: destination.err().map(|e| e.to_string()),
        }
    }

    /// Fetch and aggregate only, for offline inspection.
    pub fn export(&mut self, as_of: DateTime<Utc>) -> Result<(RunId, Aggregated, Diagnostics), SyncError> {
        let run_id = RunId::new();
        let span = info_span!("export_run", %run_id);
        let _entered = span.enter();

        let mut diagnostics = Diagnostics::new();
        let aggregated = self.fetch_and_aggregate(as_of, &mut diagnostics, false)?;
        Ok((run_id, aggregated, diagnostics))
    }

    pub fn run(&mut self) -> Result<SyncReport, SyncError> {
        self.run_at(Utc::now())
    }

    /// Run the whole pipeline as of `as_of` and write the audit entry.
    pub fn run_at(&mut self, as_of: DateTime<Utc>) -> Result<SyncReport, SyncError> {
        let run_id = RunId::new();
        let span = info_span!("sync_run", %run_id);
        let _entered = span.enter();
        info!(%as_of, "starting sync run");

        let outcome = self.execute(run_id, as_of);

        let entry = match &outcome {
            Ok(report) => {
                info!(
                    published = report.published,
                    diagnostics = report.diagnostics.len(),
                    "sync run completed"
                );
                AuditEntry {
                    run_id,
                    timestamp: Utc::now(),
                    items_processed: report.published,
                    status: AuditStatus::Success,
                    error_message: None,
                }
            }
            Err(SyncError::Publish { synced, reason }) => {
                error!(synced, %reason, "sync run failed while publishing");
                AuditEntry {
                    run_id,
                    timestamp: Utc::now(),
                    items_processed: *synced,
                    status: AuditStatus::Failed,
                    error_message: Some(reason.clone()),
                }
            }
            Err(e) => {
                error!(error = %e, "sync run failed");
                AuditEntry {
                    run_id,
                    timestamp: Utc::now(),
                    items_processed: 0,
                    status: AuditStatus::Error,
                    error_message: Some(e.to_string()),
                }
            }
        };
        self.publisher.record_audit(entry);

        outcome
    }

    fn execute(&mut self, run_id: RunId, as_of: DateTime<Utc>) -> Result<SyncReport, SyncError> {
        let mut diagnostics = Diagnostics::new();

        let aggregated = self.fetch_and_aggregate(as_of, &mut diagnostics, true)?;
        if aggregated.items.is_empty() {
            return Err(SyncError::NoItems);
        }

        let sheet = load_baselines(self.settings.physical_baseline_file.as_deref(), &mut diagnostics);
        let baselines = self.aggregator.resolve_baselines(&sheet, &aggregated, &mut diagnostics);
        let results = self.engine.reconcile(
            &aggregated.items,
            &aggregated.transactions,
            &baselines,
            as_of,
            &mut diagnostics,
        );
        info!(results = results.len(), baselines = baselines.len(), "reconciled stock");

        if let Some(path) = &self.settings.debug_export_file {
            let export = DebugExport::new(run_id, as_of, self.settings.since(as_of), &aggregated, &diagnostics)
                .with_results(&results);
            if let Err(e) = export.write_to(path) {
                warn!(error = %e, "debug export failed; continuing");
            }
        }

        let outcome = self.publisher.publish(&results, as_of);
        if !outcome.success {
            return Err(SyncError::Publish {
                synced: outcome.synced,
                reason: outcome.error.unwrap_or_else(|| "unknown publish failure".into()),
            });
        }

        Ok(SyncReport {
            run_id,
            as_of,
            sources: aggregated.sources,
            skipped_sources: aggregated.skipped,
            items: aggregated.items.len(),
            movements: aggregated.movements.len(),
            published: outcome.synced,
            results,
            diagnostics,
        })
    }

    /// Check connections, fetch and aggregate. Sources are closed before returning.
    fn fetch_and_aggregate(
        &mut self,
        as_of: DateTime<Utc>,
        diagnostics: &mut Diagnostics,
        check_destination: bool,
    ) -> Result<Aggregated, SyncError> {
        let window = FetchWindow {
            since: self.settings.since(as_of),
            observed_at: as_of,
        };
        let require_all = self.settings.require_all_sources;

        let mut session = self.sources.session();
        let reports = session.check_all();
        let skip = unreachable_sources(&reports, session.is_multi(), require_all)?;
        if check_destination {
            self.publisher.check_connection()?;
        }
        info!(sources = reports.len() - skip.len(), skipped = skip.len(), "connections verified");

        let outcomes = session.collect(window, &skip, diagnostics);
        drop(session);

        let failed: Vec<&SourceOutcome> = outcomes
            .iter()
            .filter(|o| matches!(o, SourceOutcome::Failed { .. }))
            .collect();
        if let Some(SourceOutcome::Failed { source, reason }) = failed.first() {
            if failed.len() == outcomes.len() || require_all {
                if outcomes.len() == 1 {
                    return Err(SourceError::unreachable(source, reason.clone()).into());
                }
                return Err(SyncError::SourcesUnreachable(
                    failed.iter().map(|o| o.source().clone()).collect(),
                ));
            }
        }

        let aggregated = self.aggregator.aggregate(&outcomes, diagnostics);
        debug!(transactions = aggregated.transactions.len(), "aggregated transactions");
        Ok(aggregated)
    }
}

/// Decide which sources a run proceeds without.
///
/// Single mode and strict mode need every source; otherwise a run continues
/// while at least one source answers.
fn unreachable_sources(
    reports: &[ConnectionReport],
    multi: bool,
    require_all: bool,
) -> Result<HashMap<SourceName, String>, SyncError> {
    let down: Vec<&ConnectionReport> = reports.iter().filter(|r| !r.reachable).collect();
    if down.is_empty() {
        return Ok(HashMap::new());
    }

    if !multi {
        let report = down[0];
        return Err(SourceError::unreachable(
            &report.source,
            report.detail.clone().unwrap_or_else(|| "connection check failed".into()),
        )
        .into());
    }
    if require_all || down.len() == reports.len() {
        return Err(SyncError::SourcesUnreachable(down.iter().map(|r| r.source.clone()).collect()));
    }

    for r in &down {
        warn!(source = %r.source, "continuing without unreachable source");
    }
    Ok(down
        .into_iter()
        .map(|r| {
            let reason = r.detail.clone().unwrap_or_else(|| "connection check failed".into());
            (r.source.clone(), reason)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(name: &str, reachable: bool) -> ConnectionReport {
        ConnectionReport {
            source: SourceName::parse(name).unwrap(),
            reachable,
            detail: (!reachable).then(|| "connection refused".to_string()),
        }
    }

    #[test]
    fn partial_outage_skips_only_the_down_sources() {
        let reports = vec![report("A", true), report("B", false)];
        let skip = unreachable_sources(&reports, true, false).unwrap();
        assert_eq!(skip.len(), 1);
        assert!(skip.contains_key(&SourceName::parse("B").unwrap()));
    }

    #[test]
    fn strict_mode_and_total_outage_abort() {
        let partial = vec![report("A", true), report("B", false)];
        assert!(matches!(
            unreachable_sources(&partial, true, true),
            Err(SyncError::SourcesUnreachable(names)) if names.len() == 1
        ));

        let total = vec![report("A", false), report("B", false)];
        let err = unreachable_sources(&total, true, false).unwrap_err();
        assert_eq!(err.to_string(), "cannot connect to sources: A, B");
    }

    #[test]
    fn single_source_down_is_fatal() {
        let reports = vec![report("Main", false)];
        assert!(matches!(
            unreachable_sources(&reports, false, false),
            Err(SyncError::Source(SourceError::Unreachable { .. }))
        ));
    }
}
