//! Debug export of a run's unified data as pretty JSON.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use cleanslate_core::{RunId, SourceName};
use cleanslate_inventory::{Aggregated, CleanSlateResult, Diagnostics, UnifiedItem, UnifiedMovement};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("cannot write export {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot serialize export: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportInfo {
    pub sources: Vec<SourceName>,
    pub skipped_sources: Vec<SourceName>,
    pub total_items: usize,
    pub total_movements: usize,
    pub movements_from_date: NaiveDate,
}

#[derive(Debug, Clone, Serialize)]
pub struct DebugExport<'a> {
    pub export_timestamp: DateTime<Utc>,
    pub run_id: RunId,
    pub export_info: ExportInfo,
    pub items: &'a [UnifiedItem],
    pub movements: &'a [UnifiedMovement],
    /// Absent when the export is taken before reconciliation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<&'a [CleanSlateResult]>,
    pub diagnostics: &'a Diagnostics,
}

impl<'a> DebugExport<'a> {
    pub fn new(
        run_id: RunId,
        at: DateTime<Utc>,
        since: DateTime<Utc>,
        aggregated: &'a Aggregated,
        diagnostics: &'a Diagnostics,
    ) -> Self {
        Self {
            export_timestamp: at,
            run_id,
            export_info: ExportInfo {
                sources: aggregated.sources.clone(),
                skipped_sources: aggregated.skipped.clone(),
                total_items: aggregated.items.len(),
                total_movements: aggregated.movements.len(),
                movements_from_date: since.date_naive(),
            },
            items: &aggregated.items,
            movements: &aggregated.movements,
            results: None,
            diagnostics,
        }
    }

    pub fn with_results(mut self, results: &'a [CleanSlateResult]) -> Self {
        self.results = Some(results);
        self
    }

    pub fn to_json(&self) -> Result<String, ExportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_to(&self, path: &Path) -> Result<(), ExportError> {
        std::fs::write(path, self.to_json()?).map_err(|source| ExportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), items = self.export_info.total_items, "debug export written");
        Ok(())
    }
}
