//! Physical-count baseline sheets (CSV).
//!
//! Header: `item_name, physical_count, baseline_date[, item_code][, notes]`.

use std::io::Read;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info, warn};

use cleanslate_core::DomainError;
use cleanslate_inventory::{Baselines, Diagnostic, DiagnosticKind, Diagnostics, PhysicalBaseline};

#[derive(Debug, Error)]
pub enum BaselineError {
    #[error("cannot open baseline file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("baseline CSV parse error at line {line}: {reason}")]
    Csv { line: u64, reason: String },

    #[error("baseline row at line {line}: {source}")]
    Row {
        line: u64,
        #[source]
        source: DomainError,
    },
}

#[derive(Debug, Deserialize)]
struct BaselineRow {
    item_name: String,
    physical_count: String,
    baseline_date: String,
    #[serde(default)]
    item_code: Option<String>,
    #[serde(default)]
    notes: Option<String>,
}

/// Parse a whole sheet; the first bad row aborts.
pub fn read_baselines<R: Read>(reader: R) -> Result<Baselines, BaselineError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut rows = Vec::new();
    for result in rdr.deserialize::<BaselineRow>() {
        let row = result.map_err(|e| BaselineError::Csv {
            line: e.position().map(|p| p.line()).unwrap_or(0),
            reason: e.to_string(),
        })?;
        // Header is line 1.
        let line = rows.len() as u64 + 2;
        let baseline = PhysicalBaseline::from_fields(
            &row.item_name,
            &row.physical_count,
            &row.baseline_date,
            row.item_code.as_deref(),
            row.notes.as_deref(),
        )
        .map_err(|source| BaselineError::Row { line, source })?;
        rows.push(baseline);
    }

    Ok(rows.into_iter().collect())
}

pub fn read_baselines_from_path(path: &Path) -> Result<Baselines, BaselineError> {
    let file = std::fs::File::open(path).map_err(|source| BaselineError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    read_baselines(file)
}

/// Load the baselines for a run.
///
/// Never fails the run: a missing file yields no baselines with a warning; an
/// unreadable or malformed file yields no baselines, an error log and a
/// [`DiagnosticKind::BaselineUnavailable`] finding.
pub fn load_baselines(path: Option<&Path>, diagnostics: &mut Diagnostics) -> Baselines {
    let Some(path) = path else {
        info!("no physical baseline file configured; every item starts from 0");
        return Baselines::new();
    };

    if !path.exists() {
        warn!(path = %path.display(), "physical baseline file not found; every item starts from 0");
        return Baselines::new();
    }

    match read_baselines_from_path(path) {
        Ok(baselines) => {
            info!(path = %path.display(), baselines = baselines.len(), "loaded physical baselines");
            baselines
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "physical baseline unusable; continuing without it");
            diagnostics.record(Diagnostic::new(
                DiagnosticKind::BaselineUnavailable,
                format!("{}: {e}", path.display()),
            ));
            Baselines::new()
        }
    }
}
