//! Sync configuration.
//!
//! One JSON document, loaded once and handed to each component as an explicit
//! value. [`SyncConfig::validate`] runs before any engine work.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use cleanslate_core::SourceName;
use cleanslate_inventory::DEFAULT_PROVENANCE;
use cleanslate_observability::LogSettings;

/// Upper bound for `sync.movement_days_back` (about a century).
pub const MAX_DAYS_BACK: i64 = 36_500;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceMode {
    Single,
    #[default]
    Multi,
}

/// One source ("company") descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyConfig {
    pub name: String,
    /// Where the source's data lives; for dump-backed sources, a file path.
    pub location: String,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default)]
    pub mode: SourceMode,
    #[serde(default)]
    pub companies: Vec<CompanyConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationKind {
    #[default]
    Memory,
    JsonFile,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationConfig {
    #[serde(default)]
    pub kind: DestinationKind,
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityMode {
    #[default]
    ByName,
    Mapped,
}

/// `sync` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub physical_baseline_file: Option<PathBuf>,
    pub identity_policy: IdentityMode,
    pub identity_map_file: Option<PathBuf>,
    pub batch_size: usize,
    /// How far back sources are asked for movements.
    pub movement_days_back: i64,
    pub provenance_tag: String,
    pub debug_export_file: Option<PathBuf>,
    /// Abort the run if any configured source is unreachable.
    pub require_all_sources: bool,
}

impl SyncSettings {
    /// Start of the movement window for a run at `as_of`.
    ///
    /// Saturates at the earliest representable instant.
    pub fn since(&self, as_of: DateTime<Utc>) -> DateTime<Utc> {
        Duration::try_days(self.movement_days_back)
            .and_then(|back| as_of.checked_sub_signed(back))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            physical_baseline_file: None,
            identity_policy: IdentityMode::ByName,
            identity_map_file: None,
            batch_size: 100,
            movement_days_back: 30,
            provenance_tag: DEFAULT_PROVENANCE.to_string(),
            debug_export_file: None,
            require_all_sources: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    pub sources: SourcesConfig,
    #[serde(default)]
    pub destination: DestinationConfig,
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub logging: LogSettings,
}

impl SyncConfig {
    /// Read, parse and validate a config file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    /// Parse and validate a config document.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let companies = &self.sources.companies;
        if companies.is_empty() {
            return Err(ConfigError::invalid("sources.companies must not be empty"));
        }
        if self.sources.mode == SourceMode::Single && companies.len() != 1 {
            return Err(ConfigError::invalid(format!(
                "single source mode needs exactly one company, found {}",
                companies.len()
            )));
        }

        let mut seen = HashSet::new();
        for company in companies {
            let name = SourceName::parse(&company.name)
                .map_err(|e| ConfigError::invalid(format!("company name: {e}")))?;
            if !seen.insert(name) {
                return Err(ConfigError::invalid(format!(
                    "duplicate company name '{}'",
                    company.name.trim()
                )));
            }
            if company.location.trim().is_empty() {
                return Err(ConfigError::invalid(format!(
                    "company '{}' has no location",
                    company.name.trim()
                )));
            }
            if company.timeout_secs == Some(0) {
                return Err(ConfigError::invalid(format!(
                    "company '{}': timeout_secs must be positive",
                    company.name.trim()
                )));
            }
        }

        if self.destination.kind == DestinationKind::JsonFile && self.destination.path.is_none() {
            return Err(ConfigError::invalid("json_file destination needs a path"));
        }

        let sync = &self.sync;
        if sync.batch_size == 0 {
            return Err(ConfigError::invalid("sync.batch_size must be positive"));
        }
        if !(0..=MAX_DAYS_BACK).contains(&sync.movement_days_back) {
            return Err(ConfigError::invalid(format!(
                "sync.movement_days_back must be between 0 and {MAX_DAYS_BACK}, got {}",
                sync.movement_days_back
            )));
        }
        if sync.provenance_tag.trim().is_empty() {
            return Err(ConfigError::invalid("sync.provenance_tag must not be blank"));
        }
        if sync.identity_policy == IdentityMode::Mapped && sync.identity_map_file.is_none() {
            return Err(ConfigError::invalid(
                "identity_policy 'mapped' needs sync.identity_map_file",
            ));
        }

        self.logging
            .validate()
            .map_err(|e| ConfigError::invalid(e.to_string()))?;

        Ok(())
    }
}
