//! Tracing/logging initialization.
//!
//! `RUST_LOG`, when set, overrides the configured level. Logs go to stderr
//! unless a file is configured, so command output on stdout stays clean.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// One JSON object per event.
    #[default]
    Json,
    /// Human-readable lines.
    Text,
}

/// `logging` section of the sync configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Filter directive used when `RUST_LOG` is unset (`info`, `debug`, `cleanslate_infra=trace`, ...).
    pub level: String,
    pub format: LogFormat,
    /// Append logs to this file instead of stderr.
    pub file: Option<PathBuf>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
            file: None,
        }
    }
}

impl LogSettings {
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }

    /// Check that `level` is a valid filter directive.
    pub fn validate(&self) -> Result<(), ObservabilityError> {
        EnvFilter::try_new(&self.level)
            .map(|_| ())
            .map_err(|e| ObservabilityError::InvalidLevel {
                level: self.level.clone(),
                reason: e.to_string(),
            })
    }

    /// The filter in effect: `RUST_LOG` if set, else the configured level.
    pub fn filter(&self) -> Result<EnvFilter, ObservabilityError> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => EnvFilter::try_new(&self.level).map_err(|e| ObservabilityError::InvalidLevel {
                level: self.level.clone(),
                reason: e.to_string(),
            }),
        }
    }
}

#[derive(Debug, Error)]
pub enum ObservabilityError {
    #[error("invalid log level '{level}': {reason}")]
    InvalidLevel { level: String, reason: String },

    #[error("cannot open log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Initialize tracing/logging for the process.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init(settings: &LogSettings) -> Result<(), ObservabilityError> {
    let filter = settings.filter()?;

    let (writer, ansi) = match &settings.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| ObservabilityError::LogFile {
                    path: path.clone(),
                    source,
                })?;
            (BoxMakeWriter::new(Mutex::new(file)), false)
        }
        None => (BoxMakeWriter::new(std::io::stderr), true),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false);

    let _ = match settings.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.with_ansi(ansi).try_init(),
    };
    Ok(())
}

/// Initialize with default settings (JSON at `info`, `RUST_LOG` honored).
pub fn init_default() {
    let _ = init(&LogSettings::default());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_deserialize_with_defaults() {
        let s: LogSettings = serde_json::from_str(r#"{"level": "debug"}"#).unwrap();
        assert_eq!(s.level, "debug");
        assert_eq!(s.format, LogFormat::Json);
        assert!(s.file.is_none());

        let s: LogSettings = serde_json::from_str(r#"{"format": "text", "file": "sync.log"}"#).unwrap();
        assert_eq!(s.level, "info");
        assert_eq!(s.format, LogFormat::Text);
        assert_eq!(s.file, Some(PathBuf::from("sync.log")));
        assert_eq!(
            s,
            LogSettings::default().with_format(LogFormat::Text).with_file("sync.log")
        );
    }

    #[test]
    fn bad_level_fails_validation() {
        assert!(LogSettings::default().validate().is_ok());
        assert!(LogSettings::default().with_level("cleanslate=loudest").validate().is_err());
    }

    #[test]
    fn unopenable_log_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let settings = LogSettings::default().with_file(dir.path().join("missing").join("sync.log"));
        assert!(matches!(init(&settings), Err(ObservabilityError::LogFile { .. })));
    }

    #[test]
    fn repeated_init_is_a_no_op() {
        init_default();
        init_default();
    }
}
