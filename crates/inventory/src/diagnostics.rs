//! Per-run data-quality findings.
//!
//! Aggregation and reconciliation never fail on a bad record. They apply the
//! documented default, record a [`Diagnostic`] here and keep going. Every
//! recorded diagnostic is also logged at warning level.

use serde::Serialize;
use tracing::warn;

use cleanslate_core::{ItemKey, SourceName};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// A whole source was dropped from the run (connection check or fetch failed).
    SourceSkipped,
    /// A source row without a usable item name.
    BlankItemName,
    /// A snapshot reporting negative quantity or valuation.
    NegativeSnapshot,
    /// A name with no entry in the identity map.
    UnmappedIdentity,
    /// A movement whose timestamp could not be parsed (excluded from deltas).
    UnparseableTimestamp,
    /// An item reconciled without a physical count (baseline defaulted).
    MissingBaseline,
    /// A reconciled stock figure below zero.
    NegativeStock,
    /// The baseline file could not be loaded (baseline treated as empty).
    BaselineUnavailable,
    /// A baseline row matching no unified item, or more than one.
    UnmatchedBaseline,
}

impl core::fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            Self::SourceSkipped => "source_skipped",
            Self::BlankItemName => "blank_item_name",
            Self::NegativeSnapshot => "negative_snapshot",
            Self::UnmappedIdentity => "unmapped_identity",
            Self::UnparseableTimestamp => "unparseable_timestamp",
            Self::MissingBaseline => "missing_baseline",
            Self::NegativeStock => "negative_stock",
            Self::BaselineUnavailable => "baseline_unavailable",
            Self::UnmatchedBaseline => "unmatched_baseline",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceName>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item: Option<ItemKey>,
    pub detail: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            source: None,
            item: None,
            detail: detail.into(),
        }
    }

    pub fn with_source(mut self, source: &SourceName) -> Self {
        self.source = Some(source.clone());
        self
    }

    pub fn with_item(mut self, item: &ItemKey) -> Self {
        self.item = Some(item.clone());
        self
    }
}

/// Ordered list of findings collected during one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finding and emit it as a warning.
    pub fn record(&mut self, diagnostic: Diagnostic) {
        warn!(
            kind = %diagnostic.kind,
            source = diagnostic.source.as_ref().map(SourceName::as_str),
            item = diagnostic.item.as_ref().map(ItemKey::as_str),
            "{}",
            diagnostic.detail
        );
        self.entries.push(diagnostic);
    }

    /// Move already-recorded findings over from `other`.
    pub fn append(&mut self, other: Diagnostics) {
        self.entries.extend(other.entries);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.entries.iter().filter(|d| d.kind == kind).count()
    }

    pub fn of_kind(&self, kind: DiagnosticKind) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(move |d| d.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
