//! Physical-count baselines.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use cleanslate_core::{DomainError, DomainResult, ItemKey};

/// Date format used by baseline sheets.
pub const BASELINE_DATE_FORMAT: &str = "%Y-%m-%d";

/// Last trusted physical count of one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicalBaseline {
    pub item: ItemKey,
    pub physical_count: f64,
    pub baseline_date: NaiveDate,
    /// Source item code recorded alongside the count, for reference only.
    #[serde(default)]
    pub item_code: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

impl PhysicalBaseline {
    /// Validate one row of a baseline sheet.
    pub fn from_fields(
        item: &str,
        physical_count: &str,
        baseline_date: &str,
        item_code: Option<&str>,
        note: Option<&str>,
    ) -> DomainResult<Self> {
        let item = ItemKey::parse(item)?;
        let physical_count: f64 = physical_count.trim().parse().map_err(|_| {
            DomainError::validation(format!("'{item}': invalid physical_count '{physical_count}'"))
        })?;
        if !physical_count.is_finite() {
            return Err(DomainError::validation(format!(
                "'{item}': physical_count must be finite"
            )));
        }
        let baseline_date = NaiveDate::parse_from_str(baseline_date.trim(), BASELINE_DATE_FORMAT)
            .map_err(|_| {
                DomainError::validation(format!(
                    "'{item}': invalid baseline_date '{baseline_date}' (expected YYYY-MM-DD)"
                ))
            })?;

        Ok(Self {
            item,
            physical_count,
            baseline_date,
            item_code: non_blank(item_code),
            note: non_blank(note),
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

/// Baselines for one run, keyed by item.
///
/// Immutable once built; a later row for the same item replaces the earlier
/// one while building.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Baselines {
    by_item: HashMap<ItemKey, PhysicalBaseline>,
}

impl Baselines {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, item: &ItemKey) -> Option<&PhysicalBaseline> {
        self.by_item.get(item)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PhysicalBaseline> {
        self.by_item.values()
    }

    pub fn len(&self) -> usize {
        self.by_item.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_item.is_empty()
    }
}

impl FromIterator<PhysicalBaseline> for Baselines {
    fn from_iter<I: IntoIterator<Item = PhysicalBaseline>>(iter: I) -> Self {
        Self {
            by_item: iter.into_iter().map(|b| (b.item.clone(), b)).collect(),
        }
    }
}
