//! Raw stock-item rows and their normalization into domain records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cleanslate_core::{ItemKey, SourceName};
use cleanslate_inventory::{
    Diagnostic, DiagnosticKind, Diagnostics, MovementCategory, MovementRecord, StockSnapshot,
    parse_timestamp,
};

/// One STOCKITEM row as exported by the accounting system.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StockItemRow {
    #[serde(default)]
    pub name: Option<String>,
    /// Stock group; becomes the item category.
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub base_units: Option<String>,
    #[serde(default)]
    pub opening_balance: Option<f64>,
    #[serde(default)]
    pub closing_balance: Option<f64>,
    #[serde(default)]
    pub closing_value: Option<f64>,
    #[serde(default)]
    pub closing_rate: Option<f64>,
}

/// One entry of a native transaction log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MovementRow {
    #[serde(default)]
    pub item: Option<String>,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub quantity_change: Option<f64>,
    #[serde(default)]
    pub billed_quantity: Option<f64>,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub voucher_type: Option<String>,
    #[serde(default)]
    pub voucher_number: Option<String>,
}

/// Per-company dump: stock items plus an optional native movement log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StockItemDump {
    #[serde(default)]
    pub stock_items: Vec<StockItemRow>,
    #[serde(default)]
    pub movements: Option<Vec<MovementRow>>,
}

/// Turn raw rows into snapshots; blank-named rows are skipped and recorded.
pub fn normalize_rows(
    source: &SourceName,
    rows: &[StockItemRow],
    diagnostics: &mut Diagnostics,
) -> Vec<StockSnapshot> {
    rows.iter()
        .enumerate()
        .filter_map(|(idx, row)| {
            let name = row.name.as_deref().unwrap_or_default();
            match StockSnapshot::from_columns(
                name,
                row.parent.as_deref(),
                row.base_units.as_deref(),
                row.closing_balance,
                row.closing_value,
                row.closing_rate,
            ) {
                Ok(snapshot) => Some(snapshot),
                Err(_) => {
                    diagnostics.record(
                        Diagnostic::new(
                            DiagnosticKind::BlankItemName,
                            format!("stock item row {} has no name; skipped", idx + 1),
                        )
                        .with_source(source),
                    );
                    None
                }
            }
        })
        .collect()
}

/// Movements implied by opening/closing balances, stamped `observed_at`.
pub fn balance_movements(rows: &[StockItemRow], observed_at: DateTime<Utc>) -> Vec<MovementRecord> {
    rows.iter()
        .filter_map(|row| {
            let item = ItemKey::parse(row.name.as_deref()?).ok()?;
            MovementRecord::from_balances(
                item,
                row.opening_balance.unwrap_or(0.0),
                row.closing_balance.unwrap_or(0.0),
                observed_at,
            )
        })
        .collect()
}

/// Native log entries on/after `since`.
///
/// Entries with unparseable dates are kept so reconciliation can report them;
/// nameless and zero-quantity entries are dropped.
pub fn native_movements(rows: &[MovementRow], since: DateTime<Utc>) -> Vec<MovementRecord> {
    let since = since.naive_utc();
    rows.iter()
        .filter_map(|row| {
            let item = ItemKey::parse(row.item.as_deref()?).ok()?;
            let change = row.quantity_change.unwrap_or(0.0);
            if change == 0.0 {
                return None;
            }
            if let Some(at) = parse_timestamp(&row.date) {
                if at < since {
                    return None;
                }
            }
            let category = match row.voucher_type.as_deref().map(str::trim) {
                Some(tag) if tag == MovementCategory::BalanceChange.label() => MovementCategory::BalanceChange,
                Some(tag) if !tag.is_empty() => MovementCategory::Other(tag.to_string()),
                _ => MovementCategory::Other("movement".to_string()),
            };
            Some(MovementRecord {
                item_code: item.as_str().to_string(),
                item,
                timestamp: row.date.clone(),
                quantity_change: change,
                billed_quantity: row.billed_quantity.unwrap_or(change.abs()),
                amount: row.amount.unwrap_or(0.0),
                category,
                voucher: row
                    .voucher_number
                    .as_deref()
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(str::to_string),
            })
        })
        .collect()
}
