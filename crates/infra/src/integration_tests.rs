//! Integration tests for the full sync pipeline.
//!
//! Tests: Sources → Aggregator → Reconciliation → Publisher → Destination
//!
//! Verifies:
//! - Reconciled figures land in the destination under stable ids
//! - Partial source outages drop only the failing source
//! - Every run writes exactly one audit entry and closes its sources

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::path::Path;

    use chrono::{DateTime, TimeZone, Utc};

    use cleanslate_core::{ItemKey, SourceName};
    use cleanslate_inventory::{DiagnosticKind, IdentityMap, IdentityPolicy, MovementRecord, StockSnapshot};

    use crate::config::{SyncConfig, SyncSettings};
    use crate::destination::{AuditStatus, DestinationStore, Fault, InMemoryDestination};
    use crate::source::{InMemorySource, SourceAdapter, SourceSet};
    use crate::sync::{SyncError, SyncManager};

    fn as_of() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn name(s: &str) -> SourceName {
        SourceName::parse(s).unwrap()
    }

    fn key(s: &str) -> ItemKey {
        ItemKey::parse(s).unwrap()
    }

    fn snap(item: &str, qty: f64, val: f64) -> StockSnapshot {
        let rate = if qty > 0.0 { val / qty } else { 0.0 };
        StockSnapshot::from_columns(item, Some("Hardware"), Some("Pcs"), Some(qty), Some(val), Some(rate)).unwrap()
    }

    fn change(item: &str, opening: f64, closing: f64) -> MovementRecord {
        MovementRecord::from_balances(key(item), opening, closing, as_of()).unwrap()
    }

    fn baseline_file(dir: &Path, body: &str) -> std::path::PathBuf {
        let path = dir.join("physical_baseline.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path
    }

    fn manager(
        sources: Vec<InMemorySource>,
        destination: InMemoryDestination,
        settings: SyncSettings,
    ) -> SyncManager<InMemoryDestination> {
        manager_with_policy(sources, destination, settings, IdentityPolicy::ByName)
    }

    fn manager_with_policy(
        sources: Vec<InMemorySource>,
        destination: InMemoryDestination,
        settings: SyncSettings,
        policy: IdentityPolicy,
    ) -> SyncManager<InMemoryDestination> {
        let adapters: Vec<Box<dyn SourceAdapter>> = sources
            .into_iter()
            .map(|s| Box::new(s) as Box<dyn SourceAdapter>)
            .collect();
        SyncManager::new(settings, SourceSet::Multi(adapters), destination, policy)
    }

    fn all_closed(manager: &SyncManager<InMemoryDestination>) -> bool {
        manager.sources().adapters().iter().all(|a| !a.is_open())
    }

    #[test]
    fn two_sources_reconcile_and_publish() {
        let dir = tempfile::tempdir().unwrap();
        let settings = SyncSettings {
            physical_baseline_file: Some(baseline_file(
                dir.path(),
                "item_name,physical_count,baseline_date\nWidget,20,2024-01-01\n",
            )),
            ..SyncSettings::default()
        };
        let a = InMemorySource::new(name("Company A"))
            .with_items(vec![snap("Widget", 10.0, 100.0)])
            .with_movements(vec![change("Widget", 8.0, 10.0)]);
        let b = InMemorySource::new(name("Company B"))
            .with_items(vec![snap("Widget", 5.0, 60.0), snap("Gear", 3.0, 9.0)])
            .with_movements(vec![change("Gear", 0.0, 3.0)]);
        let mut manager = manager(vec![a, b], InMemoryDestination::new(), settings);

        let report = manager.run_at(as_of()).unwrap();

        assert_eq!(report.items, 2);
        assert_eq!(report.published, 2);
        let widget = report.results.iter().find(|r| r.item == key("Widget")).unwrap();
        assert_eq!(widget.physical_baseline, 20.0);
        assert_eq!(widget.source_delta, 2.0);
        assert_eq!(widget.current_stock, 22.0);
        assert_eq!(widget.source_balance, 15.0);
        let gear = report.results.iter().find(|r| r.item == key("Gear")).unwrap();
        assert_eq!(gear.current_stock, 3.0);
        assert_eq!(report.diagnostics.count(DiagnosticKind::MissingBaseline), 1);

        let ledger = manager.destination().snapshot().unwrap();
        assert_eq!(ledger.items.len(), 2);
        let widget_id = ledger.items[&key("Widget")].id;
        assert_eq!(ledger.stock_levels[&widget_id].current_stock, 22.0);
        assert_eq!(ledger.audit_log.len(), 1);
        assert_eq!(ledger.audit_log[0].status, AuditStatus::Success);
        assert_eq!(ledger.audit_log[0].items_processed, 2);
        assert_eq!(ledger.audit_log[0].run_id, report.run_id);
        assert!(all_closed(&manager));
    }

    #[test]
    fn mapped_identity_applies_counts_keyed_by_source_names() {
        let dir = tempfile::tempdir().unwrap();
        let settings = SyncSettings {
            physical_baseline_file: Some(baseline_file(
                dir.path(),
                "item_name,physical_count,baseline_date\nGasket,7,2024-01-01\nW-1,20,2024-01-01\n",
            )),
            ..SyncSettings::default()
        };
        let mut map = IdentityMap::new();
        map.insert(None, "Widget", key("W-1")).unwrap();
        let a = InMemorySource::new(name("A"))
            .with_items(vec![snap("Widget", 10.0, 100.0), snap("Gasket", 7.0, 14.0)])
            .with_movements(vec![change("Gasket", 7.0, 6.0)]);
        let b = InMemorySource::new(name("B")).with_items(vec![snap("Widget", 5.0, 60.0)]);
        let mut manager =
            manager_with_policy(vec![a, b], InMemoryDestination::new(), settings, IdentityPolicy::Mapped(map));

        let report = manager.run_at(as_of()).unwrap();

        let gasket = report.results.iter().find(|r| r.item == key("A/Gasket")).unwrap();
        assert_eq!(gasket.physical_baseline, 7.0);
        assert_eq!(gasket.current_stock, 6.0);
        let widget = report.results.iter().find(|r| r.item == key("W-1")).unwrap();
        assert_eq!(widget.physical_baseline, 20.0);
        assert_eq!(report.diagnostics.count(DiagnosticKind::MissingBaseline), 0);
        assert_eq!(report.diagnostics.count(DiagnosticKind::UnmatchedBaseline), 0);
    }

    #[test]
    fn oversized_movement_window_still_completes_and_audits() {
        let settings = SyncSettings {
            movement_days_back: 200_000_000,
            ..SyncSettings::default()
        };
        let source = InMemorySource::new(name("A")).with_items(vec![snap("Widget", 1.0, 1.0)]);
        let mut manager = manager(vec![source], InMemoryDestination::new(), settings);

        let report = manager.run_at(as_of()).unwrap();
        assert_eq!(report.published, 1);
        let audit = &manager.destination().snapshot().unwrap().audit_log;
        assert_eq!(audit[0].status, AuditStatus::Success);
    }

    #[test]
    fn rerun_keeps_durable_ids() {
        let source = InMemorySource::new(name("A")).with_items(vec![snap("Widget", 1.0, 1.0)]);
        let mut manager = manager(vec![source], InMemoryDestination::new(), SyncSettings::default());

        manager.run_at(as_of()).unwrap();
        let first = manager.destination().snapshot().unwrap().items[&key("Widget")].id;
        manager.run_at(as_of()).unwrap();
        let ledger = manager.destination().snapshot().unwrap();

        assert_eq!(ledger.items[&key("Widget")].id, first);
        assert_eq!(ledger.stock_levels.len(), 1);
        assert_eq!(ledger.audit_log.len(), 2);
    }

    #[test]
    fn unreachable_company_is_skipped() {
        let items: Vec<StockSnapshot> = (0..5).map(|i| snap(&format!("Item {i}"), 1.0, 1.0)).collect();
        let a = InMemorySource::new(name("Company A")).with_items(items);
        let b = InMemorySource::new(name("Company B")).unreachable("connection refused");
        let mut manager = manager(vec![a, b], InMemoryDestination::new(), SyncSettings::default());

        let report = manager.run_at(as_of()).unwrap();

        assert_eq!(report.published, 5);
        assert_eq!(report.sources, vec![name("Company A")]);
        assert_eq!(report.skipped_sources, vec![name("Company B")]);
        assert_eq!(report.diagnostics.count(DiagnosticKind::SourceSkipped), 1);
        assert_eq!(manager.destination().snapshot().unwrap().audit_log[0].status, AuditStatus::Success);
    }

    #[test]
    fn strict_mode_aborts_on_any_outage() {
        let a = InMemorySource::new(name("Company A")).with_items(vec![snap("Widget", 1.0, 1.0)]);
        let b = InMemorySource::new(name("Company B")).unreachable("connection refused");
        let settings = SyncSettings {
            require_all_sources: true,
            ..SyncSettings::default()
        };
        let mut manager = manager(vec![a, b], InMemoryDestination::new(), settings);

        let err = manager.run_at(as_of()).unwrap_err();
        assert!(matches!(err, SyncError::SourcesUnreachable(ref names) if names == &vec![name("Company B")]));

        let ledger = manager.destination().snapshot().unwrap();
        assert!(ledger.items.is_empty());
        assert_eq!(ledger.audit_log[0].status, AuditStatus::Error);
        assert!(ledger.audit_log[0].error_message.as_deref().unwrap().contains("Company B"));
        assert!(all_closed(&manager));
    }

    #[test]
    fn fetch_failure_of_every_source_aborts() {
        let a = InMemorySource::new(name("A")).failing_fetch("query timed out");
        let b = InMemorySource::new(name("B")).failing_fetch("query timed out");
        let mut manager = manager(vec![a, b], InMemoryDestination::new(), SyncSettings::default());

        assert!(matches!(manager.run_at(as_of()), Err(SyncError::SourcesUnreachable(_))));
        assert!(all_closed(&manager));
    }

    #[test]
    fn empty_item_set_fails_the_run() {
        let mut manager = manager(
            vec![InMemorySource::new(name("A"))],
            InMemoryDestination::new(),
            SyncSettings::default(),
        );

        assert!(matches!(manager.run_at(as_of()), Err(SyncError::NoItems)));
        let audit = &manager.destination().snapshot().unwrap().audit_log;
        assert_eq!(audit[0].status, AuditStatus::Error);
        assert_eq!(audit[0].items_processed, 0);
    }

    #[test]
    fn rejected_writes_are_audited_as_failed() {
        let items: Vec<StockSnapshot> = (0..4).map(|i| snap(&format!("Item {i}"), 1.0, 1.0)).collect();
        let destination = InMemoryDestination::new().with_fault(Fault::RejectItems {
            after: 2,
            reason: "row limit".into(),
        });
        let mut manager = manager(
            vec![InMemorySource::new(name("A")).with_items(items)],
            destination,
            SyncSettings::default(),
        );

        let err = manager.run_at(as_of()).unwrap_err();
        assert!(matches!(err, SyncError::Publish { synced: 2, .. }));

        let audit = &manager.destination().snapshot().unwrap().audit_log;
        assert_eq!(audit[0].status, AuditStatus::Failed);
        assert_eq!(audit[0].items_processed, 2);
        assert_eq!(audit[0].error_message.as_deref(), Some("destination rejected write: row limit"));
    }

    #[test]
    fn unreachable_destination_fails_before_fetching() {
        let destination = InMemoryDestination::new().with_fault(Fault::Unreachable("dns failure".into()));
        let mut manager = manager(
            vec![InMemorySource::new(name("A")).with_items(vec![snap("Widget", 1.0, 1.0)])],
            destination,
            SyncSettings::default(),
        );

        assert!(matches!(manager.run_at(as_of()), Err(SyncError::Destination(_))));
        assert!(manager.destination().snapshot().unwrap().audit_log.is_empty());
        assert!(all_closed(&manager));
    }

    #[test]
    fn connection_check_reports_sources_and_destination() {
        let mut manager = manager(
            vec![
                InMemorySource::new(name("A")),
                InMemorySource::new(name("B")).unreachable("connection refused"),
            ],
            InMemoryDestination::new(),
            SyncSettings::default(),
        );

        let summary = manager.check_connections();
        assert_eq!(summary.sources.len(), 2);
        assert!(summary.destination_reachable);
        assert!(!summary.all_reachable());
        assert!(all_closed(&manager));
    }

    #[test]
    fn config_driven_run_over_dump_files() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("company_a.json");
        let b = dir.path().join("company_b.json");
        std::fs::write(
            &a,
            r#"{"stock_items": [
                {"name": "Widget", "parent": "Hardware", "base_units": "Pcs",
                 "opening_balance": 10, "closing_balance": 10, "closing_value": 100, "closing_rate": 10}
               ],
               "movements": [
                {"item": "Widget", "date": "2024-02-01T09:00:00", "quantity_change": -3, "voucher_type": "Sales"},
                {"item": "Widget", "date": "2023-12-01T09:00:00", "quantity_change": 2, "voucher_type": "Purchase"},
                {"item": "Widget", "date": "not-a-date", "quantity_change": 40}
               ]}"#,
        )
        .unwrap();
        std::fs::write(
            &b,
            r#"{"stock_items": [{"name": "Widget", "opening_balance": 5, "closing_balance": 5, "closing_value": 60, "closing_rate": 12},
                                {"name": "", "closing_balance": 1}]}"#,
        )
        .unwrap();
        let baseline = baseline_file(dir.path(), "item_name,physical_count,baseline_date\nWidget,20,2024-01-01\n");
        let ledger = dir.path().join("ledger.json");
        let export = dir.path().join("debug_export.json");

        let config = SyncConfig::from_json(
            &serde_json::json!({
                "sources": {
                    "mode": "multi",
                    "companies": [
                        {"name": "Company A", "location": a},
                        {"name": "Company B", "location": b}
                    ]
                },
                "destination": {"kind": "json_file", "path": ledger},
                "sync": {
                    "physical_baseline_file": baseline,
                    "movement_days_back": 365,
                    "debug_export_file": export,
                    "batch_size": 1
                }
            })
            .to_string(),
        )
        .unwrap();

        let mut manager = SyncManager::from_config(&config).unwrap();
        let report = manager.run_at(as_of()).unwrap();

        assert_eq!(report.results.len(), 1);
        let widget = &report.results[0];
        assert_eq!(widget.source_delta, -3.0);
        assert_eq!(widget.current_stock, 17.0);
        assert_eq!(widget.source_balance, 15.0);
        assert_eq!(report.diagnostics.count(DiagnosticKind::UnparseableTimestamp), 1);
        assert_eq!(report.diagnostics.count(DiagnosticKind::BlankItemName), 1);

        let written: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&ledger).unwrap()).unwrap();
        assert_eq!(written["audit_log"][0]["status"], "SUCCESS");
        assert_eq!(written["items"]["Widget"]["name"], "Widget");

        let exported: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&export).unwrap()).unwrap();
        assert_eq!(exported["export_info"]["total_items"], 1);
        assert_eq!(exported["results"][0]["current_stock"], 17.0);
    }
}
