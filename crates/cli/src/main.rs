//! `cleanslate` command line: sync, connectivity ping, export and config check.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};

use cleanslate_infra::export::DebugExport;
use cleanslate_infra::{SyncConfig, SyncManager, SyncReport};

#[derive(Parser, Debug)]
#[command(name = "cleanslate", version)]
#[command(about = "Reconcile accounting stock against physical counts", long_about = None)]
struct Cli {
    /// Configuration file (JSON)
    #[arg(long, short, env = "CLEANSLATE_CONFIG", default_value = "config.json", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one sync: fetch, reconcile, publish, audit
    Sync {
        /// Reconcile as of this instant (RFC 3339) instead of now
        #[arg(long, value_parser = parse_as_of)]
        as_of: Option<DateTime<Utc>>,

        /// Print the full run report as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Check connectivity of every source and the destination
    Ping,

    /// Fetch and aggregate without publishing; write the unified data as JSON
    Export {
        /// Output file. Defaults to sync.debug_export_file, else stdout.
        #[arg(long)]
        out: Option<PathBuf>,

        #[arg(long, value_parser = parse_as_of)]
        as_of: Option<DateTime<Utc>>,
    },

    /// Validate the configuration and exit
    Check,
}

fn parse_as_of(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("expected RFC 3339 timestamp: {e}"))
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let config = match SyncConfig::from_path(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            cleanslate_observability::init_default();
            tracing::error!(path = %cli.config.display(), error = %e, "configuration rejected");
            return Err(e).with_context(|| format!("loading config {}", cli.config.display()));
        }
    };
    cleanslate_observability::init(&config.logging).context("initializing logging")?;

    match cli.cmd {
        Commands::Check => {
            println!(
                "config ok: {} source(s), {:?} mode",
                config.sources.companies.len(),
                config.sources.mode
            );
            Ok(ExitCode::SUCCESS)
        }

        Commands::Ping => {
            let mut manager = SyncManager::from_config(&config)?;
            let summary = manager.check_connections();
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(if summary.all_reachable() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }

        Commands::Sync { as_of, json } => {
            let mut manager = SyncManager::from_config(&config)?;
            match manager.run_at(as_of.unwrap_or_else(Utc::now)) {
                Ok(report) => {
                    if json {
                        println!("{}", serde_json::to_string_pretty(&report)?);
                    } else {
                        print_summary(&report);
                    }
                    Ok(ExitCode::SUCCESS)
                }
                // Already logged and audited by the manager.
                Err(e) => {
                    eprintln!("sync failed: {e}");
                    Ok(ExitCode::FAILURE)
                }
            }
        }

        Commands::Export { out, as_of } => {
            let out = out.or_else(|| config.sync.debug_export_file.clone());
            match export_at(&config, as_of.unwrap_or_else(Utc::now), out.as_deref())? {
                Some(json) => println!("{json}"),
                None => {
                    if let Some(path) = &out {
                        println!("wrote {}", path.display());
                    }
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Fetch and aggregate as of `as_of`; write the export to `out`, or return
/// it as JSON when no file is given.
fn export_at(config: &SyncConfig, as_of: DateTime<Utc>, out: Option<&Path>) -> Result<Option<String>> {
    let mut manager = SyncManager::from_config(config)?;
    let (run_id, aggregated, diagnostics) = manager.export(as_of)?;
    let export = DebugExport::new(run_id, as_of, config.sync.since(as_of), &aggregated, &diagnostics);
    tracing::info!(%run_id, items = aggregated.items.len(), "export finished");

    match out {
        Some(path) => {
            export.write_to(path)?;
            Ok(None)
        }
        None => Ok(Some(export.to_json()?)),
    }
}

fn print_summary(report: &SyncReport) {
    println!(
        "run {}: published {} of {} item(s) from {} source(s)",
        report.run_id,
        report.published,
        report.items,
        report.sources.len()
    );
    if !report.skipped_sources.is_empty() {
        let names: Vec<&str> = report.skipped_sources.iter().map(|s| s.as_str()).collect();
        println!("skipped sources: {}", names.join(", "));
    }

    let mut by_kind: BTreeMap<String, usize> = BTreeMap::new();
    for diagnostic in report.diagnostics.iter() {
        *by_kind.entry(diagnostic.kind.to_string()).or_default() += 1;
    }
    for (kind, count) in by_kind {
        println!("  {kind}: {count}");
    }
}
