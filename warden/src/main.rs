// warden/src/main.rs

use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Table};
use std::path::PathBuf;

use warden_core::application::{FleetScan, Gatekeeper, RunOptions};
use warden_core::domain::verdict::RunStatus;
use warden_core::infrastructure::config::GatekeeperConfig;

#[derive(Parser)]
#[command(name = "warden")]
#[command(about = "The Autonomous Data-Reliability Gatekeeper", long_about = None)]
#[command(version)]
struct Cli {
    /// Project directory (defaults to current directory)
    #[arg(long, global = true, default_value = ".")]
    project_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 🛂 Gate one data file against its table contract
    Run {
        /// Path to the landed data file (CSV, Parquet or JSON)
        file_path: PathBuf,

        /// Table the file claims to belong to
        table_name: String,
    },

    /// 🛂 Gate every table with a discoverable contract
    RunAll {
        /// Skip tables whose landing file has not changed since last scan
        #[arg(long)]
        skip_unchanged: bool,
    },

    /// 🔎 Print run history from the baseline store
    Inspect {
        /// Table to inspect
        table: String,

        /// Number of runs to show
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// 🏗️ Scaffold a gatekeeper project (directories + warden.yaml)
    Init,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG=debug warden run ... for the details
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file_path,
            table_name,
        } => {
            let start = std::time::Instant::now();
            println!("🛂 Gating '{}' for table '{}'...", file_path.display(), table_name);

            let gatekeeper = Gatekeeper::open(&cli.project_dir)?;
            let report = gatekeeper
                .run(&file_path, &table_name, RunOptions::default())
                .await?;

            print_verdict(&report);
            println!("⏱️  Finished in {:.2?}", start.elapsed());

            if !report.status.is_pass() {
                std::process::exit(1);
            }
        }

        Commands::RunAll { skip_unchanged } => {
            let gatekeeper = Gatekeeper::open(&cli.project_dir)?;
            let outcomes = FleetScan::run_all(&gatekeeper, skip_unchanged).await?;

            let mut any_failed = false;
            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_header(vec!["Table", "Status", "Detail"]);
            for outcome in &outcomes {
                match (&outcome.report, &outcome.error) {
                    (Some(report), _) => {
                        if report.status == RunStatus::Fail {
                            any_failed = true;
                        }
                        let detail = report
                            .critical_errors
                            .first()
                            .map(|e| e.message.clone())
                            .unwrap_or_else(|| format!("{} warnings", report.warnings.len()));
                        table.add_row(vec![
                            outcome.table.clone(),
                            report.status.to_string(),
                            detail,
                        ]);
                    }
                    (None, Some(error)) => {
                        table.add_row(vec![
                            outcome.table.clone(),
                            "SKIPPED".to_string(),
                            error.clone(),
                        ]);
                    }
                    (None, None) => {}
                }
            }
            println!("{table}");

            if any_failed {
                eprintln!("❌ One or more tables FAILED the gate.");
                std::process::exit(1);
            }
            println!("✨ Fleet scan complete ({} tables).", outcomes.len());
        }

        Commands::Inspect { table, limit } => {
            let gatekeeper = Gatekeeper::open(&cli.project_dir)?;
            let history = gatekeeper
                .baseline_store()
                .run_history(Some(&table), limit)
                .await?;

            if history.is_empty() {
                println!("No recorded runs for '{table}'.");
                return Ok(());
            }

            let mut out = Table::new();
            out.load_preset(UTF8_FULL);
            out.set_header(vec![
                "Run", "Timestamp", "Status", "Rows", "Quality", "Anomalies", "|z| max",
                "Duration",
            ]);
            for record in &history {
                out.add_row(vec![
                    record.run_id.to_string()[..8].to_string(),
                    record.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                    record.status.to_string(),
                    record.row_count.to_string(),
                    format!("{:.1}", record.quality_score),
                    record.anomaly_count.to_string(),
                    format!("{:.2}", record.z_score_max),
                    format!("{}ms", record.duration_ms),
                ]);
            }
            println!("{out}");
        }

        Commands::Init => {
            let root = &cli.project_dir;
            let config = GatekeeperConfig::default();
            for dir in [
                config.contracts_dir.as_str(),
                "contracts/archive",
                config.landing_dir.as_str(),
                config.staging_dir.as_str(),
                config.quarantine_dir.as_str(),
                config.reports_dir.as_str(),
                "config",
                "data/system",
            ] {
                std::fs::create_dir_all(root.join(dir))?;
            }
            let config_path = root.join("warden.yaml");
            if !config_path.exists() {
                std::fs::write(&config_path, serde_yaml::to_string(&config)?)?;
                println!("📝 Wrote {}", config_path.display());
            }
            println!("✨ Gatekeeper project initialized at {}", root.display());
        }
    }

    Ok(())
}

fn print_verdict(report: &warden_core::domain::verdict::VerdictReport) {
    match report.status {
        RunStatus::Pass => {
            println!("✅ STATUS: PASS");
            println!("All checks passed successfully!");
        }
        RunStatus::PassWithWarnings => {
            println!("⚠️  STATUS: PASS WITH WARNINGS");
            println!("Found {} warnings (non-critical):", report.warnings.len());
            for (i, warning) in report.warnings.iter().take(5).enumerate() {
                println!("  {}. {}", i + 1, warning.message);
            }
            if report.warnings.len() > 5 {
                println!("  ... and {} more", report.warnings.len() - 5);
            }
        }
        RunStatus::ContractMissing => {
            println!("📝 STATUS: CONTRACT DRAFTED");
            println!("No active contract found. A draft has been generated for review.");
        }
        RunStatus::Unchanged => {
            println!("⏭️  STATUS: UNCHANGED (smart scan)");
        }
        RunStatus::Fail => {
            println!("❌ STATUS: FAIL");
            println!("Found {} critical errors:", report.critical_errors.len());
            for (i, error) in report.critical_errors.iter().enumerate() {
                println!("  {}. {}", i + 1, error.message);
            }
        }
    }

    if !report.quarantine_indices.is_empty() {
        println!(
            "\n🔒 Flagged {} outlier rows for review",
            report.quarantine_indices.len()
        );
    }

    if let Some(health) = &report.health_indicator {
        println!(
            "\n🩺 HEALTH: {:?} ({:.0}/100) — safe to use: {}",
            health.status,
            health.score,
            if health.safe_to_use { "yes" } else { "no" }
        );
    }
}
