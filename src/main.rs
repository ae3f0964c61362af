use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

mod db;
mod models;
mod progression;
mod report;
mod timetravel;
mod variance;

use models::{Frequency, ProgressionType};
use timetravel::Snapshot;

#[derive(Parser)]
#[command(name = "metric-progress-tracker")]
#[command(about = "Project progress tracker with target curves and audit time travel", long_about = None)]
struct Cli {
    /// Recorded as the acting user on audit log entries
    #[arg(long, global = true, default_value = "cli@metric-tracker.local")]
    actor: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Define a metric and bulk-generate its reporting periods
    CreateMetric {
        #[arg(long)]
        project: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        start_date: NaiveDate,
        #[arg(long)]
        end_date: NaiveDate,
        /// weekly, monthly, or quarterly
        #[arg(long, default_value = "monthly")]
        frequency: String,
        /// linear, s-curve, exponential, or logarithmic
        #[arg(long, default_value = "linear")]
        progression: String,
        #[arg(long)]
        final_target: f64,
        #[arg(long, default_value_t = 5.0)]
        amber_tolerance: f64,
        #[arg(long, default_value_t = 10.0)]
        red_tolerance: f64,
    },
    /// Record actual progress for one period
    Record {
        #[arg(long)]
        metric: String,
        #[arg(long)]
        date: NaiveDate,
        #[arg(long)]
        complete: f64,
        #[arg(long)]
        commentary: Option<String>,
    },
    /// Change a metric's final target, rebaselining periods after the
    /// effective date
    SetTarget {
        #[arg(long)]
        metric: String,
        #[arg(long)]
        target: f64,
        #[arg(long)]
        effective: Option<NaiveDate>,
    },
    /// Delete a metric and its periods
    DeleteMetric {
        #[arg(long)]
        metric: String,
    },
    /// Show per-period variance and status for a metric
    Status {
        #[arg(long)]
        metric: String,
    },
    /// Generate a markdown progress report
    Report {
        #[arg(long)]
        metric: String,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Reconstruct a record's state as of a past timestamp
    History {
        /// metrics or metric_periods
        #[arg(long)]
        table: String,
        #[arg(long)]
        id: Uuid,
        /// ISO-8601 timestamp, e.g. 2026-02-01T00:00:00Z
        #[arg(long)]
        at: DateTime<Utc>,
    },
    /// List the audited change timestamps a historical view can step through
    Snapshots {
        /// metrics or metric_periods
        #[arg(long)]
        table: String,
    },
    /// Import period actuals from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Export all periods to a CSV file
    Export {
        #[arg(long, default_value = "periods.csv")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool, &cli.actor).await?;
            println!("Seed data inserted.");
        }
        Commands::CreateMetric {
            project,
            name,
            start_date,
            end_date,
            frequency,
            progression,
            final_target,
            amber_tolerance,
            red_tolerance,
        } => {
            let new = db::NewMetric {
                project,
                name,
                start_date,
                end_date,
                frequency: Frequency::parse(&frequency)?,
                progression_type: ProgressionType::parse(&progression),
                final_target,
                amber_tolerance,
                red_tolerance,
            };
            let (metric_id, periods) = db::create_metric(&pool, &cli.actor, &new).await?;
            println!("Created metric {metric_id} with {periods} periods.");
        }
        Commands::Record {
            metric,
            date,
            complete,
            commentary,
        } => {
            let changed = db::record_actual(
                &pool,
                &cli.actor,
                &metric,
                date,
                complete,
                commentary.as_deref(),
            )
            .await?;
            if changed {
                println!("Recorded {complete} for {metric} at {date}.");
            } else {
                println!("No change for {metric} at {date}.");
            }
        }
        Commands::SetTarget {
            metric,
            target,
            effective,
        } => {
            let effective = effective.unwrap_or_else(|| Utc::now().date_naive());
            let rebaselined = db::set_final_target(&pool, &cli.actor, &metric, target, effective).await?;
            println!("Target updated; {rebaselined} periods rebaselined after {effective}.");
        }
        Commands::DeleteMetric { metric } => {
            let periods = db::delete_metric(&pool, &cli.actor, &metric).await?;
            println!("Deleted {metric} and {periods} periods.");
        }
        Commands::Status { metric } => {
            let record = db::fetch_metric(&pool, &metric).await?;
            let periods = db::fetch_periods(&pool, record.id).await?;
            let today = Utc::now().date_naive();
            let assessments = report::assess_periods(&record, &periods, today);

            if assessments.is_empty() {
                println!("No periods generated for {metric}.");
                return Ok(());
            }

            println!(
                "{} ({} curve, target {}, tolerances amber {}% / red {}%):",
                record.name,
                record.progression_type.as_str(),
                record.final_target,
                record.amber_tolerance,
                record.red_tolerance
            );
            for line in assessments {
                println!(
                    "- {}: expected {}, complete {}, variance {:+.1} ({:.1}%) {}",
                    line.reporting_date,
                    line.expected,
                    line.complete,
                    line.variance,
                    line.variance_percent,
                    line.status
                );
            }
        }
        Commands::Report { metric, out } => {
            let record = db::fetch_metric(&pool, &metric).await?;
            let periods = db::fetch_periods(&pool, record.id).await?;
            let today = Utc::now().date_naive();
            let report = report::build_report(&record, &periods, today);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::History { table, id, at } => {
            let live = db::fetch_live_row(&pool, &table, id).await?;
            let entries = db::fetch_audit_entries(&pool, &table, Some(id)).await?;
            match timetravel::reconstruct_at(live.as_ref(), &entries, at)? {
                Snapshot::Absent => {
                    println!("{table} record {id} did not exist at {at}.");
                }
                Snapshot::Present(fields) => {
                    println!("{table} record {id} as of {at}:");
                    for (field, value) in fields {
                        println!("  {field}: {value}");
                    }
                }
            }
        }
        Commands::Snapshots { table } => {
            let entries = db::fetch_audit_entries(&pool, &table, None).await?;
            let points = timetravel::snapshot_points(&entries);

            if points.is_empty() {
                println!("No audited changes recorded for {table}.");
                return Ok(());
            }

            println!("Snapshot points for {table}:");
            for point in points {
                println!("- {point}");
            }
        }
        Commands::Import { csv } => {
            let imported = db::import_csv(&pool, &cli.actor, &csv).await?;
            println!("Imported {imported} actuals from {}.", csv.display());
        }
        Commands::Export { out } => {
            let exported = db::export_csv(&pool, &out).await?;
            println!("Exported {exported} periods to {}.", out.display());
        }
    }

    Ok(())
}
