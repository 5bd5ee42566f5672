//! repopulse - community health charts for code repositories
//!
//! Reads a local SQLite snapshot of upstream events and prints chart data
//! for one or more repositories.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Snapshot: $XDG_DATA_HOME/repopulse/events.db (~/.local/share/repopulse/events.db)
//! - Logs: $XDG_STATE_HOME/repopulse/repopulse.log (~/.local/state/repopulse/repopulse.log)
//! - Config: $XDG_CONFIG_HOME/repopulse/config.toml (~/.config/repopulse/config.toml)

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use repopulse_core::db::Database;
use repopulse_core::{
    render_chart, ChartData, ChartRequest, Config, DatasetCache, DateFilter, Domain, Granularity,
    RepoId, SeriesPoint, SqliteProducer, Visualization,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "repopulse")]
#[command(about = "Community health charts for code repositories")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compute a chart for one or more repositories
    Chart {
        /// Chart name (see `repopulse list`)
        visualization: String,

        /// Repository id (repeat for several repositories)
        #[arg(long = "repo", required = true)]
        repos: Vec<RepoId>,

        /// Bucket interval: D, W, M or Y (default from config).
        /// Only for closure-ratio, release-frequency and issue-assignments
        #[arg(long)]
        interval: Option<String>,

        /// Only count events on or after this date (YYYY-MM-DD).
        /// Only for commit-frequency and contributors
        #[arg(long)]
        start: Option<NaiveDate>,

        /// Only count events on or before this date (YYYY-MM-DD)
        #[arg(long)]
        end: Option<NaiveDate>,

        /// Export format (json)
        #[arg(long)]
        export: Option<String>,
    },

    /// Import a JSON-lines file of events into the snapshot
    Import {
        /// Event domain (pull_requests, issues, commits, ...)
        domain: String,

        /// File with one JSON object per line
        file: PathBuf,
    },

    /// List charts and the contents of the snapshot
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load().context("failed to load configuration")?;
    let _log_guard = repopulse_core::logging::init(&config.logging).ok();

    match args.command {
        Command::Chart {
            visualization,
            repos,
            interval,
            start,
            end,
            export,
        } => {
            run_chart(
                &config,
                &visualization,
                repos,
                interval.as_deref(),
                DateFilter::new(start, end),
                export.as_deref(),
            )
            .await
        }
        Command::Import { domain, file } => run_import(&config, &domain, &file),
        Command::List => run_list(&config),
    }
}

async fn run_chart(
    config: &Config,
    visualization: &str,
    repos: Vec<RepoId>,
    interval: Option<&str>,
    filter: DateFilter,
    export: Option<&str>,
) -> Result<()> {
    let visualization: Visualization = visualization.parse()?;
    if interval.is_some() && !visualization.uses_granularity() {
        anyhow::bail!("--interval does not apply to {}", visualization);
    }
    if (filter.start.is_some() || filter.end.is_some()) && !visualization.uses_date_filter() {
        anyhow::bail!("--start/--end do not apply to {}", visualization);
    }
    let granularity = match interval {
        Some(interval) => interval.parse::<Granularity>()?,
        None => config
            .charts
            .granularity()
            .context("invalid charts.default_interval in config")?,
    };
    if let (Some(start), Some(end)) = (filter.start, filter.end) {
        if start > end {
            anyhow::bail!("--start {} is after --end {}", start, end);
        }
    }
    if !matches!(export, None | Some("json")) {
        anyhow::bail!("Unknown export format: {}. Use 'json'", export.unwrap_or_default());
    }

    let db_path = config.event_database_path();
    tracing::info!(path = %db_path.display(), chart = %visualization, "Opening snapshot");
    let producer = SqliteProducer::open(&db_path).context("failed to open event snapshot")?;
    let cache = DatasetCache::on_current_runtime(Arc::new(producer))?;

    let request = ChartRequest::new(repos, granularity).with_filter(filter);
    let chart = render_chart(&cache, visualization, &request, &config.cache.poll_policy()).await;

    match export {
        Some(_) => println!("{}", serde_json::to_string_pretty(&chart)?),
        None => print_chart(&chart),
    }

    Ok(())
}

fn print_chart(chart: &ChartData) {
    println!();
    println!("{}", chart.title());
    println!("{}", "=".repeat(chart.title().len()));

    match chart {
        ChartData::NoData { reason, .. } => {
            println!("  No data: {}", reason);
        }
        ChartData::Ready { series, .. } => {
            for s in series {
                println!();
                println!("{} ({} points)", s.name, s.len());
                for point in &s.points {
                    println!("  {}  {}", point.x, format_y(point));
                }
            }
        }
    }
    println!();
}

fn format_y(point: &SeriesPoint) -> String {
    match point.y {
        Some(y) if y.fract() == 0.0 => format!("{}", y as i64),
        Some(y) => format!("{:.3}", y),
        None => "-".to_string(),
    }
}

fn run_import(config: &Config, domain: &str, file: &Path) -> Result<()> {
    let domain: Domain = domain.parse()?;

    let db_path = config.event_database_path();
    let db = Database::open(&db_path).context("failed to open event snapshot")?;
    db.migrate().context("failed to run migrations")?;

    let summary = db
        .import_jsonl(domain, file)
        .with_context(|| format!("failed to import {}", file.display()))?;

    println!("Import complete:");
    println!("  Domain:   {}", domain);
    println!("  Imported: {}", summary.imported);
    println!("  Skipped:  {}", summary.skipped);
    for warning in summary.warnings.iter().take(10) {
        println!("  warning: {}", warning);
    }
    if summary.warnings.len() > 10 {
        println!("  ... {} more warnings", summary.warnings.len() - 10);
    }

    Ok(())
}

fn run_list(config: &Config) -> Result<()> {
    println!("Charts:");
    for viz in Visualization::all() {
        let domains: Vec<&str> = viz.domains().iter().map(|d| d.as_str()).collect();
        println!("  {:<18} {} [{}]", viz.name(), viz.title(), domains.join(", "));
    }
    println!();

    let db_path = config.event_database_path();
    if !db_path.exists() {
        println!("No snapshot at {}", db_path.display());
        println!("Run `repopulse import <domain> <file.jsonl>` to create one.");
        return Ok(());
    }

    let db = Database::open(&db_path).context("failed to open event snapshot")?;
    db.migrate().context("failed to run migrations")?;

    println!("Snapshot: {}", db_path.display());
    let summaries = db.domain_summaries()?;
    if summaries.is_empty() {
        println!("  (empty)");
    }
    for summary in &summaries {
        println!(
            "  {:<18} {:>8} records  {:>4} repos",
            summary.domain.as_str(),
            summary.records,
            summary.repos
        );
    }

    let repos = db.list_repos()?;
    if !repos.is_empty() {
        let repos: Vec<String> = repos.iter().map(|r| r.to_string()).collect();
        println!("  Repositories: {}", repos.join(", "));
    }

    let runs = db.list_import_runs(5)?;
    if !runs.is_empty() {
        println!();
        println!("Recent imports:");
        for run in runs {
            println!(
                "  {}  {:<18} {:>6} imported {:>4} skipped  {}",
                run.imported_at.format("%Y-%m-%d %H:%M"),
                run.domain.as_str(),
                run.imported,
                run.skipped,
                run.source_path
            );
        }
    }

    Ok(())
}
