//! dlchart - download statistics chart generator
//!
//! A CLI tool that fetches per-package download statistics from a static
//! JSON API, aggregates them on a shared date axis and renders the daily
//! downloads of every package as one interactive line chart.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (config, manifest, transport, write failure, etc.)
//!   2 - Anomalies found and --fail-on-anomaly set

mod analysis;
mod cli;
mod config;
mod fetcher;
mod models;
mod report;

use anyhow::{Context, Result};
use chrono::Utc;
use cli::{Args, OutputFormat};
use config::{Config, CONFIG_FILE};
use fetcher::{Fetcher, HttpStatsSource};
use indicatif::{ProgressBar, ProgressStyle};
use models::{Report, ReportMetadata, SummaryMap};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Config is loaded before logging so `[general] verbose` can set the level
    let config = match load_config(&args) {
        Ok(mut config) => {
            config.merge_with_args(&args);
            config
        }
        Err(e) => {
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    };

    init_logging(args.log_level(config.general.verbose));

    info!("dlchart v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    debug!("Config: {:?}", config);

    match run(args, config).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Aggregation failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .dlchart.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!("⚠️  {} already exists. Remove it first or edit it manually.", CONFIG_FILE);
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE);
    println!("   Set base_url under [source] to point at your statistics API.");
    Ok(())
}

/// Initialize logging at the given level.
fn init_logging(level: Level) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Run one aggregation and write the output. Returns exit code (0 or 2).
async fn run(args: Args, config: Config) -> Result<i32> {
    let start_time = Instant::now();

    let base_url = config.base_url()?.to_string();

    let source = HttpStatsSource::new(
        &base_url,
        Duration::from_secs(config.source.timeout_seconds),
    )
    .context("Failed to create HTTP client")?;
    let source_url = source.base_url().to_string();
    let fetcher = Fetcher::new(source, config.source.concurrency)
        .with_progress(fetch_progress_bar(args.quiet));

    if args.dry_run {
        println!("📥 Fetching manifest from {}", source_url);
        let summary_map = fetcher.fetch_summary_map().await?;
        return handle_dry_run(&summary_map);
    }

    println!(
        "📊 Fetching statistics from {} (concurrency {})...",
        source_url, config.source.concurrency
    );
    let aggregation = analysis::aggregate(&fetcher).await?;

    for anomaly in &aggregation.anomalies {
        debug!("Anomaly: {}", anomaly);
    }

    let report = Report {
        metadata: ReportMetadata {
            base_url: source_url,
            generated_at: Utc::now(),
            packages: aggregation.chart.series.len(),
            days: aggregation.chart.dates.len(),
            anomalies: aggregation.anomalies.len(),
            duration_seconds: start_time.elapsed().as_secs_f64(),
        },
        summaries: analysis::summarize(&aggregation.chart, &aggregation.anomalies),
        chart: aggregation.chart,
        anomalies: aggregation.anomalies,
    };

    let output = match args.format {
        OutputFormat::Html => report::generate_html_report(&report.chart, &config.chart)?,
        OutputFormat::Json => report::generate_json_report(&report.chart)?,
        OutputFormat::Markdown => report::generate_markdown_report(&report),
    };

    let output_path = config.output_path(args.format);
    std::fs::write(&output_path, &output)
        .with_context(|| format!("Failed to write output to {}", output_path.display()))?;

    println!("\n📈 Summary:");
    println!("   Packages: {}", report.metadata.packages);
    println!("   Days: {}", report.metadata.days);
    if let (Some(first), Some(last)) = (report.chart.dates.first(), report.chart.dates.last()) {
        println!("   Range: {} to {}", first, last);
    }
    println!("   Anomalies: {}", report.metadata.anomalies);
    println!("   Duration: {:.1}s", report.metadata.duration_seconds);
    println!("\n✅ Chart saved to: {}", output_path.display());

    if args.fail_on_anomaly && !report.anomalies.is_empty() {
        eprintln!(
            "\n⛔ {} anomalies found. Failing (exit code 2).",
            report.anomalies.len()
        );
        return Ok(2);
    }

    Ok(0)
}

/// Handle --dry-run: list the manifest and the yearly files it implies.
fn handle_dry_run(summary_map: &SummaryMap) -> Result<i32> {
    if summary_map.is_empty() {
        println!("   The manifest lists no packages.");
    } else {
        println!("   Found {} packages:\n", summary_map.len());
        for (package_id, summary) in summary_map {
            let years = summary.years();
            println!(
                "     📦 {} ({} to {}), years {}..={}",
                package_id,
                summary.start,
                summary.end,
                years.start(),
                years.end()
            );
        }
        println!(
            "\n   Days on chart axis: {}",
            analysis::generate_dates(summary_map).len()
        );
    }

    println!("\n✅ Dry run complete. No statistics were fetched.");
    Ok(0)
}

/// Load configuration from file or use defaults.
///
/// Runs before logging is initialized, so problems go to stderr directly.
fn load_config(args: &Args) -> Result<Config> {
    if let Some(ref config_path) = args.config {
        return Config::load(config_path);
    }

    match Config::load_default() {
        Ok(Some(config)) => Ok(config),
        Ok(None) => Ok(Config::default()),
        Err(e) => {
            eprintln!("⚠️  Failed to load {}: {:#}. Using defaults.", CONFIG_FILE, e);
            Ok(Config::default())
        }
    }
}

/// Progress bar for per-package fetches; hidden in quiet mode.
fn fetch_progress_bar(quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} packages")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}
