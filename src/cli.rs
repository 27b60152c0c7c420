//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use std::path::PathBuf;

/// dlchart - chart download statistics across packages
///
/// Fetches per-package yearly download statistics from a static JSON API,
/// aligns them on a shared date axis and renders daily downloads as an
/// interactive line chart.
///
/// Examples:
///   dlchart --base-url https://stats.example.com/mods
///   dlchart --base-url https://stats.example.com/mods --format json -o chart.json
///   dlchart --dry-run
///   dlchart --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Base URL of the statistics API
    ///
    /// Must serve `summary.json` and `{package}/{year}.json`.
    /// Can also be set in .dlchart.toml under [source].
    #[arg(short = 'u', long, value_name = "URL", env = "STATS_BASE_URL")]
    pub base_url: Option<String>,

    /// Output file path
    ///
    /// Default: from config, or downloads.<ext> for the chosen format
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (html, json, markdown)
    #[arg(long, default_value = "html", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Path to configuration file
    ///
    /// If not specified, looks for .dlchart.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Maximum number of packages fetched concurrently
    #[arg(long, value_name = "NUM")]
    pub concurrency: Option<usize>,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Chart title
    #[arg(long, value_name = "TEXT")]
    pub title: Option<String>,

    /// Exit with code 2 if any package's cumulative downloads decreased
    #[arg(long)]
    pub fail_on_anomaly: bool,

    /// Dry run: fetch only the manifest and list what would be fetched
    #[arg(long)]
    pub dry_run: bool,

    /// Generate a default .dlchart.toml configuration file
    #[arg(long)]
    pub init_config: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,
}

/// Output format for the chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Interactive HTML chart (default)
    #[default]
    Html,
    /// Raw chart data as JSON
    Json,
    /// Markdown summary tables
    Markdown,
}

impl OutputFormat {
    /// File extension for the default output path.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Html => "html",
            OutputFormat::Json => "json",
            OutputFormat::Markdown => "md",
        }
    }
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.concurrency == Some(0) {
            return Err("Concurrency must be at least 1".to_string());
        }

        if self.timeout == Some(0) {
            return Err("Timeout must be at least 1 second".to_string());
        }

        if let Some(ref base_url) = self.base_url {
            if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
                return Err("Base URL must start with 'http://' or 'https://'".to_string());
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    ///
    /// `config_verbose` is `[general] verbose`; `--quiet` overrides both.
    pub fn log_level(&self, config_verbose: bool) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose || config_verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
