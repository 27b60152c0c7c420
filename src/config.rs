//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.dlchart.toml` files.

use anyhow::{bail, Context, Result};
use crate::cli::{Args, OutputFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE: &str = ".dlchart.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Statistics source settings.
    #[serde(default)]
    pub source: SourceConfig,

    /// Chart presentation settings.
    #[serde(default)]
    pub chart: ChartConfig,
}

/// General application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Output file path. Unset means `downloads.<ext>` for the chosen format.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

/// File stem used when no output path is configured.
const DEFAULT_OUTPUT_STEM: &str = "downloads";

/// Where and how statistics are fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Base URL of the statistics API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Maximum number of packages fetched at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_seconds: default_timeout(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_timeout() -> u64 {
    30
}

fn default_concurrency() -> usize {
    8
}

/// Chart presentation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartConfig {
    #[serde(default = "default_title")]
    pub title: String,

    /// Chart height in pixels.
    #[serde(default = "default_height")]
    pub height: u32,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            height: default_height(),
        }
    }
}

fn default_title() -> String {
    "Downloads".to_string()
}

fn default_height() -> u32 {
    350
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        Self::load_from_dir(Path::new("."))
    }

    /// Try to load `.dlchart.toml` from a directory.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        let config_path = dir.join(CONFIG_FILE);

        if config_path.exists() {
            Ok(Some(Self::load(&config_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence, but only when explicitly provided.
    pub fn merge_with_args(&mut self, args: &Args) {
        if let Some(ref base_url) = args.base_url {
            self.source.base_url = Some(base_url.clone());
        }
        if let Some(timeout) = args.timeout {
            self.source.timeout_seconds = timeout;
        }
        if let Some(concurrency) = args.concurrency {
            self.source.concurrency = concurrency;
        }
        if let Some(ref output) = args.output {
            self.general.output = Some(output.display().to_string());
        }
        if let Some(ref title) = args.title {
            self.chart.title = title.clone();
        }

        // Flags always override
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Where the rendered output goes.
    pub fn output_path(&self, format: OutputFormat) -> PathBuf {
        match self.general.output {
            Some(ref output) => PathBuf::from(output),
            None => PathBuf::from(format!("{}.{}", DEFAULT_OUTPUT_STEM, format.extension())),
        }
    }

    /// The configured base URL, validated.
    pub fn base_url(&self) -> Result<&str> {
        let Some(base_url) = self.source.base_url.as_deref() else {
            bail!(
                "No statistics base URL configured. Pass --base-url, set STATS_BASE_URL, \
                 or add base_url under [source] in {}",
                CONFIG_FILE
            );
        };

        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            bail!("Base URL must start with 'http://' or 'https://': {}", base_url);
        }

        Ok(base_url)
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
