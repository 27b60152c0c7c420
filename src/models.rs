//! Data models for download statistics and chart output.
//!
//! This module contains the shapes returned by the statistics API
//! (summaries and daily stats) and the chart-ready structures produced
//! by the aggregator.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Known date range of statistics for one package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    /// First day with recorded statistics.
    pub start: NaiveDate,
    /// Last day with recorded statistics.
    pub end: NaiveDate,
}

impl Summary {
    /// Years covered by this summary, inclusive on both ends.
    pub fn years(&self) -> std::ops::RangeInclusive<i32> {
        use chrono::Datelike;
        self.start.year()..=self.end.year()
    }
}

/// Package id -> known statistics range.
pub type SummaryMap = BTreeMap<String, Summary>;

/// One day's recorded download count.
///
/// `downloads` is the cumulative total-to-date as reported upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stat {
    pub datetime: String,
    pub downloads: i64,
}

/// ISO date (`YYYY-MM-DD`) -> stat, one package's full time series.
pub type Stats = BTreeMap<String, Stat>;

/// Package id -> its merged time series.
pub type StatsMap = BTreeMap<String, Stats>;

/// Name of a derived metric sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Reported cumulative downloads-to-date.
    Total,
    /// Day-over-day change in the cumulative total.
    Delta,
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Total => write!(f, "total"),
            Metric::Delta => write!(f, "delta"),
        }
    }
}

/// Metric -> values aligned with the chart's date axis. `None` means no data.
pub type ChartMetricMap = BTreeMap<Metric, Vec<Option<i64>>>;

/// One package's presentation-ready series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSeries {
    /// Human readable package name.
    pub name: String,
    pub metrics: ChartMetricMap,
}

impl ChartSeries {
    /// Values for a metric, empty if the metric was never derived.
    pub fn metric(&self, metric: Metric) -> &[Option<i64>] {
        self.metrics.get(&metric).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// The final artifact handed to the renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartData {
    /// Global date axis, ascending `YYYY-MM-DD`.
    pub dates: Vec<String>,
    /// Package id -> series.
    pub series: BTreeMap<String, ChartSeries>,
}

/// A decrease in the cumulative download count between two reported days.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anomaly {
    pub package: String,
    pub date: String,
    pub previous: i64,
    pub current: i64,
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} on {}: cumulative downloads fell from {} to {}",
            self.package, self.date, self.previous, self.current
        )
    }
}

/// Result of one aggregation run.
#[derive(Debug, Clone)]
pub struct Aggregation {
    pub chart: ChartData,
    pub anomalies: Vec<Anomaly>,
}

/// Per-package digest used by the Markdown report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesSummary {
    pub package: String,
    pub name: String,
    /// First axis date with a reported total.
    pub first_date: Option<String>,
    /// Last axis date with a reported total.
    pub last_date: Option<String>,
    /// Last reported cumulative total.
    pub latest_total: Option<i64>,
    /// Sum of all non-null deltas.
    pub downloads_in_range: i64,
    /// Date and value of the largest delta.
    pub peak: Option<(String, i64)>,
    pub anomalies: usize,
}

/// Metadata about a generated report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Statistics API the data came from.
    pub base_url: String,
    pub generated_at: DateTime<Utc>,
    pub packages: usize,
    /// Length of the global date axis.
    pub days: usize,
    pub anomalies: usize,
    pub duration_seconds: f64,
}

/// Everything a renderer needs for one output file.
#[derive(Debug, Clone)]
pub struct Report {
    pub metadata: ReportMetadata,
    pub chart: ChartData,
    pub summaries: Vec<SeriesSummary>,
    pub anomalies: Vec<Anomaly>,
}
