//! Retrieval of raw download statistics.
//!
//! A [`StatsSource`] knows how to fetch the summary manifest and single
//! yearly blocks. The [`Fetcher`] drives a source: it walks each package's
//! years in order, merges the blocks, and fans out across packages.

pub mod error;
pub mod http;

pub use error::{FetchError, Result};
pub use http::HttpStatsSource;

use crate::models::{Stats, StatsMap, Summary, SummaryMap};
use futures::stream::{self, StreamExt, TryStreamExt};
use indicatif::ProgressBar;
use std::future::Future;
use tracing::{debug, info};

/// Outcome of fetching one yearly block.
#[derive(Debug, Clone, PartialEq)]
pub enum YearlyStats {
    Found(Stats),
    /// The source has no data for that year. Ends the year walk.
    NotFound,
}

/// A remote statistics API.
pub trait StatsSource: Send + Sync {
    /// Fetch the manifest of every package's date range.
    fn fetch_summary_map(&self) -> impl Future<Output = Result<SummaryMap>> + Send;

    /// Fetch one year of a package's statistics.
    fn fetch_yearly_stats(
        &self,
        package_id: &str,
        year: i32,
    ) -> impl Future<Output = Result<YearlyStats>> + Send;
}

/// Drives a [`StatsSource`] to collect every package's statistics.
pub struct Fetcher<S> {
    source: S,
    concurrency: usize,
    progress: ProgressBar,
}

impl<S: StatsSource> Fetcher<S> {
    /// Create a fetcher running at most `concurrency` package fetches at once.
    pub fn new(source: S, concurrency: usize) -> Self {
        Self {
            source,
            concurrency: concurrency.max(1),
            progress: ProgressBar::hidden(),
        }
    }

    /// Report per-package completion on the given progress bar.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub async fn fetch_summary_map(&self) -> Result<SummaryMap> {
        let summary_map = self.source.fetch_summary_map().await?;
        info!("Manifest lists {} packages", summary_map.len());
        Ok(summary_map)
    }

    /// Fetch and merge a package's yearly blocks, stopping at the first
    /// year the source has no data for.
    pub async fn fetch_stats(&self, package_id: &str, summary: &Summary) -> Result<Stats> {
        let mut stats = Stats::new();

        for year in summary.years() {
            match self.source.fetch_yearly_stats(package_id, year).await? {
                YearlyStats::Found(yearly) => {
                    debug!("{}: {} days in {}", package_id, yearly.len(), year);
                    stats.extend(yearly);
                }
                YearlyStats::NotFound => {
                    debug!("{}: no data for {}, stopping", package_id, year);
                    break;
                }
            }
        }

        Ok(stats)
    }

    /// Fetch every package concurrently. The first failure aborts the run.
    pub async fn fetch_stats_map(&self, summary_map: &SummaryMap) -> Result<StatsMap> {
        self.progress.set_length(summary_map.len() as u64);

        let result: Result<StatsMap> = stream::iter(summary_map.iter())
            .map(|(package_id, summary)| async move {
                let stats = self.fetch_stats(package_id, summary).await?;
                self.progress.inc(1);
                Ok::<_, FetchError>((package_id.clone(), stats))
            })
            .buffer_unordered(self.concurrency)
            .try_collect()
            .await;

        // Cleared on failure too, so no half-drawn bar sits above the error.
        self.progress.finish_and_clear();
        result
    }
}
