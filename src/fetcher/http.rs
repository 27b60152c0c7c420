//! HTTP implementation of [`StatsSource`].

use super::{FetchError, Result, StatsSource, YearlyStats};
use crate::models::{Stats, SummaryMap};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// Statistics API served as static JSON files under a base URL.
///
/// Layout: `{base_url}/summary.json` and `{base_url}/{package}/{year}.json`.
#[derive(Debug, Clone)]
pub struct HttpStatsSource {
    base_url: String,
    client: Client,
}

impl HttpStatsSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn summary_url(&self) -> String {
        format!("{}/summary.json", self.base_url)
    }

    fn yearly_url(&self, package_id: &str, year: i32) -> String {
        format!("{}/{}/{}.json", self.base_url, package_id, year)
    }

    async fn get(&self, url: &str) -> Result<Response> {
        debug!("GET {}", url);
        self.client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Transport {
                url: url.to_string(),
                source: Box::new(e),
            })
    }
}

async fn decode<T: DeserializeOwned>(url: &str, response: Response) -> Result<T> {
    response.json().await.map_err(|e| FetchError::Decode {
        url: url.to_string(),
        source: Box::new(e),
    })
}

impl StatsSource for HttpStatsSource {
    async fn fetch_summary_map(&self) -> Result<SummaryMap> {
        let url = self.summary_url();
        let response = self.get(&url).await?;

        if !response.status().is_success() {
            return Err(FetchError::Manifest {
                url,
                status: response.status(),
            });
        }

        decode(&url, response).await
    }

    async fn fetch_yearly_stats(&self, package_id: &str, year: i32) -> Result<YearlyStats> {
        let url = self.yearly_url(package_id, year);
        let response = self.get(&url).await?;

        // Any non-success status means the year has no data, not a failure.
        if !response.status().is_success() {
            debug!("{} -> HTTP {}", url, response.status());
            return Ok(YearlyStats::NotFound);
        }

        let stats: Stats = decode(&url, response).await?;
        Ok(YearlyStats::Found(stats))
    }
}
