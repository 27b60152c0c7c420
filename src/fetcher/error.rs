use reqwest::StatusCode;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failures that abort an aggregation run.
///
/// A non-success response for a yearly block is not an error; it is
/// reported as [`YearlyStats::NotFound`](super::YearlyStats::NotFound).
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("cannot fetch stats summary from {url}: HTTP {status}")]
    Manifest { url: String, status: StatusCode },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: BoxError,
    },

    #[error("invalid JSON from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: BoxError,
    },

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, FetchError>;
