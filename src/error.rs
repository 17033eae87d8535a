use std::path::PathBuf;

use thiserror::Error;

/// Failure to obtain markup for one repository page.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("not a repository url: {0}")]
    InvalidUrl(String),

    /// Non-success HTTP status. Not retried within a run.
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    /// Timeout or connection failure.
    #[error("request to {url} failed: {source}")]
    Transient {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient { .. })
    }
}

/// Dataset load/persist failures. Fatal for the run.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("dataset not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} is not a valid dataset: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode dataset: {0}")]
    Encode(#[from] serde_json::Error),
}
