use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use serde::Deserialize;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Runtime knobs. Layered: defaults, then `scraper.toml` (or `--config`),
/// then `SCRAPER_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub data_file: PathBuf,
    /// Raw scrape results from the most recent `scrape` run.
    pub raw_output: PathBuf,
    pub cache_dir: PathBuf,
    pub cache_ttl_secs: u64,
    pub concurrency: usize,
    pub delay_min_ms: u64,
    pub delay_max_ms: u64,
    pub request_timeout_secs: u64,
    pub batch_size: usize,
    pub batch_pause_secs: u64,
    pub checkpoint_every: usize,
    pub max_contributors: usize,
    pub user_agent: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            data_file: PathBuf::from("data/mcp-data.json"),
            raw_output: PathBuf::from("github-scraped-data.json"),
            cache_dir: PathBuf::from("data/github_cache"),
            cache_ttl_secs: 3600,
            concurrency: 3,
            delay_min_ms: 500,
            delay_max_ms: 1500,
            request_timeout_secs: 30,
            batch_size: 10,
            batch_pause_secs: 10,
            checkpoint_every: 10,
            max_contributors: 5,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl Settings {
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let file_source = match file {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name("scraper").required(false),
        };

        let settings: Settings = config::Config::builder()
            .add_source(file_source)
            .add_source(config::Environment::with_prefix("SCRAPER").try_parsing(true))
            .build()
            .context("Failed to load configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.concurrency >= 1, "concurrency must be at least 1");
        ensure!(self.batch_size >= 1, "batch_size must be at least 1");
        ensure!(
            self.delay_min_ms <= self.delay_max_ms,
            "delay_min_ms ({}) exceeds delay_max_ms ({})",
            self.delay_min_ms,
            self.delay_max_ms
        );
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
