pub mod cache;
pub mod slug;

use std::time::SystemTime;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use tracing::debug;

use crate::error::FetchError;
use crate::gate::Pacer;
use crate::settings::Settings;
use cache::PageCache;

/// Anything that can hand back the markup of a repository page.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, url: &str) -> Result<String, FetchError>;
}

/// HTTP fetcher with an on-disk freshness cache in front of it.
pub struct HttpFetcher {
    client: reqwest::Client,
    cache: PageCache,
    pacer: Pacer,
}

impl HttpFetcher {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = build_client(settings)?;
        Ok(HttpFetcher {
            client,
            cache: PageCache::new(&settings.cache_dir, settings.cache_ttl()),
            pacer: Pacer::from_settings(settings),
        })
    }

    pub fn cache(&self) -> &PageCache {
        &self.cache
    }

    /// Fetch as if the current time were `now`; drives cache freshness.
    pub async fn fetch_at(&self, url: &str, now: SystemTime) -> Result<String, FetchError> {
        let key = slug::repo_slug(url)?;
        if let Some(markup) = self.cache.read_fresh(&key, now) {
            debug!(slug = %key, "Cache hit");
            return Ok(markup);
        }

        let target = slug::normalize_url(url)?;
        self.pacer.before_request().await;

        let response = self
            .client
            .get(target.as_str())
            .send()
            .await
            .map_err(|source| FetchError::Transient {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let markup = response.text().await.map_err(|source| FetchError::Transient {
            url: url.to_string(),
            source,
        })?;

        self.cache.write(&key, &markup);
        Ok(markup)
    }
}

#[async_trait]
impl PageSource for HttpFetcher {
    async fn fetch_page(&self, url: &str) -> Result<String, FetchError> {
        self.fetch_at(url, SystemTime::now()).await
    }
}

fn build_client(settings: &Settings) -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
    headers.insert("DNT", HeaderValue::from_static("1"));
    headers.insert("Upgrade-Insecure-Requests", HeaderValue::from_static("1"));

    reqwest::Client::builder()
        .user_agent(settings.user_agent.as_str())
        .default_headers(headers)
        .timeout(settings.request_timeout())
        .build()
        .context("Failed to create HTTP client")
}
