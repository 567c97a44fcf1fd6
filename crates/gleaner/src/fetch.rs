//! HTTP fetching for the static backend.
//!
//! Not a browser, just GET requests. Handles redirects and timeouts, retries
//! 5xx and transport errors with exponential backoff, and honours
//! `Retry-After` on 429. Successful bodies are kept in a [`PageCache`].

use crate::cache::{PageCache, DEFAULT_MAX_ENTRIES, DEFAULT_TTL};
use crate::error::ExtractError;
use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
                          AppleWebKit/537.36 (KHTML, like Gecko) \
                          Chrome/131.0.0.0 Safari/537.36";

const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(2);
const MAX_RETRY_AFTER: Duration = Duration::from_secs(10);

/// A fetched document, decoded to text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    /// Requested URL.
    pub url: String,
    /// URL after redirects.
    pub final_url: String,
    pub status: u16,
    pub body: String,
}

/// Source of raw documents for the static backend.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Serve from cache when fresh, otherwise fetch and cache.
    async fn fetch_cached(&self, url: &str) -> Result<FetchedPage, ExtractError>;

    /// Always fetch, replacing any cached copy.
    async fn fetch_fresh(&self, url: &str) -> Result<FetchedPage, ExtractError>;

    /// Drop any cached copy of `url`.
    async fn evict(&self, url: &str);
}

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub timeout: Duration,
    pub max_retries: u32,
    /// Base delay for exponential backoff.
    pub backoff: Duration,
    pub max_redirects: usize,
    pub cache_ttl: Duration,
    pub cache_capacity: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 2,
            backoff: Duration::from_millis(500),
            max_redirects: 5,
            cache_ttl: DEFAULT_TTL,
            cache_capacity: DEFAULT_MAX_ENTRIES,
        }
    }
}

/// `reqwest`-backed fetcher with an in-memory cache.
pub struct HttpFetcher {
    client: reqwest::Client,
    options: FetchOptions,
    cache: Mutex<PageCache>,
}

impl HttpFetcher {
    pub fn new(options: FetchOptions) -> Self {
        let client = reqwest::Client::builder()
            .timeout(options.timeout)
            .redirect(reqwest::redirect::Policy::limited(options.max_redirects))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();

        Self {
            client,
            cache: Mutex::new(PageCache::new(options.cache_ttl, options.cache_capacity)),
            options,
        }
    }

    /// Number of pages currently cached.
    pub async fn cached_pages(&self) -> usize {
        self.cache.lock().await.len()
    }

    async fn get(&self, url: &str) -> Result<FetchedPage, ExtractError> {
        url::Url::parse(url).map_err(|e| ExtractError::fetch(url, format!("invalid URL: {e}")))?;

        let mut attempt = 0u32;
        loop {
            let (delay, reason) = match self.attempt(url, attempt).await {
                Attempt::Page(page) => return Ok(page),
                Attempt::Failed(e) => return Err(e),
                Attempt::Retry { delay, reason } => (delay, reason),
            };
            if attempt >= self.options.max_retries {
                return Err(ExtractError::fetch(url, reason));
            }
            attempt += 1;
            debug!(url, attempt, reason = %reason, delay_ms = delay.as_millis() as u64, "retrying fetch");
            tokio::time::sleep(delay).await;
        }
    }

    /// One request. Bodies are decoded with the charset the response
    /// declares, falling back to UTF-8.
    async fn attempt(&self, url: &str, attempt: u32) -> Attempt {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                return Attempt::Retry {
                    delay: self.backoff(attempt),
                    reason: e.to_string(),
                }
            }
        };

        let status = response.status();
        let reason = format!("HTTP status {}", status.as_u16());
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Attempt::Retry {
                delay: retry_after(&response),
                reason,
            };
        }
        if status.is_server_error() {
            return Attempt::Retry {
                delay: self.backoff(attempt),
                reason,
            };
        }
        if status.is_client_error() {
            return Attempt::Failed(ExtractError::fetch(url, reason));
        }

        let final_url = response.url().to_string();
        match response.text().await {
            Ok(body) => Attempt::Page(FetchedPage {
                url: url.to_string(),
                final_url,
                status: status.as_u16(),
                body,
            }),
            Err(e) => Attempt::Failed(ExtractError::DocumentParse {
                url: url.to_string(),
                message: format!("failed to decode body: {e}"),
            }),
        }
    }

    /// `backoff`, doubled for every retry already made.
    fn backoff(&self, attempt: u32) -> Duration {
        self.options.backoff * 2u32.saturating_pow(attempt)
    }
}

enum Attempt {
    Page(FetchedPage),
    Retry { delay: Duration, reason: String },
    Failed(ExtractError),
}

/// Delay requested by a 429 response, capped at [`MAX_RETRY_AFTER`].
fn retry_after(response: &reqwest::Response) -> Duration {
    response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_RETRY_AFTER)
        .min(MAX_RETRY_AFTER)
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(FetchOptions::default())
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch_cached(&self, url: &str) -> Result<FetchedPage, ExtractError> {
        if let Some(page) = self.cache.lock().await.get(url) {
            debug!(url, "page cache hit");
            return Ok(page);
        }
        self.fetch_fresh(url).await
    }

    async fn fetch_fresh(&self, url: &str) -> Result<FetchedPage, ExtractError> {
        let page = self.get(url).await?;
        self.cache.lock().await.put(url, page.clone());
        Ok(page)
    }

    async fn evict(&self, url: &str) {
        if self.cache.lock().await.invalidate(url) {
            debug!(url, "evicted cached page");
        }
    }
}
