// Copyright 2026 Gleaner Contributors
// SPDX-License-Identifier: Apache-2.0

//! The extraction engine: one call, one document, every schema.

use crate::document::{DocumentAdapter, LiveDocument, LiveOptions, StaticDocument};
use crate::error::{ErrorCollector, ExtractError};
use crate::fetch::PageFetcher;
use crate::item::{ExtractedItem, ExtractionResult, SchemaResult};
use crate::normalize::{Clock, Normalizer, SystemClock};
use crate::resolve::FieldResolver;
use crate::schema::{ExtractorConfig, Schema};
use crate::session::BrowserPool;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Where documents come from.
#[derive(Clone)]
pub enum Backend {
    /// Fetch over HTTP and parse once.
    Static(Arc<dyn PageFetcher>),
    /// Render each URL in a fresh browser tab.
    Live {
        pool: Arc<BrowserPool>,
        options: LiveOptions,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchPolicy {
    Cached,
    Fresh,
}

/// Runs an [`ExtractorConfig`] against documents.
pub struct Extractor {
    config: Arc<ExtractorConfig>,
    backend: Backend,
    normalizer: Normalizer,
}

impl Extractor {
    pub fn new(config: Arc<ExtractorConfig>, backend: Backend) -> Self {
        let normalizer = Normalizer::new(&config, Arc::new(SystemClock));
        Self {
            config,
            backend,
            normalizer,
        }
    }

    /// Replace the clock used for `external_time` fallbacks.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.normalizer = self.normalizer.with_clock(clock);
        self
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    pub async fn extract(&self, url: &str) -> Result<ExtractionResult, ExtractError> {
        self.run(url, FetchPolicy::Cached).await
    }

    /// Like [`extract`](Self::extract) but never served from the page cache.
    pub async fn extract_fresh(&self, url: &str) -> Result<ExtractionResult, ExtractError> {
        self.run(url, FetchPolicy::Fresh).await
    }

    /// Drop any cached copy of `url`. No-op for the live backend.
    pub async fn evict(&self, url: &str) {
        if let Backend::Static(fetcher) = &self.backend {
            fetcher.evict(url).await;
        }
    }

    async fn run(&self, url: &str, policy: FetchPolicy) -> Result<ExtractionResult, ExtractError> {
        let started = Instant::now();
        let outcome = match &self.backend {
            Backend::Static(fetcher) => self.run_static(fetcher.as_ref(), url, policy).await,
            Backend::Live { pool, options } => self.run_live(pool, options, url).await,
        };

        match &outcome {
            Ok(result) => info!(
                url,
                config = %self.config.name,
                items = result.item_count(),
                errors = result.errors.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "extraction finished"
            ),
            Err(e) => warn!(url, config = %self.config.name, error = %e, "extraction failed"),
        }
        outcome
    }

    async fn run_static(
        &self,
        fetcher: &dyn PageFetcher,
        url: &str,
        policy: FetchPolicy,
    ) -> Result<ExtractionResult, ExtractError> {
        let page = match policy {
            FetchPolicy::Cached => fetcher.fetch_cached(url).await?,
            FetchPolicy::Fresh => fetcher.fetch_fresh(url).await?,
        };
        let document = StaticDocument::from_html(&page.body, page.final_url);
        Ok(self.extract_document(&document).await)
    }

    async fn run_live(
        &self,
        pool: &BrowserPool,
        options: &LiveOptions,
        url: &str,
    ) -> Result<ExtractionResult, ExtractError> {
        let session = pool.acquire().await?;
        let outcome = match LiveDocument::navigate(session.page(), url, options).await {
            Ok(document) => Ok(self.extract_document(document).await),
            Err(e) => Err(e),
        };
        session.close().await;
        outcome
    }

    /// Run every schema against an already-built document.
    pub async fn extract_document<D: DocumentAdapter>(&self, document: D) -> ExtractionResult {
        let final_url = document.current_url().to_string();
        let resolver = FieldResolver::new(&document);
        let mut errors = ErrorCollector::new(final_url.clone());
        let mut schemas = BTreeMap::new();

        for schema in &self.config.schemas {
            let items = self.extract_schema(&resolver, schema, &mut errors).await;
            schemas.insert(
                schema.name.clone(),
                SchemaResult {
                    schema: schema.info(),
                    items,
                },
            );
        }

        ExtractionResult {
            schemas,
            errors: errors.into_errors(),
            final_url,
        }
    }

    async fn extract_schema<D: DocumentAdapter>(
        &self,
        resolver: &FieldResolver<'_, D>,
        schema: &Schema,
        errors: &mut ErrorCollector,
    ) -> Vec<ExtractedItem> {
        let roots = match resolver.roots(&schema.selector).await {
            Ok(roots) if !roots.is_empty() => roots,
            Ok(_) => {
                errors.record_message(
                    &schema.name,
                    format!("no elements matched root selector: {}", schema.selector),
                );
                return Vec::new();
            }
            Err(e) => {
                errors.record_message(
                    &schema.name,
                    format!("failed to find elements with selector {}: {e}", schema.selector),
                );
                return Vec::new();
            }
        };

        let mut items = Vec::with_capacity(roots.len());
        for root in &roots {
            let raw = resolver.resolve_item(root, &schema.fields, errors).await;
            if let Some(item) = self.normalizer.normalize(raw) {
                items.push(item);
            }
        }
        items
    }
}
