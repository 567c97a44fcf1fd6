//! Live backend: queries run against a rendered page in a browser tab.

use super::{normalize_text, parse_css, DocumentAdapter};
use crate::error::{ExtractError, FieldError};
use async_trait::async_trait;
use base64::prelude::*;
use chromiumoxide::cdp::browser_protocol::emulation::SetScriptExecutionDisabledParams;
use chromiumoxide::element::Element;
use chromiumoxide::page::Page;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Readiness probe evaluated repeatedly until the DOM stops changing.
const DOM_PROBE: &str =
    "({ ready: document.readyState, nodes: document.getElementsByTagName('*').length })";

/// How a page is loaded and when it counts as settled.
#[derive(Debug, Clone)]
pub struct LiveOptions {
    pub navigation_timeout: Duration,
    /// Delay between stability probes.
    pub poll_interval: Duration,
    /// Consecutive identical probes required before extraction starts.
    pub stable_polls: u32,
    /// Upper bound on the stability wait. Extraction proceeds when it runs out.
    pub settle_timeout: Duration,
    /// Run page scripts. Disabling gives a pre-script snapshot of the markup.
    pub javascript: bool,
}

impl Default for LiveOptions {
    fn default() -> Self {
        Self {
            navigation_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(250),
            stable_polls: 2,
            settle_timeout: Duration::from_secs(10),
            javascript: true,
        }
    }
}

/// An element handle on a live page.
#[derive(Clone)]
pub struct LiveNode(Arc<Element>);

/// A rendered page borrowed from a browser session.
pub struct LiveDocument<'s> {
    page: &'s Page,
    url: String,
}

impl<'s> LiveDocument<'s> {
    /// Navigate `page` to `url` and wait until its DOM is stable.
    pub async fn navigate(
        page: &'s Page,
        url: &str,
        options: &LiveOptions,
    ) -> Result<LiveDocument<'s>, ExtractError> {
        if !options.javascript {
            page.execute(SetScriptExecutionDisabledParams::new(true))
                .await
                .map_err(|e| ExtractError::fetch(url, format!("failed to disable scripts: {e}")))?;
        }

        let started = Instant::now();
        match tokio::time::timeout(options.navigation_timeout, page.goto(url)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(ExtractError::fetch(url, format!("navigation failed: {e}"))),
            Err(_) => {
                return Err(ExtractError::fetch(
                    url,
                    format!(
                        "navigation timed out after {}ms",
                        options.navigation_timeout.as_millis()
                    ),
                ))
            }
        }

        wait_until_stable(page, options).await;

        let final_url = page
            .url()
            .await
            .unwrap_or_default()
            .map(|u| u.to_string())
            .unwrap_or_else(|| url.to_string());
        debug!(
            url,
            final_url = %final_url,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "page ready"
        );

        Ok(LiveDocument {
            page,
            url: final_url,
        })
    }

    /// Load an HTML snapshot into `page`, reporting `url` as its location.
    pub async fn from_snapshot(
        page: &'s Page,
        html: &str,
        url: &str,
        options: &LiveOptions,
    ) -> Result<LiveDocument<'s>, ExtractError> {
        let data_url = format!(
            "data:text/html;charset=utf-8;base64,{}",
            BASE64_STANDARD.encode(html)
        );
        let mut document = Self::navigate(page, &data_url, options).await?;
        document.url = url.to_string();
        Ok(document)
    }
}

#[derive(Debug, PartialEq, Deserialize)]
struct DomProbe {
    ready: String,
    nodes: u64,
}

async fn probe(page: &Page) -> Option<DomProbe> {
    match page.evaluate(DOM_PROBE).await {
        Ok(result) => match result.into_value::<DomProbe>() {
            Ok(probe) => Some(probe),
            Err(e) => {
                debug!(error = ?e, "unreadable stability probe");
                None
            }
        },
        Err(e) => {
            debug!(error = %e, "stability probe failed");
            None
        }
    }
}

/// Counts consecutive identical probes of a complete document.
struct StabilityTracker {
    required: u32,
    last: Option<DomProbe>,
    unchanged: u32,
}

impl StabilityTracker {
    fn new(required: u32) -> Self {
        Self {
            required: required.max(1),
            last: None,
            unchanged: 0,
        }
    }

    /// Record one probe and report whether the page has settled. A failed
    /// probe (`None`, typically mid-navigation) restarts the count.
    fn observe(&mut self, current: Option<DomProbe>) -> bool {
        let same = matches!(
            (&current, &self.last),
            (Some(now), Some(before)) if now.ready == "complete" && now == before
        );
        self.unchanged = if same { self.unchanged + 1 } else { 0 };
        self.last = current;
        self.unchanged >= self.required
    }
}

/// Block until the document is complete and its element count holds steady
/// for `stable_polls` consecutive probes, or the settle timeout runs out.
async fn wait_until_stable(page: &Page, options: &LiveOptions) {
    if let Err(e) = page.wait_for_navigation().await {
        debug!(error = %e, "wait_for_navigation failed");
    }

    let deadline = Instant::now() + options.settle_timeout;
    let mut tracker = StabilityTracker::new(options.stable_polls);
    loop {
        if tracker.observe(probe(page).await) {
            return;
        }
        if Instant::now() >= deadline {
            warn!(
                settle_ms = options.settle_timeout.as_millis() as u64,
                "page did not settle, extracting anyway"
            );
            return;
        }
        tokio::time::sleep(options.poll_interval).await;
    }
}

fn query_error(selector: &str, error: impl std::fmt::Display) -> FieldError {
    FieldError::Query {
        selector: selector.to_string(),
        message: error.to_string(),
    }
}

fn wrap(elements: Vec<Element>) -> Vec<LiveNode> {
    elements.into_iter().map(|e| LiveNode(Arc::new(e))).collect()
}

#[async_trait(?Send)]
impl<'s> DocumentAdapter for LiveDocument<'s> {
    type Node = LiveNode;

    async fn select_document(&self, css: &str) -> Result<Vec<LiveNode>, FieldError> {
        parse_css(css)?;
        let elements = self
            .page
            .find_elements(css)
            .await
            .map_err(|e| query_error(css, e))?;
        Ok(wrap(elements))
    }

    async fn select_within(&self, context: &LiveNode, css: &str) -> Result<Vec<LiveNode>, FieldError> {
        parse_css(css)?;
        let elements = context
            .0
            .find_elements(css)
            .await
            .map_err(|e| query_error(css, e))?;
        Ok(wrap(elements))
    }

    async fn text(&self, node: &LiveNode) -> Result<String, FieldError> {
        let raw = node
            .0
            .inner_text()
            .await
            .map_err(|e| query_error("innerText", e))?
            .unwrap_or_default();
        Ok(normalize_text(&raw))
    }

    async fn attribute(&self, node: &LiveNode, name: &str) -> Result<Option<String>, FieldError> {
        node.0
            .attribute(name)
            .await
            .map_err(|e| query_error(name, e))
    }

    fn current_url(&self) -> &str {
        &self.url
    }
}
