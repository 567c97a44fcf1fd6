//! `gleaner extract`: run a config against one page.

use super::backend::{self, ModeArg};
use anyhow::{Context, Result};
use gleaner::{Extractor, ExtractorConfig};
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

/// Run the extract command.
pub async fn run(
    config_path: &Path,
    url: Option<String>,
    mode: ModeArg,
    fresh: bool,
    timeout_ms: u64,
) -> Result<()> {
    let config = ExtractorConfig::from_path(config_path)
        .with_context(|| format!("failed to load config {}", config_path.display()))?;

    let url = url
        .or_else(|| config.example_url.clone())
        .context("no --url given and the config has no example_url")?;
    if !config.matches(&url) {
        warn!(url = %url, config = %config.name, "URL does not match the config's pattern");
    }

    let backend = backend::build(mode.resolve(config.mode), timeout_ms).await?;
    let extractor = Extractor::new(Arc::new(config), backend);

    let result = if fresh {
        extractor.extract_fresh(&url).await
    } else {
        extractor.extract(&url).await
    }
    .with_context(|| format!("extraction failed for {url}"))?;

    for error in &result.errors {
        warn!(field = %error.field, url = %error.url, "{}", error.message);
    }

    println!("{}", serde_json::to_string_pretty(&result.schemas)?);
    Ok(())
}
