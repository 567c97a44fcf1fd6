//! `gleaner batch`: run a config against a list of URLs.

use super::backend::{self, ModeArg};
use anyhow::{Context, Result};
use gleaner::{load_urls, run_batch, Extractor, ExtractorConfig};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufWriter;
use tracing::info;

/// Run the batch command.
pub async fn run(
    config_path: &Path,
    urls_path: &Path,
    workers: usize,
    output_path: &Path,
    mode: ModeArg,
    timeout_ms: u64,
) -> Result<()> {
    let config = ExtractorConfig::from_path(config_path)
        .with_context(|| format!("failed to load config {}", config_path.display()))?;
    let urls = load_urls(urls_path)
        .with_context(|| format!("failed to read URL list {}", urls_path.display()))?;
    let total = urls.len();

    let backend = backend::build(mode.resolve(config.mode), timeout_ms).await?;
    let config = Arc::new(config);

    let file = tokio::fs::File::create(output_path)
        .await
        .with_context(|| format!("failed to create {}", output_path.display()))?;

    let progress = ProgressBar::new(total as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("#>-"),
    );
    progress.enable_steady_tick(Duration::from_millis(100));

    let summary = run_batch(
        urls,
        workers,
        |_| Extractor::new(Arc::clone(&config), backend.clone()),
        BufWriter::new(file),
        progress,
    )
    .await
    .with_context(|| format!("failed writing {}", output_path.display()))?;

    info!(
        urls = total,
        failed = summary.failed,
        empty = summary.empty,
        items = summary.items,
        output = %output_path.display(),
        "batch finished"
    );
    Ok(())
}
