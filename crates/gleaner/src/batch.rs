// Copyright 2026 Gleaner Contributors
// SPDX-License-Identifier: Apache-2.0

//! Concurrent extraction over a list of URLs.
//!
//! A fixed set of workers, each with its own [`Extractor`], claims URLs from
//! a shared queue and sends one record per URL to a single collector, which
//! writes newline-delimited JSON. Everything runs on one thread inside a
//! `LocalSet` because parsed static documents are `!Send`.

use crate::engine::Extractor;
use crate::item::ExtractionResult;
use indicatif::ProgressBar;
use serde::Serialize;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Mutex};
use tokio::task::{spawn_local, LocalSet};
use tracing::{debug, warn};

/// One output line: the URL plus either its result or its error.
#[derive(Debug, Serialize)]
pub struct BatchRecord {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ExtractionResult>,
}

/// Totals for a finished batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub processed: usize,
    pub failed: usize,
    pub items: usize,
    /// Successful URLs that produced no items.
    pub empty: usize,
}

impl BatchSummary {
    fn record(&mut self, record: &BatchRecord) {
        self.processed += 1;
        match &record.data {
            Some(result) => {
                let items = result.item_count();
                self.items += items;
                if items == 0 {
                    self.empty += 1;
                }
            }
            None => self.failed += 1,
        }
    }
}

/// Read a newline-delimited URL list, skipping blank lines.
pub fn load_urls(path: impl AsRef<Path>) -> io::Result<Vec<String>> {
    let data = std::fs::read_to_string(path.as_ref())?;
    Ok(data
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Extract every URL with `workers` concurrent extractors and stream the
/// records to `output` as JSON lines.
///
/// A failing URL produces an error record and never stops the batch. URLs
/// that yield no items are evicted from their extractor's page cache.
pub async fn run_batch<F, W>(
    urls: Vec<String>,
    workers: usize,
    make_extractor: F,
    output: W,
    progress: ProgressBar,
) -> io::Result<BatchSummary>
where
    F: Fn(usize) -> Extractor,
    W: AsyncWrite + Unpin + 'static,
{
    let local = LocalSet::new();
    local
        .run_until(drive(urls, workers.max(1), make_extractor, output, progress))
        .await
}

async fn drive<F, W>(
    urls: Vec<String>,
    workers: usize,
    make_extractor: F,
    output: W,
    progress: ProgressBar,
) -> io::Result<BatchSummary>
where
    F: Fn(usize) -> Extractor,
    W: AsyncWrite + Unpin + 'static,
{
    progress.set_length(urls.len() as u64);

    let (url_tx, url_rx) = mpsc::channel::<String>(workers * 2);
    let (result_tx, result_rx) = mpsc::channel::<BatchRecord>(workers * 2);

    let feeder = spawn_local(async move {
        for url in urls {
            if url_tx.send(url).await.is_err() {
                break;
            }
        }
    });

    let queue = Arc::new(Mutex::new(url_rx));
    let mut handles = Vec::with_capacity(workers);
    for id in 0..workers {
        let extractor = make_extractor(id);
        let queue = Arc::clone(&queue);
        let results = result_tx.clone();
        handles.push(spawn_local(async move {
            worker_loop(id, extractor, queue, results).await;
        }));
    }
    drop(result_tx);

    let collector = spawn_local(collect(result_rx, output, progress));

    for handle in handles {
        if let Err(e) = handle.await {
            warn!(error = %e, "batch worker panicked");
        }
    }
    // The feeder only stops early once every worker is gone.
    feeder.abort();

    collector.await.map_err(io::Error::other)?
}

async fn worker_loop(
    id: usize,
    extractor: Extractor,
    queue: Arc<Mutex<mpsc::Receiver<String>>>,
    results: mpsc::Sender<BatchRecord>,
) {
    loop {
        let next = queue.lock().await.recv().await;
        let Some(url) = next else {
            break;
        };
        let record = process(&extractor, url).await;
        if results.send(record).await.is_err() {
            break;
        }
    }
    debug!(worker = id, "batch worker finished");
}

async fn process(extractor: &Extractor, url: String) -> BatchRecord {
    match extractor.extract(&url).await {
        Ok(result) => {
            if result.item_count() == 0 {
                extractor.evict(&url).await;
            }
            BatchRecord {
                url,
                error: None,
                data: Some(result),
            }
        }
        Err(e) => BatchRecord {
            url,
            error: Some(e.to_string()),
            data: None,
        },
    }
}

async fn collect<W>(
    mut records: mpsc::Receiver<BatchRecord>,
    mut output: W,
    progress: ProgressBar,
) -> io::Result<BatchSummary>
where
    W: AsyncWrite + Unpin,
{
    let mut summary = BatchSummary::default();
    while let Some(record) = records.recv().await {
        summary.record(&record);
        let mut line = serde_json::to_vec(&record).map_err(io::Error::other)?;
        line.push(b'\n');
        output.write_all(&line).await?;
        progress.inc(1);
    }
    output.flush().await?;
    progress.finish();
    Ok(summary)
}
