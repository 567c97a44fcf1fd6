//! Backend selection shared by the extract and batch commands.

use anyhow::{Context, Result};
use gleaner::{Backend, BrowserPool, FetchOptions, HttpFetcher, LiveOptions, Mode};
use std::sync::Arc;
use std::time::Duration;

/// `--mode` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ModeArg {
    /// Use the mode named in the config.
    Auto,
    Static,
    Live,
}

impl ModeArg {
    pub fn resolve(self, configured: Mode) -> Mode {
        match self {
            ModeArg::Auto => configured,
            ModeArg::Static => Mode::Static,
            ModeArg::Live => Mode::Live,
        }
    }
}

/// Build the backend for `mode`. Live mode launches Chromium here.
pub async fn build(mode: Mode, timeout_ms: u64) -> Result<Backend> {
    let timeout = Duration::from_millis(timeout_ms);
    match mode {
        Mode::Static => {
            let fetcher = HttpFetcher::new(FetchOptions {
                timeout,
                ..FetchOptions::default()
            });
            Ok(Backend::Static(Arc::new(fetcher)))
        }
        Mode::Live => {
            let pool = BrowserPool::launch()
                .await
                .context("failed to start the live backend")?;
            Ok(Backend::Live {
                pool: Arc::new(pool),
                options: LiveOptions {
                    navigation_timeout: timeout,
                    ..LiveOptions::default()
                },
            })
        }
    }
}
