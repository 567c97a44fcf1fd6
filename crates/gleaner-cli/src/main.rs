// Copyright 2026 Gleaner Contributors
// SPDX-License-Identifier: Apache-2.0

//! Gleaner command-line front end.

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

mod cli;

use cli::backend::ModeArg;

#[derive(Parser)]
#[command(
    name = "gleaner",
    about = "Gleaner: schema-driven structured extraction from web pages",
    version
)]
struct Cli {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Fetch and navigation timeout in milliseconds.
    #[arg(long, default_value_t = 30_000, global = true)]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract one page and print the schema results as JSON.
    Extract {
        /// Path to the extractor config (JSON).
        #[arg(short, long)]
        config: PathBuf,

        /// Page to extract. Defaults to the config's example_url.
        #[arg(short, long)]
        url: Option<String>,

        /// Document backend; `auto` uses the config's mode.
        #[arg(long, value_enum, default_value_t = ModeArg::Auto)]
        mode: ModeArg,

        /// Bypass the page cache.
        #[arg(long)]
        fresh: bool,
    },

    /// Extract every URL in a file, writing one JSON record per line.
    Batch {
        /// Path to the extractor config (JSON).
        #[arg(short, long)]
        config: PathBuf,

        /// Newline-delimited URL list.
        #[arg(long)]
        urls: PathBuf,

        /// Number of concurrent workers.
        #[arg(short, long, default_value_t = 2)]
        workers: usize,

        /// Output file (JSON lines).
        #[arg(short, long, default_value = "output.jsonl")]
        output: PathBuf,

        /// Document backend; `auto` uses the config's mode.
        #[arg(long, value_enum, default_value_t = ModeArg::Auto)]
        mode: ModeArg,
    },

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   gleaner completions bash > ~/.local/share/bash-completion/completions/gleaner
    ///   gleaner completions zsh > ~/.zfunc/_gleaner
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Extract {
            config,
            url,
            mode,
            fresh,
        } => {
            cli::extract_cmd::run(&config, url, mode, fresh, cli.timeout_ms).await?;
        }

        Commands::Batch {
            config,
            urls,
            workers,
            output,
            mode,
        } => {
            cli::batch_cmd::run(&config, &urls, workers, &output, mode, cli.timeout_ms).await?;
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "gleaner", &mut std::io::stdout());
        }
    }

    Ok(())
}
