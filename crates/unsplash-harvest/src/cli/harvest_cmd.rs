// Copyright 2026 Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! The default command: search, reveal, download.

use super::{output, prompt, EXIT_EMPTY, EXIT_OK};
use crate::config::HarvestConfig;
use crate::error::HarvestError;
use crate::harvest::{cancel_channel, HarvestOutcome, HarvestRequest, Harvester};
use crate::progress;
use crate::renderer::chromium::ChromiumRenderer;
use crate::renderer::Renderer;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Inputs collected from the command line.
#[derive(Debug, Clone, Default)]
pub struct HarvestArgs {
    pub query: Option<String>,
    pub num_images: Option<usize>,
    pub output: PathBuf,
    pub no_headless: bool,
    pub config: Option<PathBuf>,
    pub concurrency: Option<usize>,
    pub deadline_secs: Option<u64>,
    pub json: bool,
}

/// Resolve the configuration and apply command-line overrides.
pub fn build_config(args: &HarvestArgs) -> Result<HarvestConfig> {
    let mut config = HarvestConfig::resolve(args.config.as_deref())?;
    if args.no_headless {
        config.headless = false;
    }
    if let Some(n) = args.concurrency {
        config.download_concurrency = n;
    }
    config.validate()?;
    Ok(config)
}

/// Run a harvest and return the process exit code.
pub async fn run(args: HarvestArgs) -> Result<i32> {
    let config = build_config(&args)?;

    let query = match args.query.clone() {
        Some(q) => q,
        None => match prompt::ask_query()? {
            Some(q) => q,
            None => return Ok(cancelled()),
        },
    };
    let target = match args.num_images {
        Some(n) => n,
        None => match prompt::ask_count()? {
            Some(n) => n,
            None => return Ok(cancelled()),
        },
    };
    let request = HarvestRequest::new(&query, target, args.output.clone())?;

    if !args.json {
        println!("Searching for '{}'...", request.query);
        println!("Target: {} images", request.target);
        println!("Output: {}\n", request.output_dir.display());
    }

    let renderer = Arc::new(
        ChromiumRenderer::launch(&config)
            .await
            .context("failed to start the browser (try `unsplash-harvest doctor`)")?,
    );

    let (cancel_tx, cancel_rx) = cancel_channel();
    let cancel_tx = Arc::new(cancel_tx);
    {
        let tx = Arc::clone(&cancel_tx);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted");
                let _ = tx.send(true);
            }
        });
    }
    if let Some(secs) = args.deadline_secs {
        let tx = Arc::clone(&cancel_tx);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            tracing::warn!("deadline of {secs}s reached");
            let _ = tx.send(true);
        });
    }

    let (progress_tx, progress_rx) = progress::channel();
    let bar = (!args.json).then(|| tokio::spawn(output::drive_progress(progress_rx)));

    let harvester = Harvester::new(config, renderer.clone()).with_progress(progress_tx);
    let outcome = harvester.run(&request, cancel_rx).await;
    drop(harvester);
    if let Some(bar) = bar {
        let _ = bar.await;
    }

    if let Err(e) = renderer.shutdown().await {
        tracing::warn!("browser shutdown failed: {e:#}");
    }

    match outcome {
        Ok(HarvestOutcome::Empty { query }) => {
            if args.json {
                output::print_json(&serde_json::json!({ "outcome": "empty", "query": query }));
            } else {
                println!("No images found. Try a different search query.");
            }
            Ok(EXIT_EMPTY)
        }
        Ok(HarvestOutcome::Completed(report)) => {
            if args.json {
                output::print_report_json(&report);
            } else {
                output::print_report(&report);
            }
            Ok(EXIT_OK)
        }
        Err(HarvestError::Cancelled) => {
            if args.json {
                output::print_json(&serde_json::json!({ "outcome": "cancelled" }));
                Ok(EXIT_OK)
            } else {
                Ok(cancelled())
            }
        }
        Err(e) => Err(e.into()),
    }
}

fn cancelled() -> i32 {
    println!("\nDownload cancelled by user.");
    EXIT_OK
}
