// Copyright 2026 Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Harvester: orchestrates one search-and-download run.
//!
//! 1. **Acquire**: open a session, reveal enough grid items, extract URLs.
//!    The session is closed afterwards whatever happened, including
//!    cancellation.
//! 2. **Fetch**: download the URLs into the output directory.
//!
//! An empty extraction is reported as [`HarvestOutcome::Empty`] and leaves
//! the output directory alone.

use crate::config::HarvestConfig;
use crate::error::{HarvestError, HarvestResult};
use crate::extractor::UrlExtractor;
use crate::fetcher::{AssetFetcher, DownloadResult};
use crate::navigator::{LayoutNavigator, LoadStop};
use crate::progress::{HarvestEventKind, HarvestStage, ProgressReporter, ProgressSender};
use crate::renderer::Renderer;
use crate::session::SearchSession;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;

/// What to harvest and where to put it.
#[derive(Debug, Clone)]
pub struct HarvestRequest {
    pub query: String,
    pub target: usize,
    pub output_dir: PathBuf,
}

impl HarvestRequest {
    /// Validate and normalize the inputs.
    pub fn new(query: &str, target: usize, output_dir: impl Into<PathBuf>) -> HarvestResult<Self> {
        let query = query.trim();
        if query.is_empty() {
            return Err(HarvestError::InvalidInput("query must not be empty".into()));
        }
        if target == 0 {
            return Err(HarvestError::InvalidInput(
                "number of images must be positive".into(),
            ));
        }
        Ok(Self {
            query: query.to_string(),
            target,
            output_dir: output_dir.into(),
        })
    }
}

/// URLs recovered by the acquisition phase.
#[derive(Debug, Clone)]
pub struct Acquisition {
    pub references: Vec<String>,
    /// Estimated items revealed in the grid.
    pub revealed: usize,
    pub scrolls: u32,
    pub stalled: bool,
    /// Grid items skipped for not matching the card shape.
    pub skipped: usize,
}

/// Summary of a completed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestReport {
    pub run_id: String,
    pub query: String,
    pub requested: usize,
    pub output_dir: PathBuf,
    pub references: Vec<String>,
    pub downloads: Vec<DownloadResult>,
    /// The grid stopped growing before the target was reached.
    pub stalled: bool,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl HarvestReport {
    pub fn saved(&self) -> usize {
        self.downloads.iter().filter(|d| d.is_saved()).count()
    }

    pub fn failed(&self) -> usize {
        self.downloads.iter().filter(|d| d.is_failed()).count()
    }

    /// Paths of the files written, in index order.
    pub fn saved_paths(&self) -> Vec<&Path> {
        self.downloads.iter().filter_map(|d| d.path()).collect()
    }

    pub fn elapsed_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

/// Result of [`Harvester::run`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum HarvestOutcome {
    /// The grid yielded no usable image references.
    Empty { query: String },
    Completed(HarvestReport),
}

/// Runs harvests against a renderer.
pub struct Harvester {
    config: HarvestConfig,
    renderer: Arc<dyn Renderer>,
    progress: Option<ProgressSender>,
}

impl Harvester {
    pub fn new(config: HarvestConfig, renderer: Arc<dyn Renderer>) -> Self {
        Self {
            config,
            renderer,
            progress: None,
        }
    }

    /// Broadcast progress events on `tx`.
    pub fn with_progress(mut self, tx: ProgressSender) -> Self {
        self.progress = Some(tx);
        self
    }

    /// Run a full harvest.
    ///
    /// Cancellation while acquiring returns [`HarvestError::Cancelled`].
    /// Cancellation while fetching returns a report with `cancelled` set
    /// and the remaining items marked as cancelled.
    pub async fn run(
        &self,
        request: &HarvestRequest,
        cancel: watch::Receiver<bool>,
    ) -> HarvestResult<HarvestOutcome> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let reporter = ProgressReporter::new(self.progress.clone(), &run_id);
        let started_at = Utc::now();
        let clock = Instant::now();
        tracing::info!(
            "harvesting {} images for '{}' into {}",
            request.target,
            request.query,
            request.output_dir.display()
        );

        let acquisition = self.collect_references(request, &cancel, &reporter).await?;
        tracing::debug!(
            revealed = acquisition.revealed,
            scrolls = acquisition.scrolls,
            skipped = acquisition.skipped,
            "acquisition finished"
        );
        if acquisition.references.is_empty() {
            tracing::warn!("no images found for '{}'", request.query);
            return Ok(HarvestOutcome::Empty {
                query: request.query.clone(),
            });
        }

        let stage_clock = Instant::now();
        reporter.emit(HarvestEventKind::StageStarted {
            stage: HarvestStage::Fetch,
        });
        let downloads = AssetFetcher::new(&self.config)?
            .fetch_all(&acquisition.references, &request.output_dir, &cancel, &reporter)
            .await?;
        reporter.emit(HarvestEventKind::StageCompleted {
            stage: HarvestStage::Fetch,
            duration_ms: stage_clock.elapsed().as_millis() as u64,
        });

        let cancelled = *cancel.borrow();
        let report = HarvestReport {
            run_id,
            query: request.query.clone(),
            requested: request.target,
            output_dir: request.output_dir.clone(),
            references: acquisition.references,
            downloads,
            stalled: acquisition.stalled,
            cancelled,
            started_at,
            finished_at: Utc::now(),
        };

        reporter.emit(HarvestEventKind::HarvestComplete {
            saved: report.saved(),
            failed: report.failed(),
            elapsed_ms: clock.elapsed().as_millis() as u64,
        });
        tracing::info!(
            "successfully downloaded {}/{} images",
            report.saved(),
            report.references.len()
        );
        Ok(HarvestOutcome::Completed(report))
    }

    /// Open a session, reveal the grid and extract up to `target` URLs.
    ///
    /// The session is closed on every exit path.
    pub async fn collect_references(
        &self,
        request: &HarvestRequest,
        cancel: &watch::Receiver<bool>,
        reporter: &ProgressReporter,
    ) -> HarvestResult<Acquisition> {
        if *cancel.borrow() {
            return Err(HarvestError::Cancelled);
        }

        let mut session =
            SearchSession::open(self.renderer.as_ref(), &request.query, &self.config).await?;

        let result = tokio::select! {
            acquired = acquire(&mut session, &self.config, reporter, request.target) => acquired,
            _ = wait_cancelled(cancel.clone()) => {
                tracing::warn!("acquisition cancelled");
                Err(HarvestError::Cancelled)
            }
        };

        if let Err(e) = session.close().await {
            tracing::warn!("failed to close session: {e}");
        }
        result
    }
}

async fn acquire(
    session: &mut SearchSession,
    config: &HarvestConfig,
    reporter: &ProgressReporter,
    target: usize,
) -> HarvestResult<Acquisition> {
    let loaded = LayoutNavigator::new(session, config, reporter)
        .load(target)
        .await?;

    let started = Instant::now();
    reporter.emit(HarvestEventKind::StageStarted {
        stage: HarvestStage::Extract,
    });
    let extraction = UrlExtractor::new(config)
        .extract(&loaded.snapshot, target)
        .await?;
    reporter.emit(HarvestEventKind::Extracted {
        references: extraction.references.len(),
        skipped: extraction.skipped,
    });
    reporter.emit(HarvestEventKind::StageCompleted {
        stage: HarvestStage::Extract,
        duration_ms: started.elapsed().as_millis() as u64,
    });
    tracing::info!(
        "found {} image URLs ({} items skipped)",
        extraction.references.len(),
        extraction.skipped
    );
    if !extraction.references.is_empty() && extraction.references.len() < target {
        reporter.emit(HarvestEventKind::Warning {
            message: format!(
                "only {} of {target} requested images are available",
                extraction.references.len()
            ),
        });
    }

    Ok(Acquisition {
        references: extraction.references,
        revealed: loaded.count,
        scrolls: loaded.scrolls,
        stalled: loaded.stop == LoadStop::Stalled,
        skipped: extraction.skipped,
    })
}

/// A cancellation flag pair; send `true` to cancel.
pub fn cancel_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

/// Resolve once the flag turns true. Never resolves if the sender is
/// dropped without cancelling.
pub async fn wait_cancelled(mut cancel: watch::Receiver<bool>) {
    if cancel.wait_for(|cancelled| *cancelled).await.is_err() {
        std::future::pending::<()>().await;
    }
}
