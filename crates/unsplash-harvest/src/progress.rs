// Copyright 2026 Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Progress event types and broadcast channel for live harvest telemetry.
//!
//! The navigator, extractor and fetcher emit `HarvestEvent`s through a
//! `tokio::sync::broadcast` channel to any subscriber (the CLI progress bar,
//! tests). When no subscriber exists, events are silently dropped.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A progress event emitted during a harvest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestEvent {
    /// The run this event belongs to.
    pub run_id: String,
    /// Monotonically increasing sequence number.
    pub seq: u64,
    /// The kind of progress event.
    pub event: HarvestEventKind,
}

/// The specific kind of progress event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HarvestEventKind {
    /// A pipeline stage has started.
    StageStarted { stage: HarvestStage },
    /// A pipeline stage finished.
    StageCompleted { stage: HarvestStage, duration_ms: u64 },
    /// The session navigated to the search page.
    Navigated { url: String },
    /// The estimated number of loaded items after an action.
    ItemsCounted {
        count: usize,
        target: usize,
        iteration: u32,
    },
    /// The load-more button was found and clicked.
    LoadMoreClicked,
    /// No load-more button; scrolling only.
    LoadMoreAbsent,
    /// Two consecutive counts were equal.
    Stalled { count: usize },
    /// References were extracted from the grid.
    Extracted { references: usize, skipped: usize },
    /// A single download finished.
    DownloadFinished {
        index: usize,
        ok: bool,
        bytes: Option<u64>,
    },
    /// The whole harvest completed.
    HarvestComplete {
        saved: usize,
        failed: usize,
        elapsed_ms: u64,
    },
    /// A non-fatal warning occurred.
    Warning { message: String },
}

/// Identifies which pipeline stage is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HarvestStage {
    /// Open the search page and wait for the grid.
    Navigate,
    /// Click load-more and scroll until the target or a stall.
    Reveal,
    /// Walk the grid for image URLs.
    Extract,
    /// Download the images.
    Fetch,
}

impl std::fmt::Display for HarvestStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Navigate => write!(f, "Navigate"),
            Self::Reveal => write!(f, "Reveal"),
            Self::Extract => write!(f, "Extract"),
            Self::Fetch => write!(f, "Fetch"),
        }
    }
}

/// Sender handle for emitting progress events.
pub type ProgressSender = tokio::sync::broadcast::Sender<HarvestEvent>;

/// Receiver handle for consuming progress events.
pub type ProgressReceiver = tokio::sync::broadcast::Receiver<HarvestEvent>;

/// Create a new progress broadcast channel with a bounded buffer.
///
/// 256 events covers a typical run (a handful of stage events, one count
/// per scroll, one event per download).
pub fn channel() -> (ProgressSender, ProgressReceiver) {
    tokio::sync::broadcast::channel(256)
}

/// Emits events for one run, numbering them in order.
#[derive(Debug)]
pub struct ProgressReporter {
    tx: Option<ProgressSender>,
    run_id: String,
    seq: AtomicU64,
}

impl ProgressReporter {
    pub fn new(tx: Option<ProgressSender>, run_id: &str) -> Self {
        Self {
            tx,
            run_id: run_id.to_string(),
            seq: AtomicU64::new(0),
        }
    }

    /// A reporter that drops everything.
    pub fn disabled() -> Self {
        Self::new(None, "")
    }

    /// Emit an event, ignoring send errors (no receivers listening).
    pub fn emit(&self, event: HarvestEventKind) {
        if let Some(ref sender) = self.tx {
            let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
            let _ = sender.send(HarvestEvent {
                run_id: self.run_id.clone(),
                seq,
                event,
            });
        }
    }
}
