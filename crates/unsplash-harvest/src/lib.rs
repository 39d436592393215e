// Copyright 2026 Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Unsplash harvest library: scroll-driven image acquisition.
//!
//! A [`Harvester`] drives a rendered search page until enough results are
//! revealed, walks the masonry grid for image URLs and downloads them.
//! The browser sits behind the [`renderer::Renderer`] trait so the whole
//! pipeline also runs against the in-process fixture renderer.

pub mod cli;
pub mod config;
pub mod error;
pub mod extractor;
pub mod fetcher;
pub mod harvest;
pub mod http_client;
pub mod navigator;
pub mod progress;
pub mod renderer;
pub mod session;

pub use config::HarvestConfig;
pub use error::{HarvestError, HarvestResult};
pub use fetcher::{DownloadResult, DownloadStatus};
pub use harvest::{HarvestOutcome, HarvestReport, HarvestRequest, Harvester};
