// Copyright 2026 Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Harvest configuration.
//!
//! Resolution order: built-in defaults, then an optional JSON file, then
//! `HARVEST_*` environment variables, then whatever the CLI overrides.
//! The resolved value is passed explicitly through the navigator,
//! extractor and fetcher; nothing here is global.

use crate::error::{HarvestError, HarvestResult};
use crate::extractor::path::CardPath;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_SEARCH_URL: &str = "https://unsplash.com/s/photos/{query}?license=free";
pub const DEFAULT_CONTAINER_SELECTOR: &str = "div[data-testid='masonry-grid-count-three']";
pub const DEFAULT_LOAD_MORE_SELECTOR: &str = "div[class^='loadMoreButtonContainer-'] button";
pub const DEFAULT_CARD_PATH: &str = r#"*[class="container-WSKyvi"] / * / * / * @src"#;
/// Relative path selecting the immediate element children of a node.
pub const CHILDREN_SELECTOR: &str = ":scope > *";

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) Chrome/121 Safari/537.36";
const DEFAULT_COLUMN_COUNT: usize = 3;
const DEFAULT_WAIT_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_POLL_INTERVAL_MS: u64 = 250;
const DEFAULT_SCROLL_STEP_PX: i64 = 300;
const DEFAULT_SCROLL_PAUSE_MS: u64 = 300;
const DEFAULT_REVEAL_PAUSE_MS: u64 = 2_000;
const DEFAULT_DOWNLOAD_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_DOWNLOAD_CONCURRENCY: usize = 4;
const MAX_DOWNLOAD_CONCURRENCY: usize = 8;
const DEFAULT_DOWNLOAD_RETRIES: u32 = 2;
const MAX_DOWNLOAD_RETRIES: u32 = 10;

/// Structural selectors for the search results page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Selectors {
    /// The masonry grid holding the result columns.
    pub container: String,
    /// The optional "load more" button.
    pub load_more: String,
    /// Relative path from a node to its immediate children.
    pub children: String,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            container: DEFAULT_CONTAINER_SELECTOR.to_string(),
            load_more: DEFAULT_LOAD_MORE_SELECTOR.to_string(),
            children: CHILDREN_SELECTOR.to_string(),
        }
    }
}

/// Every tunable of a harvest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Search URL with a `{query}` placeholder.
    pub search_url_template: String,
    pub selectors: Selectors,
    /// Descent chain from an item node to the image source attribute.
    pub card_path: CardPath,
    /// Number of parallel columns the layout renders.
    pub column_count: usize,
    /// Budget for the results container to become visible.
    pub wait_timeout_ms: u64,
    /// How often the container wait re-checks the page.
    pub poll_interval_ms: u64,
    /// Pixels scrolled per convergence iteration.
    pub scroll_step_px: i64,
    /// Pause after each scroll.
    pub scroll_pause_ms: u64,
    /// Pause around the load-more click.
    pub reveal_pause_ms: u64,
    /// Optional cap on convergence iterations. `None` means unlimited.
    pub max_scroll_iterations: Option<u32>,
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
    pub user_agent: String,
    /// Extra request headers sent by the browser and the downloader.
    pub extra_headers: BTreeMap<String, String>,
    /// Explicit Chromium binary; otherwise discovered.
    pub chromium_path: Option<PathBuf>,
    pub download_timeout_ms: u64,
    pub download_concurrency: usize,
    pub download_retries: u32,
    pub file_prefix: String,
    pub file_extension: String,
    /// Zero-padding width of the file index.
    pub index_width: usize,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        let mut extra_headers = BTreeMap::new();
        extra_headers.insert("Accept-Language".to_string(), "en-US,en;q=0.9".to_string());
        extra_headers.insert("Referer".to_string(), "https://www.google.com/".to_string());

        Self {
            search_url_template: DEFAULT_SEARCH_URL.to_string(),
            selectors: Selectors::default(),
            card_path: CardPath::default(),
            column_count: DEFAULT_COLUMN_COUNT,
            wait_timeout_ms: DEFAULT_WAIT_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            scroll_step_px: DEFAULT_SCROLL_STEP_PX,
            scroll_pause_ms: DEFAULT_SCROLL_PAUSE_MS,
            reveal_pause_ms: DEFAULT_REVEAL_PAUSE_MS,
            max_scroll_iterations: None,
            headless: true,
            window_width: 1920,
            window_height: 1080,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            extra_headers,
            chromium_path: None,
            download_timeout_ms: DEFAULT_DOWNLOAD_TIMEOUT_MS,
            download_concurrency: DEFAULT_DOWNLOAD_CONCURRENCY,
            download_retries: DEFAULT_DOWNLOAD_RETRIES,
            file_prefix: "img".to_string(),
            file_extension: "jpg".to_string(),
            index_width: 4,
        }
    }
}

impl HarvestConfig {
    /// Defaults, then the optional JSON file, then environment overrides.
    pub fn resolve(file: Option<&Path>) -> HarvestResult<Self> {
        let mut config = match file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON config file. Missing keys take their defaults.
    pub fn from_file(path: &Path) -> HarvestResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            HarvestError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&raw)?;
        Ok(config)
    }

    /// Apply `HARVEST_*` environment overrides in place.
    pub fn apply_env(&mut self) {
        if let Some(template) = read_env_string("HARVEST_SEARCH_URL") {
            self.search_url_template = template;
        }
        if let Some(path) = read_env_string("HARVEST_CHROMIUM_PATH") {
            self.chromium_path = Some(PathBuf::from(path));
        }
        if let Some(ua) = read_env_string("HARVEST_USER_AGENT") {
            self.user_agent = ua;
        }
        self.wait_timeout_ms = read_env_u64("HARVEST_WAIT_TIMEOUT_MS", self.wait_timeout_ms);
        self.scroll_pause_ms = read_env_u64("HARVEST_SCROLL_PAUSE_MS", self.scroll_pause_ms);
        self.reveal_pause_ms = read_env_u64("HARVEST_REVEAL_PAUSE_MS", self.reveal_pause_ms);
        self.scroll_step_px = read_env_u64("HARVEST_SCROLL_STEP_PX", self.scroll_step_px as u64) as i64;
        self.download_timeout_ms =
            read_env_u64("HARVEST_DOWNLOAD_TIMEOUT_MS", self.download_timeout_ms);
        self.download_concurrency =
            read_env_u64("HARVEST_CONCURRENCY", self.download_concurrency as u64) as usize;
        self.download_retries = read_env_u64("HARVEST_RETRIES", self.download_retries as u64) as u32;
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> HarvestResult<()> {
        if !self.search_url_template.contains("{query}") {
            return Err(HarvestError::Config(
                "search_url_template must contain a {query} placeholder".into(),
            ));
        }
        if self.column_count == 0 {
            return Err(HarvestError::Config("column_count must be positive".into()));
        }
        if self.scroll_step_px == 0 {
            return Err(HarvestError::Config("scroll_step_px must be non-zero".into()));
        }
        if self.download_concurrency == 0 || self.download_concurrency > MAX_DOWNLOAD_CONCURRENCY {
            return Err(HarvestError::Config(format!(
                "download_concurrency must be between 1 and {MAX_DOWNLOAD_CONCURRENCY}"
            )));
        }
        if self.download_retries > MAX_DOWNLOAD_RETRIES {
            return Err(HarvestError::Config(format!(
                "download_retries must be at most {MAX_DOWNLOAD_RETRIES}"
            )));
        }
        if self.file_extension.is_empty() || self.file_extension.contains('/') {
            return Err(HarvestError::Config("file_extension is invalid".into()));
        }
        Ok(())
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn scroll_pause(&self) -> Duration {
        Duration::from_millis(self.scroll_pause_ms)
    }

    pub fn reveal_pause(&self) -> Duration {
        Duration::from_millis(self.reveal_pause_ms)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_millis(self.download_timeout_ms)
    }

    /// Build the search URL for a query, percent-encoding it.
    pub fn search_url(&self, query: &str) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(query.trim().as_bytes()).collect();
        // form encoding turns spaces into '+', which the path segment would keep literally
        let encoded = encoded.replace('+', "%20");
        self.search_url_template.replace("{query}", &encoded)
    }

    /// Deterministic filename for a 1-based index, e.g. `img_0007.jpg`.
    pub fn file_name(&self, index: usize) -> String {
        format!(
            "{}_{:0width$}.{}",
            self.file_prefix,
            index,
            self.file_extension,
            width = self.index_width
        )
    }
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn read_env_u64(name: &str, default: u64) -> u64 {
    read_env_string(name)
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}
