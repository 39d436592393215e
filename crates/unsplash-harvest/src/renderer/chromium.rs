// Copyright 2026 Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Chromium-based renderer using chromiumoxide.

use super::{DomElement, NavigationResult, RenderContext, Renderer, IS_VISIBLE_JS};
use crate::config::HarvestConfig;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, Headers, SetExtraHttpHeadersParams,
};
use chromiumoxide::element::Element;
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    // 1. HARVEST_CHROMIUM_PATH env
    if let Ok(p) = std::env::var("HARVEST_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. ~/.cache/unsplash-harvest/chromium/
    if let Some(cache) = dirs::cache_dir() {
        let root = cache.join("unsplash-harvest/chromium");
        let candidates = if cfg!(target_os = "macos") {
            vec![
                root.join("chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                root.join("chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
            ]
        } else {
            vec![root.join("chrome-linux64/chrome"), root.join("chrome")]
        };
        for c in candidates {
            if c.exists() {
                return Some(c);
            }
        }
    }

    // 3. System PATH
    for name in ["google-chrome", "google-chrome-stable", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 4. Common macOS location
    if cfg!(target_os = "macos") {
        let common =
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Chromium-based renderer.
pub struct ChromiumRenderer {
    browser: Browser,
    active_count: Arc<AtomicUsize>,
    extra_headers: serde_json::Value,
}

impl ChromiumRenderer {
    /// Launch Chromium configured from the harvest settings.
    pub async fn launch(config: &HarvestConfig) -> Result<Self> {
        let chrome_path = config
            .chromium_path
            .clone()
            .or_else(find_chromium)
            .context("Chromium not found. Set HARVEST_CHROMIUM_PATH or install Chrome.")?;

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .window_size(config.window_width, config.window_height)
            .arg(format!("--user-agent={}", config.user_agent))
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions");
        if !config.headless {
            builder = builder.with_head();
        }
        let browser_config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .context("failed to launch Chromium")?;

        // Spawn the handler task
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        let extra_headers = serde_json::to_value(&config.extra_headers)?;
        tracing::info!(headless = config.headless, "Chromium launched");

        Ok(Self {
            browser,
            active_count: Arc::new(AtomicUsize::new(0)),
            extra_headers,
        })
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .context("failed to create new page")?;

        page.execute(EnableParams::default())
            .await
            .context("failed to enable network domain")?;
        page.execute(SetExtraHttpHeadersParams::new(Headers::new(
            self.extra_headers.clone(),
        )))
        .await
        .context("failed to set extra HTTP headers")?;

        self.active_count.fetch_add(1, Ordering::Relaxed);

        Ok(Box::new(ChromiumContext {
            page,
            active_count: Arc::clone(&self.active_count),
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        // Browser is dropped when ChromiumRenderer is dropped
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }
}

/// A single Chromium page context.
pub struct ChromiumContext {
    page: Page,
    active_count: Arc<AtomicUsize>,
}

fn wrap(elements: Vec<Element>) -> Vec<Box<dyn DomElement>> {
    elements
        .into_iter()
        .map(|element| Box::new(ChromiumElement { element }) as Box<dyn DomElement>)
        .collect()
}

#[async_trait]
impl RenderContext for ChromiumContext {
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult> {
        let start = Instant::now();

        let result = tokio::time::timeout(
            std::time::Duration::from_millis(timeout_ms),
            self.page.goto(url),
        )
        .await;

        let load_time_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(_)) => {
                let final_url = self
                    .page
                    .url()
                    .await
                    .unwrap_or_default()
                    .map(|u| u.to_string())
                    .unwrap_or_else(|| url.to_string());

                Ok(NavigationResult {
                    final_url,
                    load_time_ms,
                })
            }
            Ok(Err(e)) => bail!("navigation failed: {e}"),
            Err(_) => bail!("navigation timed out after {timeout_ms}ms"),
        }
    }

    async fn find_elements(&self, path: &str) -> Result<Vec<Box<dyn DomElement>>> {
        let elements = self
            .page
            .find_elements(path)
            .await
            .with_context(|| format!("query failed: {path}"))?;
        Ok(wrap(elements))
    }

    async fn scroll_by(&self, delta_px: i64) -> Result<()> {
        self.execute_js(&format!("window.scrollBy(0, {delta_px}); window.scrollY"))
            .await
            .context("scroll failed")?;
        Ok(())
    }

    async fn execute_js(&self, script: &str) -> Result<serde_json::Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .context("JS execution failed")?;

        result
            .into_value()
            .map_err(|e| anyhow::anyhow!("failed to convert JS result: {e:?}"))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.active_count.fetch_sub(1, Ordering::Relaxed);
        let _ = self.page.close().await;
        Ok(())
    }
}

/// A Chromium DOM node handle.
pub struct ChromiumElement {
    element: Element,
}

#[async_trait]
impl DomElement for ChromiumElement {
    async fn find_elements(&self, path: &str) -> Result<Vec<Box<dyn DomElement>>> {
        // A node with no matching descendants is not an error here
        match self.element.find_elements(path).await {
            Ok(elements) => Ok(wrap(elements)),
            Err(chromiumoxide::error::CdpError::NotFound) => Ok(Vec::new()),
            Err(e) => Err(anyhow::anyhow!("relative query `{path}` failed: {e}")),
        }
    }

    async fn attribute(&self, name: &str) -> Result<Option<String>> {
        self.element
            .attribute(name)
            .await
            .with_context(|| format!("failed to read attribute `{name}`"))
    }

    async fn is_visible(&self) -> Result<bool> {
        let value = self.call_script(IS_VISIBLE_JS).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn call_script(&self, function: &str) -> Result<serde_json::Value> {
        let returns = self
            .element
            .call_js_fn(function, false)
            .await
            .context("element script failed")?;
        Ok(returns.result.value.unwrap_or(serde_json::Value::Null))
    }
}
