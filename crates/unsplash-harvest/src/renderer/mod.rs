// Copyright 2026 Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Renderer abstraction for browser-based page rendering.
//!
//! Defines the `Renderer`, `RenderContext` and `DomElement` traits that
//! abstract over the browser engine (Chromium via chromiumoxide, or the
//! in-process fixture used by tests). The harvest pipeline only ever talks
//! to these traits.

pub mod chromium;
pub mod fixture;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Function declaration that scrolls the receiver element into view.
pub const SCROLL_INTO_VIEW_JS: &str = "function() { this.scrollIntoView(true); }";

/// Function declaration that clicks the receiver element.
pub const CLICK_JS: &str = "function() { this.click(); }";

/// Function declaration reporting whether the receiver is rendered and visible.
pub const IS_VISIBLE_JS: &str = "function() { \
    const r = this.getBoundingClientRect(); \
    const s = window.getComputedStyle(this); \
    return r.width > 0 && r.height > 0 && s.visibility !== 'hidden' && s.display !== 'none'; \
}";

/// Result of navigating to a URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationResult {
    /// The final URL after any redirects.
    pub final_url: String,
    /// Time taken to load the page in milliseconds.
    pub load_time_ms: u64,
}

/// A browser engine that can create rendering contexts.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Create a new browser context (tab).
    async fn new_context(&self) -> Result<Box<dyn RenderContext>>;
    /// Shut down the browser engine.
    async fn shutdown(&self) -> Result<()>;
    /// Number of currently active contexts.
    fn active_contexts(&self) -> usize;
}

/// A single browser context (tab) for rendering pages.
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Navigate to a URL with a timeout.
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult>;
    /// Query the document for elements matching a structural path.
    async fn find_elements(&self, path: &str) -> Result<Vec<Box<dyn DomElement>>>;
    /// Scroll the viewport vertically by `delta_px` pixels.
    async fn scroll_by(&self, delta_px: i64) -> Result<()>;
    /// Execute JavaScript in the page context and return the result.
    async fn execute_js(&self, script: &str) -> Result<serde_json::Value>;
    /// Close this context.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// An opaque handle to a rendered element.
///
/// Handles may go stale once the page mutates; callers re-query from the
/// context after every scroll or click.
#[async_trait]
pub trait DomElement: Send + Sync {
    /// Query elements relative to this one.
    async fn find_elements(&self, path: &str) -> Result<Vec<Box<dyn DomElement>>>;
    /// Read an attribute. `None` when the attribute is absent.
    async fn attribute(&self, name: &str) -> Result<Option<String>>;
    /// Whether the element is rendered with a non-empty box.
    async fn is_visible(&self) -> Result<bool>;
    /// Invoke a function declaration with this element bound to `this`.
    async fn call_script(&self, function: &str) -> Result<serde_json::Value>;
}

/// A no-op renderer used when Chromium is unavailable.
///
/// Every context request fails, which the pipeline reports as a fatal
/// renderer error before touching the output directory.
pub struct NoopRenderer;

#[async_trait]
impl Renderer for NoopRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        Err(anyhow::anyhow!("browser not available"))
    }
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
    fn active_contexts(&self) -> usize {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_renderer_refuses_contexts() {
        let renderer = NoopRenderer;
        assert!(renderer.new_context().await.is_err());
        assert_eq!(renderer.active_contexts(), 0);
        renderer.shutdown().await.unwrap();
    }
}
