// Copyright 2026 Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! The browser session owned by a single harvest.
//!
//! A `SearchSession` wraps one render context together with the settings
//! that drive it. It is created when a harvest starts and must be closed
//! with [`SearchSession::close`] on every exit path; the pipeline does so
//! after the acquisition future finishes, fails or is cancelled.

use crate::config::HarvestConfig;
use crate::error::{HarvestError, HarvestResult};
use crate::renderer::{NavigationResult, RenderContext, Renderer};
use std::time::{Duration, Instant};

/// A live rendering session for one search query.
pub struct SearchSession {
    /// The query this session searches for.
    pub query: String,
    /// The browser context.
    context: Box<dyn RenderContext>,
    /// Budget for navigation and for the results container to appear.
    timeout: Duration,
    /// Pixels per viewport scroll.
    scroll_step_px: i64,
    /// Pause after each scroll.
    scroll_pause: Duration,
    /// When the session was opened.
    created_at: Instant,
}

impl SearchSession {
    /// Open a fresh context on the renderer.
    pub async fn open(
        renderer: &dyn Renderer,
        query: &str,
        config: &HarvestConfig,
    ) -> HarvestResult<Self> {
        let context = renderer
            .new_context()
            .await
            .map_err(|e| HarvestError::BrowserUnavailable(format!("{e:#}")))?;
        tracing::debug!(query, "session opened");
        Ok(Self::new(query, context, config))
    }

    /// Wrap an existing context.
    pub fn new(query: &str, context: Box<dyn RenderContext>, config: &HarvestConfig) -> Self {
        Self {
            query: query.to_string(),
            context,
            timeout: config.wait_timeout(),
            scroll_step_px: config.scroll_step_px,
            scroll_pause: config.scroll_pause(),
            created_at: Instant::now(),
        }
    }

    pub fn context(&self) -> &dyn RenderContext {
        self.context.as_ref()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Navigate within the session's timeout.
    pub async fn navigate(&mut self, url: &str) -> HarvestResult<NavigationResult> {
        let timeout_ms = self.timeout.as_millis() as u64;
        self.context
            .navigate(url, timeout_ms)
            .await
            .map_err(|e| HarvestError::Navigation(format!("{e:#}")))
    }

    /// Scroll one step and wait for content to settle.
    pub async fn scroll_step(&self) -> HarvestResult<()> {
        self.context.scroll_by(self.scroll_step_px).await?;
        tokio::time::sleep(self.scroll_pause).await;
        Ok(())
    }

    /// How long the session has been alive.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Close the session and release the browser context.
    pub async fn close(self) -> HarvestResult<()> {
        let age_ms = self.age().as_millis() as u64;
        self.context.close().await?;
        tracing::info!(query = %self.query, age_ms, "session closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::fixture::{FixtureLayout, FixtureRenderer};
    use crate::renderer::NoopRenderer;

    #[tokio::test]
    async fn test_open_and_close_releases_context() {
        let renderer = FixtureRenderer::new(FixtureLayout::photos(3, 3));
        let config = HarvestConfig::default();
        let mut session = SearchSession::open(&renderer, "cat", &config).await.unwrap();
        assert_eq!(renderer.active_contexts(), 1);

        session
            .navigate("https://unsplash.com/s/photos/cat")
            .await
            .unwrap();
        assert_eq!(session.timeout(), config.wait_timeout());

        session.close().await.unwrap();
        assert_eq!(renderer.active_contexts(), 0);
        assert_eq!(
            renderer.log().navigations,
            vec!["https://unsplash.com/s/photos/cat".to_string()]
        );
    }

    #[tokio::test]
    async fn test_scroll_step_uses_configured_step() {
        let renderer = FixtureRenderer::new(FixtureLayout::photos(3, 3));
        let mut config = HarvestConfig::default();
        config.scroll_step_px = 450;
        config.scroll_pause_ms = 1;
        let session = SearchSession::open(&renderer, "cat", &config).await.unwrap();

        session.scroll_step().await.unwrap();
        session.scroll_step().await.unwrap();
        session.close().await.unwrap();

        let log = renderer.log();
        assert_eq!(log.scrolls, 2);
        assert_eq!(log.scroll_pixels, 900);
    }

    #[tokio::test]
    async fn test_open_without_browser() {
        let err = SearchSession::open(&NoopRenderer, "cat", &HarvestConfig::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, HarvestError::BrowserUnavailable(_)));
    }
}
