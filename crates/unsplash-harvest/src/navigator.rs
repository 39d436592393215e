// Copyright 2026 Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Layout navigator: reveal enough grid items to satisfy a target count.
//!
//! The source has no "end of results" signal. The navigator opens the
//! search page, waits for the grid, clicks the load-more button once if it
//! exists, then scrolls until the estimated item count reaches the target
//! or two consecutive counts are exactly equal (a stall). A stall is a
//! normal outcome; the caller gets whatever was loaded.
//!
//! The count is an estimate: items in the first column times the column
//! fan-out. Columns are filled round-robin, so this can over-count by up to
//! one item per column. It only gates the loop; the extractor decides what
//! is actually returned.

use crate::config::HarvestConfig;
use crate::error::{HarvestError, HarvestResult};
use crate::progress::{HarvestEventKind, HarvestStage, ProgressReporter};
use crate::renderer::{DomElement, CLICK_JS, SCROLL_INTO_VIEW_JS};
use crate::session::SearchSession;
use std::time::Instant;

/// A read-only view of the results container at one point in time.
pub struct LayoutSnapshot {
    container: Box<dyn DomElement>,
    estimated_count: usize,
}

impl LayoutSnapshot {
    pub fn new(container: Box<dyn DomElement>, estimated_count: usize) -> Self {
        Self {
            container,
            estimated_count,
        }
    }

    /// The results container element.
    pub fn container(&self) -> &dyn DomElement {
        self.container.as_ref()
    }

    /// Item count estimated when the snapshot was taken.
    pub fn estimated_count(&self) -> usize {
        self.estimated_count
    }
}

/// Why the reveal loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStop {
    /// The estimated count met the target.
    TargetReached,
    /// A scroll revealed nothing new (or the iteration cap was hit).
    Stalled,
}

/// Result of [`LayoutNavigator::load`].
pub struct LoadOutcome {
    pub snapshot: LayoutSnapshot,
    /// Final estimated item count.
    pub count: usize,
    /// Scroll iterations performed.
    pub scrolls: u32,
    /// Whether the load-more button was clicked.
    pub load_more_clicked: bool,
    pub stop: LoadStop,
}

/// Drives one search session until enough items are rendered.
pub struct LayoutNavigator<'a> {
    session: &'a mut SearchSession,
    config: &'a HarvestConfig,
    progress: &'a ProgressReporter,
}

impl<'a> LayoutNavigator<'a> {
    pub fn new(
        session: &'a mut SearchSession,
        config: &'a HarvestConfig,
        progress: &'a ProgressReporter,
    ) -> Self {
        Self {
            session,
            config,
            progress,
        }
    }

    /// Open the search page and reveal at least `target` items if the
    /// source has them.
    pub async fn load(&mut self, target: usize) -> HarvestResult<LoadOutcome> {
        let started = Instant::now();
        self.progress.emit(HarvestEventKind::StageStarted {
            stage: HarvestStage::Navigate,
        });

        let url = self.config.search_url(&self.session.query);
        let nav = self.session.navigate(&url).await?;
        tracing::info!("navigated to {} in {}ms", nav.final_url, nav.load_time_ms);
        self.progress
            .emit(HarvestEventKind::Navigated { url: nav.final_url });

        self.wait_for_grid().await?;
        self.stage_completed(HarvestStage::Navigate, started);

        let started = Instant::now();
        self.progress.emit(HarvestEventKind::StageStarted {
            stage: HarvestStage::Reveal,
        });

        let mut count = self.count_items().await?;
        tracing::info!("initially loaded {count} images");
        self.progress.emit(HarvestEventKind::ItemsCounted {
            count,
            target,
            iteration: 0,
        });

        let mut scrolls = 0;
        let mut load_more_clicked = false;
        let mut stop = LoadStop::TargetReached;

        if count < target {
            load_more_clicked = self.reveal_more().await?;
            let (final_count, iterations, reason) = self.scroll_until(target).await?;
            count = final_count;
            scrolls = iterations;
            stop = reason;
        }

        let container = self.container().await?.ok_or_else(|| {
            HarvestError::Renderer("results container disappeared".to_string())
        })?;
        self.stage_completed(HarvestStage::Reveal, started);

        Ok(LoadOutcome {
            snapshot: LayoutSnapshot::new(container, count),
            count,
            scrolls,
            load_more_clicked,
            stop,
        })
    }

    /// Wait until the container and all of its columns are visible.
    async fn wait_for_grid(&self) -> HarvestResult<()> {
        let timeout = self.session.timeout();
        let poll = self.config.poll_interval();
        let mut last_error: Option<String> = None;

        let ready = tokio::time::timeout(timeout, async {
            loop {
                match self.grid_visible().await {
                    Ok(true) => return,
                    Ok(false) => {}
                    Err(e) => {
                        let message = e.to_string();
                        if last_error.as_deref() != Some(message.as_str()) {
                            tracing::warn!("grid check failed: {message}");
                        }
                        last_error = Some(message);
                    }
                }
                tokio::time::sleep(poll).await;
            }
        })
        .await;

        match ready {
            Ok(()) => Ok(()),
            Err(_) => {
                tracing::error!(
                    "timeout while loading page: `{}` not visible after {}ms",
                    self.config.selectors.container,
                    timeout.as_millis()
                );
                Err(HarvestError::PageLoadTimeout {
                    selector: self.config.selectors.container.clone(),
                    timeout_ms: timeout.as_millis() as u64,
                    last_error,
                })
            }
        }
    }

    async fn grid_visible(&self) -> HarvestResult<bool> {
        let Some(container) = self.container().await? else {
            return Ok(false);
        };
        if !container.is_visible().await? {
            return Ok(false);
        }
        let columns = container
            .find_elements(&self.config.selectors.children)
            .await?;
        if columns.is_empty() {
            return Ok(false);
        }
        for column in &columns {
            if !column.is_visible().await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Re-query the results container from the page.
    async fn container(&self) -> HarvestResult<Option<Box<dyn DomElement>>> {
        let mut found = self
            .session
            .context()
            .find_elements(&self.config.selectors.container)
            .await?;
        if found.is_empty() {
            return Ok(None);
        }
        Ok(Some(found.swap_remove(0)))
    }

    /// Items in the first column times the column fan-out.
    pub async fn count_items(&self) -> HarvestResult<usize> {
        let Some(container) = self.container().await? else {
            return Ok(0);
        };
        let children = &self.config.selectors.children;
        let columns = container.find_elements(children).await?;
        let Some(first) = columns.first() else {
            return Ok(0);
        };
        let items = first.find_elements(children).await?;
        Ok(items.len() * self.config.column_count)
    }

    /// Click the load-more button once if the page has one.
    ///
    /// Returns whether it was clicked. A missing button is normal: the page
    /// has already switched to pure infinite scroll.
    async fn reveal_more(&self) -> HarvestResult<bool> {
        let buttons = self
            .session
            .context()
            .find_elements(&self.config.selectors.load_more)
            .await?;
        let Some(button) = buttons.first() else {
            tracing::warn!("'Load More' button not found, will try scrolling");
            self.progress.emit(HarvestEventKind::LoadMoreAbsent);
            return Ok(false);
        };

        let pause = self.config.reveal_pause();
        button.call_script(SCROLL_INTO_VIEW_JS).await?;
        tokio::time::sleep(pause).await;
        button.call_script(CLICK_JS).await?;
        tokio::time::sleep(pause).await;

        tracing::info!("clicked 'Load More' button");
        self.progress.emit(HarvestEventKind::LoadMoreClicked);
        Ok(true)
    }

    /// Scroll until the count reaches `target` or stops changing.
    async fn scroll_until(&self, target: usize) -> HarvestResult<(usize, u32, LoadStop)> {
        let mut current = self.count_items().await?;
        let mut iterations: u32 = 0;

        while current < target {
            if let Some(cap) = self.config.max_scroll_iterations {
                if iterations >= cap {
                    tracing::warn!("stopped at {current} images after {cap} scrolls");
                    self.progress
                        .emit(HarvestEventKind::Stalled { count: current });
                    return Ok((current, iterations, LoadStop::Stalled));
                }
            }

            self.session.scroll_step().await?;
            iterations += 1;

            let next = self.count_items().await?;
            self.progress.emit(HarvestEventKind::ItemsCounted {
                count: next,
                target,
                iteration: iterations,
            });

            if next == current {
                tracing::warn!("stopped at {current} images - no more available");
                self.progress
                    .emit(HarvestEventKind::Stalled { count: current });
                return Ok((current, iterations, LoadStop::Stalled));
            }

            current = next;
            tracing::debug!("loaded {current} images...");
        }

        Ok((current, iterations, LoadStop::TargetReached))
    }

    fn stage_completed(&self, stage: HarvestStage, started: Instant) {
        self.progress.emit(HarvestEventKind::StageCompleted {
            stage,
            duration_ms: started.elapsed().as_millis() as u64,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress;
    use crate::renderer::fixture::{FixtureLayout, FixtureRenderer};
    use crate::renderer::{NavigationResult, RenderContext, Renderer};

    fn fast_config() -> HarvestConfig {
        HarvestConfig {
            wait_timeout_ms: 200,
            poll_interval_ms: 1,
            scroll_pause_ms: 0,
            reveal_pause_ms: 0,
            ..HarvestConfig::default()
        }
    }

    async fn run(
        renderer: &FixtureRenderer,
        config: &HarvestConfig,
        target: usize,
    ) -> HarvestResult<LoadOutcome> {
        let mut session = SearchSession::open(renderer, "cat", config).await?;
        let reporter = ProgressReporter::disabled();
        let result = LayoutNavigator::new(&mut session, config, &reporter)
            .load(target)
            .await;
        session.close().await?;
        result
    }

    #[tokio::test]
    async fn test_enough_items_on_first_render() {
        let renderer = FixtureRenderer::new(FixtureLayout::photos(30, 3));
        let outcome = run(&renderer, &fast_config(), 9).await.unwrap();

        assert_eq!(outcome.stop, LoadStop::TargetReached);
        assert_eq!(outcome.count, 30);
        assert_eq!(outcome.scrolls, 0);
        assert!(!outcome.load_more_clicked);
        assert_eq!(renderer.log().clicks, 0);
        assert_eq!(
            renderer.log().navigations,
            vec!["https://unsplash.com/s/photos/cat?license=free".to_string()]
        );
    }

    #[tokio::test]
    async fn test_load_more_then_scroll_to_target() {
        let layout = FixtureLayout::photos(30, 3)
            .initial_rows(1)
            .load_more(1)
            .steady_growth(1, 10);
        let renderer = FixtureRenderer::new(layout);
        let outcome = run(&renderer, &fast_config(), 12).await.unwrap();

        assert!(outcome.load_more_clicked);
        assert_eq!(outcome.stop, LoadStop::TargetReached);
        assert_eq!(outcome.count, 12);
        assert_eq!(outcome.scrolls, 2);
        let log = renderer.log();
        assert_eq!(log.clicks, 1);
        assert_eq!(log.scrolled_into_view, 1);
        assert_eq!(log.scroll_pixels, 600);
    }

    #[tokio::test]
    async fn test_stalls_when_source_is_exhausted() {
        let layout = FixtureLayout::photos(9, 3)
            .initial_rows(1)
            .steady_growth(1, 5);
        let renderer = FixtureRenderer::new(layout);
        let outcome = run(&renderer, &fast_config(), 10).await.unwrap();

        assert_eq!(outcome.stop, LoadStop::Stalled);
        assert_eq!(outcome.count, 9);
        assert_eq!(outcome.scrolls, 3);
        assert!(!outcome.load_more_clicked);
        assert_eq!(outcome.snapshot.estimated_count(), 9);
        assert_eq!(renderer.active_contexts(), 0);
    }

    #[tokio::test]
    async fn test_single_item_growth_is_not_a_stall() {
        let layout = FixtureLayout::photos(5, 1)
            .initial_rows(1)
            .steady_growth(1, 4);
        let renderer = FixtureRenderer::new(layout);
        let config = HarvestConfig {
            column_count: 1,
            ..fast_config()
        };
        let outcome = run(&renderer, &config, 5).await.unwrap();

        assert_eq!(outcome.stop, LoadStop::TargetReached);
        assert_eq!(outcome.count, 5);
        assert_eq!(outcome.scrolls, 4);
    }

    #[tokio::test]
    async fn test_iteration_cap_reports_stall() {
        let layout = FixtureLayout::photos(300, 3)
            .initial_rows(1)
            .steady_growth(1, 100);
        let renderer = FixtureRenderer::new(layout);
        let config = HarvestConfig {
            max_scroll_iterations: Some(2),
            ..fast_config()
        };
        let outcome = run(&renderer, &config, 100).await.unwrap();

        assert_eq!(outcome.stop, LoadStop::Stalled);
        assert_eq!(outcome.scrolls, 2);
        assert_eq!(outcome.count, 9);
    }

    #[tokio::test]
    async fn test_container_never_visible_times_out() {
        let renderer = FixtureRenderer::new(FixtureLayout::never_loads());
        let config = HarvestConfig {
            wait_timeout_ms: 30,
            ..fast_config()
        };
        let err = run(&renderer, &config, 5).await.err().unwrap();

        match err {
            HarvestError::PageLoadTimeout {
                selector,
                timeout_ms,
                last_error,
            } => {
                assert_eq!(selector, config.selectors.container);
                assert_eq!(timeout_ms, 30);
                assert_eq!(last_error, None);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(renderer.log().scrolls, 0);
        assert_eq!(renderer.active_contexts(), 0);
    }

    /// A page whose DOM queries always fail, as after a browser crash.
    struct DisconnectedContext;

    #[async_trait::async_trait]
    impl RenderContext for DisconnectedContext {
        async fn navigate(&mut self, url: &str, _timeout_ms: u64) -> anyhow::Result<NavigationResult> {
            Ok(NavigationResult {
                final_url: url.to_string(),
                load_time_ms: 0,
            })
        }

        async fn find_elements(&self, _path: &str) -> anyhow::Result<Vec<Box<dyn DomElement>>> {
            anyhow::bail!("browser connection lost")
        }

        async fn scroll_by(&self, _delta_px: i64) -> anyhow::Result<()> {
            Ok(())
        }

        async fn execute_js(&self, _script: &str) -> anyhow::Result<serde_json::Value> {
            Ok(serde_json::Value::Null)
        }

        async fn close(self: Box<Self>) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_timeout_reports_last_renderer_error() {
        let config = HarvestConfig {
            wait_timeout_ms: 20,
            ..fast_config()
        };
        let mut session = SearchSession::new("cat", Box::new(DisconnectedContext), &config);
        let reporter = ProgressReporter::disabled();

        let err = LayoutNavigator::new(&mut session, &config, &reporter)
            .load(5)
            .await
            .err()
            .unwrap();

        match &err {
            HarvestError::PageLoadTimeout { last_error, .. } => {
                assert_eq!(
                    last_error.as_deref(),
                    Some("renderer error: browser connection lost")
                );
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("browser connection lost"));
    }

    #[tokio::test]
    async fn test_progress_events_follow_the_loop() {
        let layout = FixtureLayout::photos(6, 3)
            .initial_rows(1)
            .steady_growth(1, 3);
        let renderer = FixtureRenderer::new(layout);
        let config = fast_config();
        let (tx, mut rx) = progress::channel();
        let reporter = ProgressReporter::new(Some(tx), "run-nav");

        let mut session = SearchSession::open(&renderer, "cat", &config).await.unwrap();
        LayoutNavigator::new(&mut session, &config, &reporter)
            .load(9)
            .await
            .unwrap();
        session.close().await.unwrap();

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(event.event);
        }
        assert!(kinds.contains(&HarvestEventKind::LoadMoreAbsent));
        assert!(kinds.contains(&HarvestEventKind::Stalled { count: 6 }));
        assert!(kinds.contains(&HarvestEventKind::ItemsCounted {
            count: 3,
            target: 9,
            iteration: 0
        }));
    }
}
