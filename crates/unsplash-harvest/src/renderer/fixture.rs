// Copyright 2026 Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Deterministic in-process renderer that simulates an infinite-scroll
//! masonry grid.
//!
//! The fixture models a results container with parallel columns whose
//! items are revealed row by row: an initial batch after navigation, a
//! batch per load-more click and a scheduled batch per viewport scroll.
//! Once every row is revealed further scrolls change nothing, which is
//! exactly what a stalled source looks like. All actions are recorded in
//! a shared [`FixtureLog`] so tests can assert on them after the session
//! is gone.

use super::{
    DomElement, NavigationResult, RenderContext, Renderer, CLICK_JS, IS_VISIBLE_JS,
    SCROLL_INTO_VIEW_JS,
};
use crate::config::Selectors;
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};

/// Class marker carried by genuine photo cards.
pub const PHOTO_MARKER: &str = "container-WSKyvi";

/// Class marker carried by sponsored cards sharing the outer shape.
pub const SPONSORED_MARKER: &str = "sponsored-Q2mBf";

/// Number of wrapper levels below an item node in a complete card.
const CARD_DEPTH: usize = 4;

/// What a single grid item looks like.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixtureCard {
    /// A genuine photo card with its image source.
    Photo(String),
    /// An ad card: full depth, wrong marker.
    Sponsored(String),
    /// A photo card whose wrapper chain stops after `depth` levels.
    Truncated { depth: usize },
    /// A photo card whose image has an empty source.
    Blank,
}

impl FixtureCard {
    fn depth(&self) -> usize {
        match self {
            FixtureCard::Truncated { depth } => (*depth).min(CARD_DEPTH),
            _ => CARD_DEPTH,
        }
    }

    fn marker(&self) -> &'static str {
        match self {
            FixtureCard::Sponsored(_) => SPONSORED_MARKER,
            _ => PHOTO_MARKER,
        }
    }

    fn source(&self) -> Option<String> {
        match self {
            FixtureCard::Photo(src) | FixtureCard::Sponsored(src) => Some(src.clone()),
            FixtureCard::Blank => Some(String::new()),
            FixtureCard::Truncated { .. } => None,
        }
    }
}

/// Image URL the fixture assigns to the `n`th photo (0-based).
pub fn photo_url(n: usize) -> String {
    format!("https://images.fixture.test/photo-{n:03}.jpg")
}

/// Static description of a simulated results page.
#[derive(Debug, Clone)]
pub struct FixtureLayout {
    /// Items per column, top to bottom.
    pub columns: Vec<Vec<FixtureCard>>,
    /// Rows visible right after navigation.
    pub initial_rows: usize,
    /// Rows revealed by the n-th scroll; scrolls past the end reveal nothing.
    pub scroll_growth: Vec<usize>,
    /// Rows revealed when the load-more button is clicked, if it exists.
    pub load_more_rows: Option<usize>,
    /// When false the results container never renders.
    pub container_ready: bool,
}

impl FixtureLayout {
    /// `total` photos dealt round-robin across `columns` columns.
    pub fn photos(total: usize, columns: usize) -> Self {
        Self::photos_from((0..total).map(photo_url), columns)
    }

    /// Photo cards with the given sources, dealt round-robin.
    pub fn photos_from(urls: impl IntoIterator<Item = String>, columns: usize) -> Self {
        let mut grid = vec![Vec::new(); columns.max(1)];
        let len = grid.len();
        for (n, url) in urls.into_iter().enumerate() {
            grid[n % len].push(FixtureCard::Photo(url));
        }
        Self::from_columns(grid)
    }

    /// Explicit column contents, everything revealed up front.
    pub fn from_columns(columns: Vec<Vec<FixtureCard>>) -> Self {
        let rows = columns.iter().map(Vec::len).max().unwrap_or(0);
        Self {
            columns,
            initial_rows: rows,
            scroll_growth: Vec::new(),
            load_more_rows: None,
            container_ready: true,
        }
    }

    /// A page whose results container never appears.
    pub fn never_loads() -> Self {
        Self {
            container_ready: false,
            ..Self::from_columns(Vec::new())
        }
    }

    pub fn initial_rows(mut self, rows: usize) -> Self {
        self.initial_rows = rows;
        self
    }

    pub fn scroll_growth(mut self, growth: impl Into<Vec<usize>>) -> Self {
        self.scroll_growth = growth.into();
        self
    }

    /// Reveal `rows` per scroll for the first `scrolls` scrolls.
    pub fn steady_growth(self, rows: usize, scrolls: usize) -> Self {
        self.scroll_growth(vec![rows; scrolls])
    }

    pub fn load_more(mut self, rows: usize) -> Self {
        self.load_more_rows = Some(rows);
        self
    }

    fn max_rows(&self) -> usize {
        self.columns.iter().map(Vec::len).max().unwrap_or(0)
    }
}

/// Everything the fixture observed, shared with the test.
#[derive(Debug, Clone, Default)]
pub struct FixtureLog {
    pub navigations: Vec<String>,
    pub scrolls: usize,
    pub scroll_pixels: i64,
    pub clicks: usize,
    pub scrolled_into_view: usize,
    pub contexts_opened: usize,
    pub contexts_closed: usize,
}

#[derive(Debug)]
struct FixtureState {
    layout: FixtureLayout,
    selectors: Selectors,
    loaded: bool,
    revealed_rows: usize,
    scroll_index: usize,
    load_more_used: bool,
    log: FixtureLog,
}

impl FixtureState {
    fn reveal(&mut self, rows: usize) {
        self.revealed_rows = (self.revealed_rows + rows).min(self.layout.max_rows());
    }

    fn visible_in_column(&self, column: usize) -> usize {
        self.layout
            .columns
            .get(column)
            .map(|c| c.len().min(self.revealed_rows))
            .unwrap_or(0)
    }

    fn card(&self, column: usize, row: usize) -> Option<&FixtureCard> {
        if row >= self.visible_in_column(column) {
            return None;
        }
        self.layout.columns.get(column).and_then(|c| c.get(row))
    }

    fn container_present(&self) -> bool {
        self.loaded && self.layout.container_ready
    }

    fn load_more_present(&self) -> bool {
        self.container_present() && self.layout.load_more_rows.is_some() && !self.load_more_used
    }
}

type SharedState = Arc<Mutex<FixtureState>>;

fn lock(state: &SharedState) -> MutexGuard<'_, FixtureState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Renderer over a [`FixtureLayout`].
///
/// Every context shares one page state, mirroring a single browser tab.
pub struct FixtureRenderer {
    state: SharedState,
}

impl FixtureRenderer {
    pub fn new(layout: FixtureLayout) -> Self {
        Self::with_selectors(layout, Selectors::default())
    }

    /// Use custom selectors; the fixture answers only to these paths.
    pub fn with_selectors(layout: FixtureLayout, selectors: Selectors) -> Self {
        Self {
            state: Arc::new(Mutex::new(FixtureState {
                layout,
                selectors,
                loaded: false,
                revealed_rows: 0,
                scroll_index: 0,
                load_more_used: false,
                log: FixtureLog::default(),
            })),
        }
    }

    /// Snapshot of the recorded actions.
    pub fn log(&self) -> FixtureLog {
        lock(&self.state).log.clone()
    }
}

#[async_trait]
impl Renderer for FixtureRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        lock(&self.state).log.contexts_opened += 1;
        Ok(Box::new(FixtureContext {
            state: Arc::clone(&self.state),
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        let state = lock(&self.state);
        state.log.contexts_opened.saturating_sub(state.log.contexts_closed)
    }
}

/// A tab on the fixture page.
pub struct FixtureContext {
    state: SharedState,
}

#[async_trait]
impl RenderContext for FixtureContext {
    async fn navigate(&mut self, url: &str, _timeout_ms: u64) -> Result<NavigationResult> {
        let mut state = lock(&self.state);
        state.log.navigations.push(url.to_string());
        state.loaded = true;
        state.revealed_rows = 0;
        state.scroll_index = 0;
        state.load_more_used = false;
        let initial = state.layout.initial_rows;
        state.reveal(initial);
        Ok(NavigationResult {
            final_url: url.to_string(),
            load_time_ms: 0,
        })
    }

    async fn find_elements(&self, path: &str) -> Result<Vec<Box<dyn DomElement>>> {
        let state = lock(&self.state);
        let node = if path == state.selectors.container && state.container_present() {
            Some(Node::Container)
        } else if path == state.selectors.load_more && state.load_more_present() {
            Some(Node::LoadMore)
        } else {
            None
        };
        Ok(node
            .map(|node| vec![element(&self.state, node)])
            .unwrap_or_default())
    }

    async fn scroll_by(&self, delta_px: i64) -> Result<()> {
        let mut state = lock(&self.state);
        state.log.scrolls += 1;
        state.log.scroll_pixels += delta_px;
        let growth = state
            .layout
            .scroll_growth
            .get(state.scroll_index)
            .copied()
            .unwrap_or(0);
        state.scroll_index += 1;
        state.reveal(growth);
        Ok(())
    }

    async fn execute_js(&self, _script: &str) -> Result<serde_json::Value> {
        Ok(serde_json::Value::Null)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        lock(&self.state).log.contexts_closed += 1;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Node {
    Container,
    LoadMore,
    Column(usize),
    Item { column: usize, row: usize },
    /// Wrapper `level` (1-based) below an item.
    Wrapper { column: usize, row: usize, level: usize },
}

fn element(state: &SharedState, node: Node) -> Box<dyn DomElement> {
    Box::new(FixtureElement {
        state: Arc::clone(state),
        node,
    })
}

/// Handle to a node of the fixture page.
pub struct FixtureElement {
    state: SharedState,
    node: Node,
}

#[async_trait]
impl DomElement for FixtureElement {
    async fn find_elements(&self, path: &str) -> Result<Vec<Box<dyn DomElement>>> {
        let state = lock(&self.state);
        if path != state.selectors.children {
            return Ok(Vec::new());
        }
        let children = match self.node {
            Node::Container => (0..state.layout.columns.len()).map(Node::Column).collect(),
            Node::Column(column) => (0..state.visible_in_column(column))
                .map(|row| Node::Item { column, row })
                .collect(),
            Node::Item { column, row } => match state.card(column, row) {
                Some(card) if card.depth() >= 1 => vec![Node::Wrapper {
                    column,
                    row,
                    level: 1,
                }],
                Some(_) => Vec::new(),
                None => bail!("stale element reference"),
            },
            Node::Wrapper { column, row, level } => match state.card(column, row) {
                Some(card) if card.depth() > level => vec![Node::Wrapper {
                    column,
                    row,
                    level: level + 1,
                }],
                Some(_) => Vec::new(),
                None => bail!("stale element reference"),
            },
            Node::LoadMore => Vec::new(),
        };
        Ok(children
            .into_iter()
            .map(|node| element(&self.state, node))
            .collect())
    }

    async fn attribute(&self, name: &str) -> Result<Option<String>> {
        let state = lock(&self.state);
        let value = match (self.node, name) {
            (Node::Wrapper { column, row, level: 1 }, "class") => {
                state.card(column, row).map(|c| c.marker().to_string())
            }
            (Node::Wrapper { column, row, level }, "src") if level == CARD_DEPTH => {
                state.card(column, row).and_then(FixtureCard::source)
            }
            _ => None,
        };
        Ok(value)
    }

    async fn is_visible(&self) -> Result<bool> {
        let state = lock(&self.state);
        Ok(match self.node {
            Node::Container | Node::Column(_) => state.container_present(),
            Node::LoadMore => state.load_more_present(),
            Node::Item { column, row } | Node::Wrapper { column, row, .. } => {
                state.card(column, row).is_some()
            }
        })
    }

    async fn call_script(&self, function: &str) -> Result<serde_json::Value> {
        if function == IS_VISIBLE_JS {
            return Ok(serde_json::Value::Bool(self.is_visible().await?));
        }
        let mut state = lock(&self.state);
        match (self.node, function) {
            (Node::LoadMore, SCROLL_INTO_VIEW_JS) => {
                state.log.scrolled_into_view += 1;
            }
            (Node::LoadMore, CLICK_JS) => {
                if !state.load_more_present() {
                    bail!("load-more button is detached");
                }
                state.log.clicks += 1;
                state.load_more_used = true;
                let rows = state.layout.load_more_rows.unwrap_or(0);
                state.reveal(rows);
            }
            (_, SCROLL_INTO_VIEW_JS) => state.log.scrolled_into_view += 1,
            (_, CLICK_JS) => state.log.clicks += 1,
            _ => {}
        }
        Ok(serde_json::Value::Null)
    }
}
