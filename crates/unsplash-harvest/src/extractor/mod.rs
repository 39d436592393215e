// Copyright 2026 Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! URL extraction from a revealed results grid.
//!
//! Walks columns in order and items top to bottom within each column,
//! following the configured [`CardPath`] from every item to its image
//! source. Items that do not have the expected shape are skipped one at a
//! time; they never abort the walk and never shift the order of the items
//! that follow.

pub mod path;

use crate::config::HarvestConfig;
use crate::error::{HarvestError, HarvestResult};
use crate::navigator::LayoutSnapshot;
use crate::renderer::DomElement;
use path::CardPath;
use std::fmt;

/// Why a single grid item was left out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionSkip {
    /// The descent chain has no child at this level (1-based).
    MissingStep { level: usize },
    /// The node at this level lacks the required attribute value.
    MarkerMismatch { level: usize, found: Option<String> },
    /// The final node has no usable source.
    EmptySource,
    /// The renderer failed while inspecting this item.
    QueryFailed(String),
}

impl fmt::Display for ExtractionSkip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingStep { level } => write!(f, "no child at level {level}"),
            Self::MarkerMismatch { level, found } => {
                write!(f, "marker mismatch at level {level} (found {found:?})")
            }
            Self::EmptySource => write!(f, "empty source attribute"),
            Self::QueryFailed(e) => write!(f, "query failed: {e}"),
        }
    }
}

/// Ordered image references recovered from a snapshot.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// Image URLs in column-major order, at most the requested count.
    pub references: Vec<String>,
    /// Items inspected before the walk finished.
    pub inspected: usize,
    /// Items skipped for not matching the card shape.
    pub skipped: usize,
}

/// Converts a layout snapshot into image references.
pub struct UrlExtractor<'a> {
    config: &'a HarvestConfig,
}

impl<'a> UrlExtractor<'a> {
    pub fn new(config: &'a HarvestConfig) -> Self {
        Self { config }
    }

    /// Recover at most `limit` references from the snapshot.
    ///
    /// Fails only when the container itself cannot be listed; per-item
    /// problems are counted in [`Extraction::skipped`].
    pub async fn extract(
        &self,
        snapshot: &LayoutSnapshot,
        limit: usize,
    ) -> HarvestResult<Extraction> {
        let children = self.config.selectors.children.as_str();
        let columns = snapshot
            .container()
            .find_elements(children)
            .await
            .map_err(|e| HarvestError::Renderer(format!("failed to list columns: {e:#}")))?;

        let mut extraction = Extraction::default();

        'walk: for (col_idx, column) in columns.iter().enumerate() {
            let items = match column.find_elements(children).await {
                Ok(items) => items,
                Err(e) => {
                    tracing::debug!("skipping column {}: {e:#}", col_idx + 1);
                    continue;
                }
            };
            tracing::debug!(
                "processing column {}/{} ({} items)",
                col_idx + 1,
                columns.len(),
                items.len()
            );

            for (row, item) in items.iter().enumerate() {
                if extraction.references.len() >= limit {
                    break 'walk;
                }
                extraction.inspected += 1;
                match resolve_card(item.as_ref(), &self.config.card_path, children).await {
                    Ok(url) => extraction.references.push(url),
                    Err(skip) => {
                        extraction.skipped += 1;
                        tracing::debug!("skipped item {}:{}: {skip}", col_idx + 1, row + 1);
                    }
                }
            }
        }

        extraction.references.truncate(limit);
        Ok(extraction)
    }
}

/// Follow `path` from an item node and read the final attribute.
pub async fn resolve_card(
    item: &dyn DomElement,
    path: &CardPath,
    children: &str,
) -> Result<String, ExtractionSkip> {
    let mut current: Option<Box<dyn DomElement>> = None;

    for (i, step) in path.steps().iter().enumerate() {
        let level = i + 1;
        let node: &dyn DomElement = match &current {
            Some(node) => node.as_ref(),
            None => item,
        };
        let next = node
            .find_elements(children)
            .await
            .map_err(|e| ExtractionSkip::QueryFailed(format!("{e:#}")))?
            .into_iter()
            .next()
            .ok_or(ExtractionSkip::MissingStep { level })?;

        if let Some(required) = &step.require {
            let found = next
                .attribute(&required.name)
                .await
                .map_err(|e| ExtractionSkip::QueryFailed(format!("{e:#}")))?;
            if found.as_deref() != Some(required.value.as_str()) {
                return Err(ExtractionSkip::MarkerMismatch { level, found });
            }
        }
        current = Some(next);
    }

    let node: &dyn DomElement = match &current {
        Some(node) => node.as_ref(),
        None => item,
    };
    let source = node
        .attribute(path.attribute())
        .await
        .map_err(|e| ExtractionSkip::QueryFailed(format!("{e:#}")))?;

    match source {
        Some(url) if !url.trim().is_empty() => Ok(url),
        _ => Err(ExtractionSkip::EmptySource),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CHILDREN_SELECTOR;
    use crate::renderer::fixture::{
        photo_url, FixtureCard, FixtureLayout, FixtureRenderer, PHOTO_MARKER,
    };
    use crate::renderer::{RenderContext, Renderer};

    async fn items_of(ctx: &dyn RenderContext) -> Vec<Box<dyn DomElement>> {
        let config = HarvestConfig::default();
        let containers = ctx.find_elements(&config.selectors.container).await.unwrap();
        let columns = containers[0].find_elements(CHILDREN_SELECTOR).await.unwrap();
        columns[0].find_elements(CHILDREN_SELECTOR).await.unwrap()
    }

    #[tokio::test]
    async fn test_resolve_card_reasons() {
        let layout = FixtureLayout::from_columns(vec![vec![
            FixtureCard::Photo(photo_url(0)),
            FixtureCard::Sponsored("https://ads.test/1.jpg".into()),
            FixtureCard::Truncated { depth: 3 },
            FixtureCard::Blank,
        ]]);
        let renderer = FixtureRenderer::new(layout);
        let mut ctx = renderer.new_context().await.unwrap();
        ctx.navigate("https://unsplash.com/s/photos/x", 1000)
            .await
            .unwrap();
        let items = items_of(ctx.as_ref()).await;
        let path = CardPath::default();

        assert_eq!(
            resolve_card(items[0].as_ref(), &path, CHILDREN_SELECTOR).await,
            Ok(photo_url(0))
        );
        assert!(matches!(
            resolve_card(items[1].as_ref(), &path, CHILDREN_SELECTOR).await,
            Err(ExtractionSkip::MarkerMismatch { level: 1, .. })
        ));
        assert_eq!(
            resolve_card(items[2].as_ref(), &path, CHILDREN_SELECTOR).await,
            Err(ExtractionSkip::MissingStep { level: 4 })
        );
        assert_eq!(
            resolve_card(items[3].as_ref(), &path, CHILDREN_SELECTOR).await,
            Err(ExtractionSkip::EmptySource)
        );
    }

    #[tokio::test]
    async fn test_marker_is_data_not_code() {
        let layout = FixtureLayout::from_columns(vec![vec![FixtureCard::Sponsored(
            "https://ads.test/2.jpg".into(),
        )]]);
        let renderer = FixtureRenderer::new(layout);
        let mut ctx = renderer.new_context().await.unwrap();
        ctx.navigate("https://unsplash.com/s/photos/x", 1000)
            .await
            .unwrap();
        let items = items_of(ctx.as_ref()).await;

        let accept_any: CardPath = "* / * / * / * @src".parse().unwrap();
        assert_eq!(
            resolve_card(items[0].as_ref(), &accept_any, CHILDREN_SELECTOR).await,
            Ok("https://ads.test/2.jpg".to_string())
        );

        let photo_only: CardPath = format!("*[class=\"{PHOTO_MARKER}\"] / * / * / * @src")
            .parse()
            .unwrap();
        assert!(resolve_card(items[0].as_ref(), &photo_only, CHILDREN_SELECTOR)
            .await
            .is_err());
    }
}
