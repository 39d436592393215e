// Copyright 2026 Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy for the harvest pipeline.
//!
//! Only acquisition-level failures surface as `HarvestError` from the
//! pipeline. Per-node extraction mismatches are skipped silently and
//! per-download failures are recorded in `DownloadResult`.

/// All errors that can occur while harvesting.
#[derive(thiserror::Error, Debug)]
pub enum HarvestError {
    /// The results container never became visible within the wait budget.
    /// `last_error` holds the most recent renderer failure seen while polling.
    #[error(
        "page load timed out after {timeout_ms}ms waiting for `{selector}`{}",
        last_error.as_deref().map(|e| format!(" (last error: {e})")).unwrap_or_default()
    )]
    PageLoadTimeout {
        selector: String,
        timeout_ms: u64,
        last_error: Option<String>,
    },

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("renderer error: {0}")]
    Renderer(String),

    #[error("browser not available: {0}")]
    BrowserUnavailable(String),

    #[error("download failed: {0}")]
    Download(String),

    #[error("unexpected HTTP status {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid card path `{expr}`: {reason}")]
    InvalidCardPath { expr: String, reason: String },

    #[error("config error: {0}")]
    Config(String),

    /// The operation deadline elapsed or the user interrupted it.
    #[error("harvest cancelled")]
    Cancelled,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HarvestError {
    /// Whether this error aborts the whole operation.
    ///
    /// Download-level errors are absorbed by the fetcher; everything else
    /// propagates to the caller.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            HarvestError::Download(_) | HarvestError::HttpStatus { .. } | HarvestError::Http(_)
        )
    }
}

impl From<anyhow::Error> for HarvestError {
    fn from(e: anyhow::Error) -> Self {
        HarvestError::Renderer(format!("{e:#}"))
    }
}

/// Convenience result type.
pub type HarvestResult<T> = Result<T, HarvestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_load_timeout_message() {
        let err = HarvestError::PageLoadTimeout {
            selector: "div[data-testid='masonry-grid-count-three']".to_string(),
            timeout_ms: 30_000,
            last_error: None,
        };
        let msg = err.to_string();
        assert!(msg.contains("30000ms"));
        assert!(msg.contains("masonry-grid-count-three"));
        assert!(!msg.contains("last error"));
        assert!(err.is_fatal());

        let err = HarvestError::PageLoadTimeout {
            selector: "div".to_string(),
            timeout_ms: 10,
            last_error: Some("target closed".to_string()),
        };
        assert!(err.to_string().ends_with("(last error: target closed)"));
    }

    #[test]
    fn test_download_errors_are_not_fatal() {
        assert!(!HarvestError::Download("connection reset".into()).is_fatal());
        assert!(!HarvestError::HttpStatus {
            url: "https://images.example/a.jpg".into(),
            status: 404,
        }
        .is_fatal());
        assert!(HarvestError::Cancelled.is_fatal());
    }

    #[test]
    fn test_anyhow_maps_to_renderer() {
        let err: HarvestError = anyhow::anyhow!("target closed").into();
        assert!(matches!(err, HarvestError::Renderer(ref m) if m.contains("target closed")));
    }
}
