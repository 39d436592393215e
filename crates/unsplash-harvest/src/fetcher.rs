// Copyright 2026 Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Asset fetcher: download every reference to a deterministic filename.
//!
//! One failed download never stops the batch. Results carry their 1-based
//! index so a failed item leaves a gap in the filenames rather than
//! shifting the ones after it.

use crate::config::HarvestConfig;
use crate::error::{HarvestError, HarvestResult};
use crate::http_client::HttpClient;
use crate::progress::{HarvestEventKind, ProgressReporter};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::watch;

/// Outcome of one download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DownloadStatus {
    Saved { path: PathBuf, bytes: u64 },
    Failed { reason: String },
    /// Never started because the operation was interrupted.
    Cancelled,
}

/// Per-reference download record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadResult {
    /// 1-based position in the reference list.
    pub index: usize,
    pub url: String,
    #[serde(flatten)]
    pub status: DownloadStatus,
}

impl DownloadResult {
    pub fn is_saved(&self) -> bool {
        matches!(self.status, DownloadStatus::Saved { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, DownloadStatus::Failed { .. })
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.status {
            DownloadStatus::Saved { path, .. } => Some(path),
            _ => None,
        }
    }
}

/// Downloads references with bounded concurrency.
pub struct AssetFetcher<'a> {
    config: &'a HarvestConfig,
    client: HttpClient,
}

impl<'a> AssetFetcher<'a> {
    pub fn new(config: &'a HarvestConfig) -> HarvestResult<Self> {
        Ok(Self {
            config,
            client: HttpClient::new(config)?,
        })
    }

    /// Persist every reference under `dest`, returning results sorted by index.
    ///
    /// Only a failure to create `dest` is an error. Once `cancel` turns true
    /// no further downloads start; those already running complete.
    pub async fn fetch_all(
        &self,
        references: &[String],
        dest: &Path,
        cancel: &watch::Receiver<bool>,
        progress: &ProgressReporter,
    ) -> HarvestResult<Vec<DownloadResult>> {
        tokio::fs::create_dir_all(dest).await.map_err(|e| {
            HarvestError::Io(std::io::Error::new(
                e.kind(),
                format!("failed to create {}: {e}", dest.display()),
            ))
        })?;

        let concurrency = self.config.download_concurrency.max(1);
        let mut results: Vec<DownloadResult> =
            stream::iter(references.iter().enumerate())
                .map(|(i, url)| {
                    let index = i + 1;
                    let cancel = cancel.clone();
                    async move {
                        let cancelled = *cancel.borrow();
                        let status = if cancelled {
                            DownloadStatus::Cancelled
                        } else {
                            self.download_one(index, url, dest).await
                        };
                        self.report(index, url, &status, progress);
                        DownloadResult {
                            index,
                            url: url.clone(),
                            status,
                        }
                    }
                })
                .buffer_unordered(concurrency)
                .collect()
                .await;

        results.sort_by_key(|r| r.index);
        Ok(results)
    }

    async fn download_one(&self, index: usize, url: &str, dest: &Path) -> DownloadStatus {
        let path = dest.join(self.config.file_name(index));
        let result = async {
            let resp = self.client.get_bytes(url).await?;
            tracing::debug!(
                "image {index}: {} ({})",
                resp.final_url,
                resp.content_type.as_deref().unwrap_or("unknown type")
            );
            tokio::fs::write(&path, &resp.body).await.map_err(|e| {
                HarvestError::Download(format!("cannot write {}: {e}", path.display()))
            })?;
            Ok::<u64, HarvestError>(resp.body.len() as u64)
        }
        .await;

        match result {
            Ok(bytes) => DownloadStatus::Saved { path, bytes },
            Err(e) => DownloadStatus::Failed {
                reason: e.to_string(),
            },
        }
    }

    fn report(&self, index: usize, url: &str, status: &DownloadStatus, progress: &ProgressReporter) {
        match status {
            DownloadStatus::Saved { path, bytes } => {
                tracing::info!("downloaded {} ({bytes} bytes)", path.display());
                progress.emit(HarvestEventKind::DownloadFinished {
                    index,
                    ok: true,
                    bytes: Some(*bytes),
                });
            }
            DownloadStatus::Failed { reason } => {
                tracing::error!("failed to download image {index} from {url}: {reason}");
                progress.emit(HarvestEventKind::DownloadFinished {
                    index,
                    ok: false,
                    bytes: None,
                });
            }
            DownloadStatus::Cancelled => {
                tracing::debug!("skipped image {index}: cancelled");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config() -> HarvestConfig {
        HarvestConfig {
            download_retries: 0,
            download_timeout_ms: 2_000,
            download_concurrency: 3,
            ..HarvestConfig::default()
        }
    }

    async fn serve(server: &MockServer, name: &str, body: &[u8]) {
        Mock::given(method("GET"))
            .and(path(format!("/{name}")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_failed_index_leaves_a_gap() {
        let server = MockServer::start().await;
        serve(&server, "a.jpg", b"aaaa").await;
        serve(&server, "c.jpg", b"cc").await;
        Mock::given(method("GET"))
            .and(path("/b.jpg"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let refs = vec![
            format!("{}/a.jpg", server.uri()),
            format!("{}/b.jpg", server.uri()),
            format!("{}/c.jpg", server.uri()),
        ];
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("nested").join("out");
        let config = config();
        let (_tx, rx) = watch::channel(false);

        let results = AssetFetcher::new(&config)
            .unwrap()
            .fetch_all(&refs, &dest, &rx, &ProgressReporter::disabled())
            .await
            .unwrap();

        assert_eq!(results.iter().map(|r| r.index).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert!(results[0].is_saved());
        assert!(results[1].is_failed());
        assert!(results[2].is_saved());
        assert_eq!(
            results[2].status,
            DownloadStatus::Saved {
                path: dest.join("img_0003.jpg"),
                bytes: 2
            }
        );
        assert!(dest.join("img_0001.jpg").exists());
        assert!(!dest.join("img_0002.jpg").exists());
        assert_eq!(std::fs::read(dest.join("img_0003.jpg")).unwrap(), b"cc");
    }

    #[tokio::test]
    async fn test_rerun_overwrites_existing_files() {
        let server = MockServer::start().await;
        serve(&server, "a.jpg", b"fresh").await;

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("img_0001.jpg"), b"stale bytes from before").unwrap();

        let config = config();
        let (_tx, rx) = watch::channel(false);
        let refs = vec![format!("{}/a.jpg", server.uri())];
        AssetFetcher::new(&config)
            .unwrap()
            .fetch_all(&refs, dir.path(), &rx, &ProgressReporter::disabled())
            .await
            .unwrap();

        assert_eq!(std::fs::read(dir.path().join("img_0001.jpg")).unwrap(), b"fresh");
    }

    #[tokio::test]
    async fn test_cancelled_before_start_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = config();
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let refs = vec![
            "http://127.0.0.1:1/a.jpg".to_string(),
            "http://127.0.0.1:1/b.jpg".to_string(),
        ];
        let results = AssetFetcher::new(&config)
            .unwrap()
            .fetch_all(&refs, dir.path(), &rx, &ProgressReporter::disabled())
            .await
            .unwrap();

        assert!(results.iter().all(|r| r.status == DownloadStatus::Cancelled));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_timeout_is_a_per_item_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow.jpg"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;
        serve(&server, "fast.jpg", b"f").await;

        let config = HarvestConfig {
            download_timeout_ms: 100,
            ..config()
        };
        let (_tx, rx) = watch::channel(false);
        let dir = tempfile::tempdir().unwrap();
        let refs = vec![
            format!("{}/slow.jpg", server.uri()),
            format!("{}/fast.jpg", server.uri()),
        ];
        let results = AssetFetcher::new(&config)
            .unwrap()
            .fetch_all(&refs, dir.path(), &rx, &ProgressReporter::disabled())
            .await
            .unwrap();

        assert!(results[0].is_failed());
        assert!(results[1].is_saved());
    }

    #[tokio::test]
    async fn test_write_failure_is_recorded_per_item() {
        let server = MockServer::start().await;
        serve(&server, "a.jpg", b"aaaa").await;
        serve(&server, "b.jpg", b"bb").await;

        let dir = tempfile::tempdir().unwrap();
        // a directory squatting on the first filename makes the write fail
        std::fs::create_dir(dir.path().join("img_0001.jpg")).unwrap();

        let config = config();
        let (_tx, rx) = watch::channel(false);
        let refs = vec![
            format!("{}/a.jpg", server.uri()),
            format!("{}/b.jpg", server.uri()),
        ];
        let results = AssetFetcher::new(&config)
            .unwrap()
            .fetch_all(&refs, dir.path(), &rx, &ProgressReporter::disabled())
            .await
            .unwrap();

        match &results[0].status {
            DownloadStatus::Failed { reason } => {
                assert!(reason.starts_with("download failed: cannot write"), "{reason}")
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(results[1].is_saved());
    }

    #[tokio::test]
    async fn test_concurrency_bounds_parallel_downloads() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"x".to_vec())
                    .set_delay(Duration::from_millis(200)),
            )
            .mount(&server)
            .await;

        let config = HarvestConfig {
            download_concurrency: 2,
            ..config()
        };
        let (_tx, rx) = watch::channel(false);
        let dir = tempfile::tempdir().unwrap();
        let refs: Vec<String> = (1..=4).map(|n| format!("{}/{n}.jpg", server.uri())).collect();

        let started = std::time::Instant::now();
        let results = AssetFetcher::new(&config)
            .unwrap()
            .fetch_all(&refs, dir.path(), &rx, &ProgressReporter::disabled())
            .await
            .unwrap();

        // four 200ms downloads, two at a time: at least two rounds
        assert!(started.elapsed() >= Duration::from_millis(400));
        assert!(results.iter().all(|r| r.is_saved()));
        assert_eq!(server.received_requests().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_cancel_mid_fetch_lets_running_download_finish() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"x".to_vec())
                    .set_delay(Duration::from_millis(300)),
            )
            .mount(&server)
            .await;

        let config = HarvestConfig {
            download_concurrency: 1,
            ..config()
        };
        let (tx, rx) = watch::channel(false);
        let dir = tempfile::tempdir().unwrap();
        let refs: Vec<String> = (1..=3).map(|n| format!("{}/{n}.jpg", server.uri())).collect();
        let fetcher = AssetFetcher::new(&config).unwrap();
        let progress = ProgressReporter::disabled();

        let (results, _) = tokio::join!(
            fetcher.fetch_all(&refs, dir.path(), &rx, &progress),
            async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                tx.send(true).unwrap();
            }
        );
        let results = results.unwrap();

        assert!(results[0].is_saved());
        assert_eq!(results[1].status, DownloadStatus::Cancelled);
        assert_eq!(results[2].status, DownloadStatus::Cancelled);
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
        assert!(dir.path().join("img_0001.jpg").exists());
        assert!(!dir.path().join("img_0002.jpg").exists());
    }

    #[test]
    fn test_result_serializes_flat() {
        let result = DownloadResult {
            index: 2,
            url: "https://images.example/b.jpg".into(),
            status: DownloadStatus::Failed {
                reason: "HTTP 404".into(),
            },
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["index"], 2);
        assert_eq!(json["status"], "failed");
        assert_eq!(json["reason"], "HTTP 404");
    }
}
