// Copyright 2026 Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Async HTTP client for image downloads, wrapping reqwest.
//!
//! Not a browser, just byte transfers. Sends the configured user agent and
//! extra headers, follows redirects, retries 5xx and transport errors with
//! exponential backoff and honours `Retry-After` on 429.

use crate::config::HarvestConfig;
use crate::error::{HarvestError, HarvestResult};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, RETRY_AFTER};
use std::time::Duration;

const DEFAULT_BACKOFF: Duration = Duration::from_millis(500);
const MAX_RETRY_AFTER_SECS: u64 = 10;

/// A fully buffered asset response.
#[derive(Debug, Clone)]
pub struct AssetResponse {
    /// Final URL after redirects.
    pub final_url: String,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// HTTP client for the fetch stage.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    /// HTTP/1.1-only fallback client for CDNs that reject HTTP/2.
    h1_client: reqwest::Client,
    timeout: Duration,
    retries: u32,
    backoff: Duration,
}

impl HttpClient {
    /// Build a client from the download settings of `config`.
    pub fn new(config: &HarvestConfig) -> HarvestResult<Self> {
        let headers = header_map(config)?;
        let timeout = config.download_timeout();

        let builder = || {
            reqwest::Client::builder()
                .timeout(timeout)
                .redirect(reqwest::redirect::Policy::limited(5))
                .user_agent(config.user_agent.as_str())
                .default_headers(headers.clone())
        };

        let client = builder().build()?;
        let h1_client = builder().http1_only().build()?;

        Ok(Self {
            client,
            h1_client,
            timeout,
            retries: config.download_retries,
            backoff: DEFAULT_BACKOFF,
        })
    }

    /// Override the base retry delay.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// GET `url` and buffer the body.
    ///
    /// Falls back to HTTP/1.1 on protocol errors. Any non-2xx status that
    /// survives the retries is an error.
    pub async fn get_bytes(&self, url: &str) -> HarvestResult<AssetResponse> {
        match self.get_inner(&self.client, url).await {
            Err(HarvestError::Http(e)) if looks_like_protocol_error(&e) => {
                tracing::debug!("retrying {url} over HTTP/1.1: {e}");
                self.get_inner(&self.h1_client, url).await
            }
            other => other,
        }
    }

    async fn get_inner(&self, client: &reqwest::Client, url: &str) -> HarvestResult<AssetResponse> {
        let mut attempt = 0u32;

        loop {
            let resp = client.get(url).timeout(self.timeout).send().await;

            match resp {
                Ok(r) => {
                    let status = r.status().as_u16();

                    if status >= 500 && attempt < self.retries {
                        attempt += 1;
                        tracing::debug!("{url} returned {status}, retry {attempt}");
                        tokio::time::sleep(self.delay(attempt)).await;
                        continue;
                    }

                    if status == 429 && attempt < self.retries {
                        attempt += 1;
                        let retry_after = r
                            .headers()
                            .get(RETRY_AFTER)
                            .and_then(|v| v.to_str().ok())
                            .and_then(|s| s.trim().parse::<u64>().ok())
                            .unwrap_or(2);
                        tokio::time::sleep(Duration::from_secs(
                            retry_after.min(MAX_RETRY_AFTER_SECS),
                        ))
                        .await;
                        continue;
                    }

                    if !r.status().is_success() {
                        return Err(HarvestError::HttpStatus {
                            url: url.to_string(),
                            status,
                        });
                    }

                    let final_url = r.url().to_string();
                    let content_type = r
                        .headers()
                        .get(CONTENT_TYPE)
                        .and_then(|v| v.to_str().ok())
                        .map(|s| s.to_string());
                    let body = r.bytes().await?.to_vec();

                    return Ok(AssetResponse {
                        final_url,
                        content_type,
                        body,
                    });
                }
                Err(e) => {
                    if attempt < self.retries && !e.is_builder() {
                        attempt += 1;
                        tracing::debug!("{url} failed ({e}), retry {attempt}");
                        tokio::time::sleep(self.delay(attempt)).await;
                        continue;
                    }
                    return Err(e.into());
                }
            }
        }
    }

    fn delay(&self, attempt: u32) -> Duration {
        self.backoff
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

fn header_map(config: &HarvestConfig) -> HarvestResult<HeaderMap> {
    let mut headers = HeaderMap::new();
    for (name, value) in &config.extra_headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| HarvestError::Config(format!("invalid header name {name:?}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| HarvestError::Config(format!("invalid value for {name}: {e}")))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

fn looks_like_protocol_error(e: &reqwest::Error) -> bool {
    let text = format!("{e:?}");
    text.contains("http2") || text.contains("protocol") || text.contains("connection closed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(retries: u32) -> HttpClient {
        let config = HarvestConfig {
            download_retries: retries,
            download_timeout_ms: 2_000,
            ..HarvestConfig::default()
        };
        HttpClient::new(&config)
            .unwrap()
            .with_backoff(Duration::from_millis(5))
    }

    #[tokio::test]
    async fn test_get_bytes_sends_configured_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a.jpg"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/jpeg")
                    .set_body_bytes(vec![0xFF, 0xD8, 0xFF]),
            )
            .expect(1)
            .mount(&server)
            .await;

        let url = format!("{}/a.jpg", server.uri());
        let resp = client(0).get_bytes(&url).await.unwrap();
        assert_eq!(resp.final_url, url);
        assert_eq!(resp.body, vec![0xFF, 0xD8, 0xFF]);
        assert_eq!(resp.content_type.as_deref(), Some("image/jpeg"));

        // Accept-Language holds a comma list, so compare the raw header values.
        let requests = server.received_requests().await.unwrap();
        let sent = |name: &str| {
            requests[0]
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.to_string())
        };
        assert_eq!(sent("referer").as_deref(), Some("https://www.google.com/"));
        assert_eq!(sent("accept-language").as_deref(), Some("en-US,en;q=0.9"));
        assert!(sent("user-agent").is_some_and(|ua| ua.contains("Chrome")));
    }

    #[test]
    fn test_backoff_saturates_on_large_attempts() {
        let client = client(0).with_backoff(Duration::from_millis(500));
        assert_eq!(client.delay(1), Duration::from_millis(500));
        assert_eq!(client.delay(3), Duration::from_millis(2_000));
        assert!(client.delay(40) >= client.delay(32));
        assert!(client.delay(u32::MAX) > Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn test_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ok".to_vec()))
            .mount(&server)
            .await;

        let resp = client(2).get_bytes(&server.uri()).await.unwrap();
        assert_eq!(resp.body, b"ok");
    }

    #[tokio::test]
    async fn test_gives_up_after_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&server)
            .await;

        let err = client(1).get_bytes(&server.uri()).await.unwrap_err();
        assert!(matches!(err, HarvestError::HttpStatus { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(3).get_bytes(&server.uri()).await.unwrap_err();
        assert!(matches!(err, HarvestError::HttpStatus { status: 404, .. }));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_rate_limit_honours_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"img".to_vec()))
            .mount(&server)
            .await;

        let resp = client(1).get_bytes(&server.uri()).await.unwrap();
        assert_eq!(resp.body, b"img");
    }

    #[tokio::test]
    async fn test_unreachable_host() {
        let err = client(0)
            .get_bytes("http://127.0.0.1:1/img.jpg")
            .await
            .unwrap_err();
        assert!(matches!(err, HarvestError::Http(_)));
    }

    #[test]
    fn test_invalid_header_rejected() {
        let mut config = HarvestConfig::default();
        config
            .extra_headers
            .insert("bad header".to_string(), "x".to_string());
        assert!(matches!(
            HttpClient::new(&config),
            Err(HarvestError::Config(_))
        ));
    }
}
