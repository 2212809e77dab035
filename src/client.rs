use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, COOKIE, ORIGIN, REFERER};
use reqwest::StatusCode;

use crate::config::{DownloadConfig, RetryPolicy, USER_AGENT};
use crate::error::{Error, Result};

/// Transport seam. The transfer engine, catalog and caption fetchers are
/// generic over this so tests run against an in-memory fake.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn get_text(&self, url: &str) -> Result<String>;
    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>>;
}

/// Authenticated HTTP client with bounded retries and a fixed delay.
///
/// Only 5xx, 408 and 429 responses are retried; a 404 on a caption URL is
/// a legitimate outcome the caller maps to "no captions".
pub struct HttpFetcher {
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl HttpFetcher {
    pub fn new(config: &DownloadConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_str(&config.cookie_header())
                .map_err(|_| Error::InvalidConfig("session token is not a valid header value".into()))?,
        );
        if let Ok(v) = HeaderValue::from_str(&config.endpoints.origin) {
            headers.insert(ORIGIN, v);
        }
        if let Ok(v) = HeaderValue::from_str(&config.endpoints.referer) {
            headers.insert(REFERER, v);
        }

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .cookie_store(true)
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(300))
            .build()?;

        Ok(Self {
            client,
            retry: config.retry.clone(),
        })
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        let mut last_status: Option<u16> = None;

        for attempt in 1..=self.retry.attempts {
            match self.client.get(url).send().await {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) => {
                    let status = resp.status();
                    last_status = Some(status.as_u16());
                    if !retryable(status) {
                        break;
                    }
                    tracing::warn!(
                        "GET {} returned {} (attempt {}/{})",
                        url,
                        status,
                        attempt,
                        self.retry.attempts
                    );
                }
                Err(e) => {
                    last_status = e.status().map(|s| s.as_u16());
                    tracing::warn!(
                        "GET {} failed: {} (attempt {}/{})",
                        url,
                        e,
                        attempt,
                        self.retry.attempts
                    );
                }
            }
            if attempt < self.retry.attempts {
                tokio::time::sleep(self.retry.delay).await;
            }
        }

        Err(Error::TransferFailed {
            url: url.to_string(),
            last_status,
        })
    }
}

// Redirects are followed by the client, so any status that still surfaces
// here is final for its category; only overload and timeout signals can
// change between attempts.
fn retryable(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn get_text(&self, url: &str) -> Result<String> {
        Ok(self.get(url).await?.text().await?)
    }

    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        Ok(self.get(url).await?.bytes().await?.to_vec())
    }
}
