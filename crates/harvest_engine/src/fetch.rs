use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use harvest_logging::{harvest_debug, harvest_warn};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::StatusCode;

use crate::config::{FetchConfig, RetryPolicy};
use crate::pacing::jitter;
use crate::{FailureKind, FetchError, FetchMetadata, FetchOutput, HarvestError};

impl FetchOutput {
    pub fn json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_slice(&self.bytes)
    }
}

/// A single HTTP GET attempt. Non-2xx answers are errors.
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    async fn get(&self, url: &str, timeout: Duration) -> Result<FetchOutput, FetchError>;
}

/// reqwest-backed fetcher holding one connection pool for the whole run.
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
    max_bytes: u64,
}

impl ReqwestFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self, HarvestError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|err| HarvestError::Config(format!("header name {name:?}: {err}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|err| HarvestError::Config(format!("header value for {name}: {err}")))?;
            headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| HarvestError::Config(format!("http client: {err}")))?;

        Ok(Self {
            client,
            max_bytes: config.max_bytes,
        })
    }
}

#[async_trait::async_trait]
impl Fetcher for ReqwestFetcher {
    async fn get(&self, url: &str, timeout: Duration) -> Result<FetchOutput, FetchError> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|err| FetchError::new(FailureKind::InvalidUrl, err.to_string()))?;

        let response = self
            .client
            .get(parsed)
            .timeout(timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::new(FailureKind::RateLimited, status.to_string()));
        }
        if !status.is_success() {
            return Err(FetchError::new(
                FailureKind::HttpStatus(status.as_u16()),
                status.to_string(),
            ));
        }

        if let Some(content_len) = response.content_length() {
            if content_len > self.max_bytes {
                return Err(FetchError::new(
                    FailureKind::TooLarge {
                        max_bytes: self.max_bytes,
                        actual: Some(content_len),
                    },
                    "response too large",
                ));
            }
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            let next_len = bytes.len() as u64 + chunk.len() as u64;
            if next_len > self.max_bytes {
                return Err(FetchError::new(
                    FailureKind::TooLarge {
                        max_bytes: self.max_bytes,
                        actual: Some(next_len),
                    },
                    "response too large",
                ));
            }
            bytes.extend_from_slice(&chunk);
        }

        let metadata = FetchMetadata {
            url: url.to_string(),
            status: status.as_u16(),
            content_type,
            byte_len: bytes.len() as u64,
        };

        Ok(FetchOutput { bytes, metadata })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::new(FailureKind::Timeout, err.to_string());
    }
    FetchError::new(FailureKind::Network, err.to_string())
}

/// Retries transient failures of a [`Fetcher`] with exponential backoff.
///
/// Timeouts, connection errors, 429 and 5xx are retried; other 4xx answers
/// are returned immediately so callers can pick their own fallback.
#[derive(Clone)]
pub struct ResilientFetcher {
    inner: Arc<dyn Fetcher>,
    policy: RetryPolicy,
    timeout: Duration,
}

impl ResilientFetcher {
    pub fn new(inner: Arc<dyn Fetcher>, policy: RetryPolicy, timeout: Duration) -> Self {
        Self {
            inner,
            policy,
            timeout,
        }
    }

    pub fn inner(&self) -> Arc<dyn Fetcher> {
        self.inner.clone()
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn get(&self, url: &str) -> Result<FetchOutput, HarvestError> {
        self.get_with_timeout(url, self.timeout).await
    }

    pub async fn get_with_timeout(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<FetchOutput, HarvestError> {
        let attempts = self.policy.attempts();
        let mut last = FetchError::new(FailureKind::Network, "no attempt made");

        for attempt in 0..attempts {
            match self.inner.get(url, timeout).await {
                Ok(output) => {
                    harvest_debug!("GET {} ok after {} attempt(s)", url, attempt + 1);
                    return Ok(output);
                }
                Err(err) if !err.is_retryable() => {
                    return Err(HarvestError::from_fetch(url, err));
                }
                Err(err) => {
                    if attempt + 1 < attempts {
                        let delay = self.policy.base_delay(attempt) + jitter(self.policy.jitter_max);
                        harvest_warn!(
                            "GET {} failed ({}), attempt {}/{}; retrying in {:?}",
                            url,
                            err,
                            attempt + 1,
                            attempts,
                            delay
                        );
                        tokio::time::sleep(delay).await;
                    } else {
                        harvest_warn!(
                            "GET {} failed ({}), attempt {}/{}; giving up",
                            url,
                            err,
                            attempt + 1,
                            attempts
                        );
                    }
                    last = err;
                }
            }
        }

        Err(HarvestError::RetryExhausted {
            url: url.to_string(),
            attempts,
            last,
        })
    }
}

impl std::fmt::Debug for ResilientFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientFetcher")
            .field("policy", &self.policy)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
