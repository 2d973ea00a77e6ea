//! Rate-limited, retrying HTTP client.
//!
//! One [`RateLimitedClient`] is shared process-wide. Hosts registered with
//! [`RateLimitedClient::with_host_limit`] go through their token buckets;
//! unregistered hosts are only subject to the retry policy.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use dartsearch_shared::{DartSearchError, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::limiter::HostLimiter;

/// Retries for transient failures (network, 5xx, 429).
const MAX_RETRIES: u32 = 3;

/// Backoff base; doubles per attempt, ±25 % jitter.
const BACKOFF_BASE_MS: u64 = 500;

/// How long a call may wait on the token bucket before failing `RateLimited`.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// A successful HTTP exchange. Non-2xx statuses are returned, not retried
/// (except 429/5xx, which exhaust the retry budget first).
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Body as UTF-8 text (lossy; upstream bodies are UTF-8 or EUC-KR
    /// already transcoded by reqwest's charset handling).
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Shared HTTP client with per-host token buckets and retry with backoff.
pub struct RateLimitedClient {
    client: reqwest::Client,
    limiters: HashMap<String, Arc<HostLimiter>>,
}

impl RateLimitedClient {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent.to_string())
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(timeout)
            .build()
            .map_err(|e| DartSearchError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            limiters: HashMap::new(),
        })
    }

    /// Register a token bucket for `host`: `daily` requests per day with a
    /// `burst`-per-second ceiling.
    pub fn with_host_limit(mut self, host: &str, daily: u32, burst: u32) -> Self {
        self.limiters
            .insert(host.to_string(), Arc::new(HostLimiter::new(daily, burst)));
        self
    }

    /// GET `url` with `params`, honoring the host's token bucket and the
    /// retry policy. Cancellation is propagated promptly.
    pub async fn get(
        &self,
        url: &str,
        params: &[(&str, &str)],
        cancel: &CancellationToken,
    ) -> Result<HttpResponse> {
        let parsed = Url::parse_with_params(url, params)
            .map_err(|e| DartSearchError::Network(format!("bad url {url}: {e}")))?;

        if let Some(limiter) = parsed.host_str().and_then(|h| self.limiters.get(h)) {
            limiter
                .acquire(Instant::now() + ACQUIRE_TIMEOUT, cancel)
                .await?;
        }

        let mut last_err = String::new();
        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let backoff = jitter(Duration::from_millis(
                    BACKOFF_BASE_MS << (attempt - 1),
                ));
                debug!(url = %parsed, attempt, backoff_ms = backoff.as_millis() as u64, "retrying");
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {}
                    _ = cancel.cancelled() => return Err(DartSearchError::Cancelled),
                }
            }

            let request = self.client.get(parsed.clone()).send();
            let response = tokio::select! {
                res = request => res,
                _ = cancel.cancelled() => return Err(DartSearchError::Cancelled),
            };

            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if status == 429 || status >= 500 {
                        last_err = format!("HTTP {status}");
                        warn!(url = %parsed, status, "transient upstream status");
                        continue;
                    }
                    let body = tokio::select! {
                        res = resp.bytes() => res,
                        _ = cancel.cancelled() => return Err(DartSearchError::Cancelled),
                    };
                    match body {
                        Ok(bytes) => {
                            return Ok(HttpResponse {
                                status,
                                body: bytes.to_vec(),
                            })
                        }
                        Err(e) => {
                            last_err = format!("body read: {e}");
                            continue;
                        }
                    }
                }
                Err(e) => {
                    last_err = e.to_string();
                    continue;
                }
            }
        }

        Err(DartSearchError::Network(format!(
            "{url}: retries exhausted: {last_err}"
        )))
    }

    /// Total throttled acquisitions across all registered hosts.
    pub async fn throttled_count(&self) -> u64 {
        let mut total = 0;
        for limiter in self.limiters.values() {
            total += limiter.throttled_count().await;
        }
        total
    }
}

/// ±25 % jitter, seeded from the clock's sub-second noise.
fn jitter(base: Duration) -> Duration {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0) as u64;
    // Map noise onto the 75%..=125% band.
    let factor = 75 + (nanos % 51);
    base * factor as u32 / 100
}
