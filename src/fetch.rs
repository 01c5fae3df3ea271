//! HTTP page fetching with bounded exponential backoff.
//!
//! # Architecture
//!
//! - [`Transport`]: one raw GET, returning the status and body of a page
//! - [`HttpTransport`]: the reqwest implementation (timeout, bounded redirects,
//!   browser `User-Agent`, rustls certificate validation)
//! - [`Connector`]: builds one transport per worker so no connection pool is
//!   ever shared between workers
//! - [`Fetcher`]: decorator that adds retry logic to any [`Transport`]
//!
//! # Retry Strategy
//!
//! Transient failures (connection errors, timeouts, HTTP 429/5xx) are retried
//! up to `retry_budget` times. Permanent failures return at once. The delay
//! before retry `n` follows:
//!
//! ```text
//! delay = min(base_delay * 2^(n-1), max_delay) + random_jitter(0..=jitter)
//! ```

use crate::error::FetchError;
use rand::{Rng, rng};
use reqwest::redirect::Policy;
use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, instrument, warn};

/// Browser-style user agent sent with every request.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Raw result of a single GET.
#[derive(Debug, Clone)]
pub struct PageResponse {
    pub status: u16,
    pub body: String,
}

/// One unretried GET.
///
/// Implementations report network-level failures as [`FetchError`] and hand
/// every HTTP response back as a [`PageResponse`], whatever its status; the
/// [`Fetcher`] decides what a status means.
pub trait Transport {
    fn get(&self, url: &str) -> impl Future<Output = Result<PageResponse, FetchError>> + Send;
}

/// Builds a fresh transport for one worker.
pub trait Connector: Send + Sync + 'static {
    type Transport: Transport + Send + Sync + 'static;

    fn connect(&self) -> Result<Self::Transport, FetchError>;
}

/// reqwest-backed [`Transport`]. Each instance owns its connection pool.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration, redirect_limit: usize) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(Policy::limited(redirect_limit))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;
        Ok(Self { client })
    }
}

fn map_reqwest_error(url: &str, e: reqwest::Error) -> FetchError {
    let url = url.to_string();
    if e.is_redirect() {
        FetchError::TooManyRedirects { url }
    } else if e.is_timeout() {
        FetchError::Timeout { url }
    } else if e.is_connect() {
        FetchError::Connect {
            url,
            reason: e.to_string(),
        }
    } else if e.is_builder() {
        FetchError::InvalidUrl {
            url,
            reason: e.to_string(),
        }
    } else {
        FetchError::Request {
            url,
            reason: e.to_string(),
        }
    }
}

impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> Result<PageResponse, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| map_reqwest_error(url, e))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| map_reqwest_error(url, e))?;
        Ok(PageResponse { status, body })
    }
}

/// [`Connector`] producing one [`HttpTransport`] per worker.
#[derive(Debug, Clone)]
pub struct HttpConnector {
    pub timeout: Duration,
    pub redirect_limit: usize,
}

impl Connector for HttpConnector {
    type Transport = HttpTransport;

    fn connect(&self) -> Result<HttpTransport, FetchError> {
        HttpTransport::new(self.timeout, self.redirect_limit)
    }
}

/// Retry and backoff limits for a [`Fetcher`].
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt.
    pub retry_budget: usize,
    /// Delay before the first retry; doubles with each retry.
    pub base_delay: Duration,
    /// Cap on the exponential part of the delay.
    pub max_delay: Duration,
    /// Upper bound of the random jitter added to each delay.
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_budget: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: usize) -> Duration {
        let exp = u32::try_from(retry.saturating_sub(1)).unwrap_or(u32::MAX).min(16);
        let delay = self.base_delay.saturating_mul(1 << exp).min(self.max_delay);
        delay + random_jitter(self.jitter)
    }
}

fn random_jitter(max: Duration) -> Duration {
    let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rng().random_range(0..=max_ms))
}

/// Wrapper that adds exponential backoff retry logic to any [`Transport`].
///
/// One `Fetcher` is owned by exactly one worker, so each worker runs its own
/// backoff clock.
pub struct Fetcher<T> {
    inner: T,
    policy: RetryPolicy,
}

impl<T> fmt::Debug for Fetcher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fetcher")
            .field("policy", &self.policy)
            .finish()
    }
}

impl<T> Fetcher<T>
where
    T: Transport + Sync,
{
    pub fn new(inner: T, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// Download `url`, retrying transient failures.
    ///
    /// # Returns
    ///
    /// The body of the first 2xx response. A permanent failure is returned as
    /// soon as it is seen; a transient one is returned wrapped in
    /// [`FetchError::Exhausted`] once the retry budget is spent.
    #[instrument(level = "debug", skip(self))]
    pub async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let total_t0 = Instant::now();
        let mut retries = 0usize;

        loop {
            let error = match self.inner.get(url).await {
                Ok(page) if (200..300).contains(&page.status) => {
                    debug!(
                        status = page.status,
                        bytes = page.body.len(),
                        attempts = retries + 1,
                        "fetched page"
                    );
                    return Ok(page.body);
                }
                Ok(page) => FetchError::Status {
                    url: url.to_string(),
                    status: page.status,
                },
                Err(e) => e,
            };

            if !error.is_transient() {
                warn!(error = %error, "permanent fetch failure; not retrying");
                return Err(error);
            }

            retries += 1;
            if retries > self.policy.retry_budget {
                error!(
                    attempts = retries,
                    elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                    error = %error,
                    "fetch exhausted retries"
                );
                return Err(FetchError::Exhausted {
                    url: url.to_string(),
                    attempts: retries,
                    last: Box::new(error),
                });
            }

            let delay = self.policy.delay_for(retries);
            warn!(
                retry = retries,
                max = self.policy.retry_budget,
                ?delay,
                error = %error,
                "fetch attempt failed; backing off"
            );
            sleep(delay).await;
        }
    }
}
