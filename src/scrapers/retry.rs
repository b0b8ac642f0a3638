//! Exponential backoff for transient fetch failures.
//!
//! [`RetryFetch`] wraps a [`FeedSource`] or [`ArticleSource`] and re-issues
//! requests that failed transiently (timeouts, connection errors, HTTP 5xx
//! and 429). Permanent failures, including HTTP 403, are returned at once.
//!
//! # Backoff Strategy
//!
//! ```text
//! delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..=jitter)
//! ```

use super::{ArticleSource, FeedSource};
use crate::config::RetryConfig;
use crate::errors::{ArticleError, FetchError};
use crate::models::{ArticleContent, FeedEntry};
use rand::{rng, Rng};
use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{error, warn};

pub struct RetryFetch<T> {
    inner: T,
    max_retries: usize,
    base_delay: Duration,
    max_delay: Duration,
    jitter: Duration,
}

impl<T> RetryFetch<T> {
    pub fn new(inner: T, max_retries: usize, base_delay: Duration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: Duration::from_secs(30),
            jitter: Duration::from_millis(250),
        }
    }

    pub fn from_config(inner: T, config: &RetryConfig) -> Self {
        Self::new(
            inner,
            config.max_retries,
            Duration::from_millis(config.base_delay_ms),
        )
        .with_max_delay(Duration::from_millis(config.max_delay_ms))
        .with_jitter(Duration::from_millis(config.jitter_ms))
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    #[cfg(test)]
    pub fn inner(&self) -> &T {
        &self.inner
    }

    fn delay_for(&self, attempt: usize) -> Duration {
        let shift = attempt.saturating_sub(1).min(31) as u32;
        let delay = self.base_delay.saturating_mul(1u32 << shift).min(self.max_delay);
        let jitter_ms: u64 = rng().random_range(0..=self.jitter.as_millis() as u64);
        delay + Duration::from_millis(jitter_ms)
    }

    /// Run `op` until it succeeds, fails permanently, or retries run out.
    async fn run<R, E, F, Fut>(&self, url: &str, is_transient: fn(&E) -> bool, op: F) -> Result<R, E>
    where
        E: fmt::Display,
        F: Fn() -> Fut,
        Fut: Future<Output = Result<R, E>>,
    {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            match op().await {
                Ok(resp) => return Ok(resp),
                Err(e) if !is_transient(&e) => return Err(e),
                Err(e) => {
                    attempt += 1;
                    let total_dt = total_t0.elapsed();

                    if attempt > self.max_retries {
                        error!(
                            url,
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_total = total_dt.as_millis() as u64,
                            error = %e,
                            "fetch exhausted retries"
                        );
                        return Err(e);
                    }

                    let delay = self.delay_for(attempt);
                    warn!(
                        url,
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_total = total_dt.as_millis() as u64,
                        ?delay,
                        error = %e,
                        "fetch attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

impl<T> fmt::Debug for RetryFetch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryFetch")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("jitter", &self.jitter)
            .finish()
    }
}

impl<T: FeedSource> FeedSource for RetryFetch<T> {
    async fn fetch_feed(&self, url: &str) -> Result<Vec<FeedEntry>, FetchError> {
        let inner = &self.inner;
        self.run(url, FetchError::is_transient, move || inner.fetch_feed(url))
            .await
    }
}

impl<T: ArticleSource> ArticleSource for RetryFetch<T> {
    async fn fetch_article(&self, url: &str) -> Result<ArticleContent, ArticleError> {
        let inner = &self.inner;
        self.run(url, ArticleError::is_transient, move || inner.fetch_article(url))
            .await
    }
}
