use std::future::Future;
use std::time::Duration;

use media_sync_config::HttpConfig;
use reqwest::Client;
use tracing::{debug, warn};

use crate::error::SourceError;

const USER_AGENT: &str = concat!("episync/", env!("CARGO_PKG_VERSION"));

/// Bounded retry with exponential backoff for transient transport failures
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn from_config(config: &HttpConfig) -> Self {
        Self::new(config.max_attempts, Duration::from_millis(config.retry_delay_ms))
    }

    /// No retries and no waiting; used by tests and one-shot commands
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before attempt `attempt + 1`, where `attempt` is 1-indexed
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exponent)
    }

    /// Run `operation` until it succeeds, fails permanently, or the attempts
    /// run out. Exhausting the attempts on transient errors yields `Unavailable`.
    pub async fn run<T, F, Fut>(&self, service: &str, operation: F) -> Result<T, SourceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SourceError>>,
    {
        self.run_while(service, operation, SourceError::is_transient).await
    }

    /// Like `run` for writes that are not idempotent: a failure after the
    /// request may have reached the server is returned without retrying.
    pub async fn run_write<T, F, Fut>(&self, service: &str, operation: F) -> Result<T, SourceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SourceError>>,
    {
        self.run_while(service, operation, |e| e.is_transient() && !e.may_have_been_applied())
            .await
    }

    async fn run_while<T, F, Fut>(
        &self,
        service: &str,
        mut operation: F,
        retryable: fn(&SourceError) -> bool,
    ) -> Result<T, SourceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SourceError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if !retryable(&e) => return Err(e),
                Err(e) if attempt >= self.max_attempts => {
                    warn!(service = service, attempts = attempt, error = %e, "Giving up after transient failures");
                    return Err(SourceError::Unavailable {
                        service: service.to_string(),
                        attempts: attempt,
                        reason: e.to_string(),
                    });
                }
                Err(e) => {
                    let delay = self.backoff(attempt);
                    debug!(service = service, attempt = attempt, delay_ms = delay.as_millis() as u64, error = %e, "Retrying after transient failure");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&HttpConfig::default())
    }
}

/// Shared HTTP client with the configured per-request timeout
pub fn build_http_client(config: &HttpConfig) -> Result<Client, SourceError> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| SourceError::Validation(format!("Failed to build HTTP client: {}", e)))
}
