//! Bounded retry with exponential delay for transient cloud-API failures
//! (429/409). No circuit breaker here — a launch/list call that exhausts
//! its retries just surfaces the error to the caller, which aborts the
//! current tick per the recoverable-error policy.

use std::time::Duration;

use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

/// HTTP status codes worth retrying: rate limiting and lock conflicts.
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 409 | 502 | 503 | 504)
}

pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, should_retry: impl Fn(&E) -> bool, mut f: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt + 1 < config.max_attempts && should_retry(&e) => {
                let delay = (config.base_delay * 2u32.pow(attempt)).min(config.max_delay);
                warn!(attempt, delay_ms = delay.as_millis() as u64, "retrying transient cloud API failure");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
