//! Exponential backoff for transient vendor failures
//!
//! Only the vendor's rate-limit signal is retried; any other error is
//! returned immediately.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::error::FetchError;

/// `delay(attempt) = 2^attempt * base`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub max_attempts: u32,
    pub base: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base: Duration::from_millis(2000),
        }
    }
}

impl Backoff {
    pub fn new(max_attempts: u32, base: Duration) -> Self {
        Self { max_attempts, base }
    }

    /// Wait before the 0-based `attempt`. Attempt 0 is never delayed.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base.saturating_mul(2_u32.saturating_pow(attempt))
    }
}

/// Run `f` until it succeeds, fails with a non-retriable error, or the
/// attempt cap is reached. Retry `n` (1-based) is preceded by a sleep of
/// `policy.delay(n)`, so the default policy waits 4s and then 8s.
///
/// # Example
/// ```ignore
/// let body = execute_with_backoff(&Backoff::default(), "NRG", || async {
///     source.query(&account, &query).await
/// })
/// .await?;
/// ```
pub async fn execute_with_backoff<F, Fut, T>(
    policy: &Backoff,
    label: &str,
    mut f: F,
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_rate_limited() && attempt + 1 < max_attempts => {
                attempt += 1;
                let delay = policy.delay(attempt);
                warn!(
                    "{}: rate limited, retry {}/{} in {}ms",
                    label,
                    attempt + 1,
                    max_attempts,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                if e.is_rate_limited() {
                    warn!("{}: rate limited after {} attempts", label, max_attempts);
                }
                return Err(e);
            }
        }
    }
}
