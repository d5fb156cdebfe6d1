//! Bounded retry with exponential backoff for gateway calls.
//!
//! Only connection-class failures are re-attempted; a rejection or a
//! malformed response is returned to the caller on the first hit.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use freightdesk_core::gateway::GatewayError;

const BASE_DELAY_MS: u64 = 500;
const MAX_DELAY_MS: u64 = 5_000;

#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts: max_attempts.max(1) }
    }

    /// Delay before the attempt numbered `attempt` (1-based; the first
    /// attempt has no delay). Doubles per attempt, capped.
    pub fn delay_before(self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exponent = attempt.saturating_sub(2).min(16);
        let delay = BASE_DELAY_MS.saturating_mul(1_u64 << exponent);
        Duration::from_millis(delay.min(MAX_DELAY_MS))
    }
}

pub async fn with_retries<T, F, Fut>(
    operation: &str,
    policy: RetryPolicy,
    mut call: F,
) -> Result<T, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    let mut attempt = 1;
    loop {
        let delay = policy.delay_before(attempt);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match call().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_retryable() && attempt < policy.max_attempts => {
                warn!(
                    event_name = "gateway.retry",
                    operation,
                    attempt,
                    max_attempts = policy.max_attempts,
                    error = %error,
                    "gateway call failed; retrying"
                );
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}
