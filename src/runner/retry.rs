//! Retry Logic with Exponential Backoff
//!
//! A unit of work that fails is re-run from the last checkpoint until the
//! configured attempts are used up. Every failure counts; unit commands are
//! opaque and there is no way to tell a transient error from a real one.

use std::future::Future;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::shutdown::ShutdownState;

/// Result of a retry operation
#[derive(Debug)]
pub struct RetryResult<T> {
    /// The successful result, or the error of the final attempt
    pub result: Result<T, String>,
    /// Number of attempts made
    pub attempts: u32,
    /// Total time spent waiting between attempts
    pub total_retry_time_ms: u64,
    /// Whether more than one attempt was needed
    pub was_retried: bool,
    /// A shutdown request stopped the retries before they were exhausted
    pub interrupted: bool,
}

/// Delay before the retry following `attempt` (1-based)
pub fn delay_after(config: &RetryConfig, attempt: u32) -> u64 {
    let factor = config
        .backoff_multiplier
        .max(1.0)
        .powi(attempt.saturating_sub(1) as i32);
    ((config.initial_delay_ms as f64 * factor) as u64).min(config.max_delay_ms)
}

/// Execute an async operation with retry logic
///
/// # Arguments
/// * `operation` - Called with the 1-based attempt number
/// * `config` - Retry configuration; `max_attempts` of 0 still runs once
/// * `shutdown` - Waiting between attempts ends early on shutdown
/// * `on_retry` - Invoked before each retry with (attempt, error, delay_ms)
pub async fn with_retry<F, Fut, T, R>(
    operation: F,
    config: &RetryConfig,
    shutdown: &ShutdownState,
    mut on_retry: R,
) -> RetryResult<T>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = Result<T, String>>,
    R: FnMut(u32, &str, u64),
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempts = 0u32;
    let mut total_retry_time_ms = 0u64;

    loop {
        attempts += 1;
        let error = match operation(attempts).await {
            Ok(value) => {
                return RetryResult {
                    result: Ok(value),
                    attempts,
                    total_retry_time_ms,
                    was_retried: attempts > 1,
                    interrupted: false,
                };
            }
            Err(error) => error,
        };

        if attempts >= max_attempts {
            return RetryResult {
                result: Err(error),
                attempts,
                total_retry_time_ms,
                was_retried: attempts > 1,
                interrupted: false,
            };
        }

        let delay_ms = delay_after(config, attempts);
        log::warn!(
            "[Retry] Attempt {}/{} failed: {}. Retrying in {}ms...",
            attempts,
            max_attempts,
            error.lines().next().unwrap_or(&error),
            delay_ms
        );
        on_retry(attempts, &error, delay_ms);

        if !shutdown
            .sleep_unless_shutdown(Duration::from_millis(delay_ms))
            .await
        {
            return RetryResult {
                result: Err(error),
                attempts,
                total_retry_time_ms,
                was_retried: attempts > 1,
                interrupted: true,
            };
        }
        total_retry_time_ms += delay_ms;
    }
}
