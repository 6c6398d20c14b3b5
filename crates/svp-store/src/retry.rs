//! Bounded retry for gateway store operations.

use std::future::Future;

use tracing::{error, warn};

use svp_config::RetryPolicy;

use crate::error::StoreError;

/// Run `operation` with up to `policy.max_retries` retries after the first
/// attempt. The closure receives `force_reconnect`, false on the first
/// attempt and true on every retry so the connection manager rebuilds its
/// clients. Transient errors sleep `retry_delay * backoff^(attempt-1)` and
/// retry; anything else returns immediately; an exhausted budget returns
/// the last transient error.
pub async fn execute_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    op_name: &str,
    mut operation: F,
) -> Result<T, StoreError>
where
    F: FnMut(bool) -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let total_attempts = policy.max_retries + 1;

    let mut last_error = None;
    for attempt in 1..=total_attempts {
        match operation(attempt > 1).await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() => {
                if attempt == total_attempts {
                    error!(
                        operation = op_name,
                        attempts = total_attempts,
                        %err,
                        "store operation failed after exhausting retries"
                    );
                    return Err(err);
                }
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    operation = op_name,
                    attempt,
                    max_attempts = total_attempts,
                    delay_secs = delay.as_secs_f64(),
                    %err,
                    "store operation failed, retrying"
                );
                last_error = Some(err);
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }

    // Unreachable: the loop either returned a value or the last error.
    Err(last_error.expect("retry loop exited without error"))
}
