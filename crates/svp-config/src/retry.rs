//! Per-dependency retry tuples.

use std::time::Duration;

use crate::env_parse;

/// `(max_retries, retry_delay, backoff, stability_threshold)` for one
/// backing dependency. The stability threshold only matters for long-lived
/// consumers (broker workers); store clients ignore it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub backoff: f64,
    pub stability_threshold: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, retry_delay_secs: f64, backoff: f64, threshold_secs: f64) -> Self {
        Self {
            max_retries,
            retry_delay: Duration::from_secs_f64(retry_delay_secs),
            backoff,
            stability_threshold: Duration::from_secs_f64(threshold_secs),
        }
    }

    fn from_env_prefix(prefix: &str, defaults: (u32, f64, f64, f64)) -> Self {
        Self::new(
            env_parse(&format!("{prefix}_MAX_RETRIES"), defaults.0),
            env_parse(&format!("{prefix}_RETRY_DELAY_SECONDS"), defaults.1),
            env_parse(&format!("{prefix}_BACKOFF_MULTIPLIER"), defaults.2),
            env_parse(&format!("{prefix}_STABILITY_THRESHOLD_SECONDS"), defaults.3),
        )
    }

    pub fn broker_from_env() -> Self {
        Self::from_env_prefix("SVP_BROKER", (5, 2.0, 2.0, 60.0))
    }

    pub fn kv_from_env() -> Self {
        Self::from_env_prefix("SVP_REDIS", (3, 0.5, 2.0, 0.0))
    }

    pub fn doc_from_env() -> Self {
        Self::from_env_prefix("SVP_DATABASE", (3, 1.0, 2.0, 0.0))
    }

    /// Policy for operations touching both stores: the wider budget wins.
    pub fn merged(kv: &RetryPolicy, doc: &RetryPolicy) -> Self {
        Self {
            max_retries: kv.max_retries.max(doc.max_retries),
            retry_delay: kv.retry_delay.max(doc.retry_delay),
            backoff: if kv.backoff > doc.backoff { kv.backoff } else { doc.backoff },
            stability_threshold: kv.stability_threshold.max(doc.stability_threshold),
        }
    }

    /// Delay before the retry following `attempt` (1-based):
    /// `retry_delay * backoff^(attempt - 1)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.backoff.powi(attempt.saturating_sub(1) as i32);
        self.retry_delay.mul_f64(factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_follow_exponential_backoff() {
        let policy = RetryPolicy::new(5, 2.0, 2.0, 60.0);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(16));
    }

    #[test]
    fn merged_policy_takes_the_wider_budget() {
        let kv = RetryPolicy::new(3, 0.5, 2.0, 0.0);
        let doc = RetryPolicy::new(5, 1.0, 1.5, 0.0);
        let merged = RetryPolicy::merged(&kv, &doc);

        assert_eq!(merged.max_retries, 5);
        assert_eq!(merged.retry_delay, Duration::from_secs(1));
        assert_eq!(merged.backoff, 2.0);
    }
}
