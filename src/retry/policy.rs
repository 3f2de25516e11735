//! Retry policy value object and backoff arithmetic

use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::error::ResilienceError;

/// Per-call retry policy. Immutable once handed to the executor.
#[derive(Clone)]
pub struct RetryPolicy {
    /// Name used in logs and error records
    pub operation_name: String,
    /// Maximum number of executions (not additional retries)
    pub max_retries: u32,
    /// Base delay before the first retry
    pub base_delay: Duration,
    /// Ceiling for the exponential component; jitter is added on top
    pub max_delay: Duration,
    /// Upper bound of the random jitter added to every delay
    pub jitter: Duration,
    /// Exponential multiplier for the standard backoff
    pub backoff_multiplier: f64,
    /// Optional override of the classification-based retry decision
    pub retry_predicate: Option<Arc<dyn Fn(&ResilienceError) -> bool + Send + Sync>>,
    /// Invoked before each backoff sleep with the attempt number and error
    pub on_retry: Option<Arc<dyn Fn(u32, &ResilienceError) + Send + Sync>>,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("operation_name", &self.operation_name)
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("jitter", &self.jitter)
            .field("backoff_multiplier", &self.backoff_multiplier)
            .field("retry_predicate", &self.retry_predicate.is_some())
            .field("on_retry", &self.on_retry.is_some())
            .finish()
    }
}

impl RetryPolicy {
    /// Build a policy from the global retry config.
    pub fn from_config(operation_name: impl Into<String>, config: &RetryConfig) -> Self {
        Self {
            operation_name: operation_name.into(),
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: Duration::from_millis(config.jitter_ms),
            backoff_multiplier: config.backoff_multiplier,
            retry_predicate: None,
            on_retry: None,
        }
    }

    /// Set the base delay, used by the offline queue's slower drain policy.
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Override the maximum number of executions.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Override the classification-based retry decision.
    pub fn with_retry_predicate(
        mut self,
        predicate: impl Fn(&ResilienceError) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.retry_predicate = Some(Arc::new(predicate));
        self
    }

    /// Observe retries, e.g. to surface progress in the UI.
    pub fn with_on_retry(
        mut self,
        callback: impl Fn(u32, &ResilienceError) + Send + Sync + 'static,
    ) -> Self {
        self.on_retry = Some(Arc::new(callback));
        self
    }

    /// The un-jittered exponential delay after failed attempt `attempt`
    /// (1-based), capped at `max_delay`.
    pub fn backoff_base(&self, attempt: u32, multiplier: f64) -> Duration {
        let exp = self.base_delay.as_millis() as f64
            * multiplier.powi(attempt.saturating_sub(1) as i32);
        let capped = exp.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// The full delay for failed attempt `attempt`: capped exponential base
    /// plus random jitter to avoid synchronized retry storms.
    pub fn delay_for_attempt(&self, attempt: u32, multiplier: f64) -> Duration {
        let base = self.backoff_base(attempt, multiplier);
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return base;
        }
        let jitter = rand::thread_rng().gen_range(0..jitter_ms);
        base + Duration::from_millis(jitter)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config("unnamed", &RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn policy(base_ms: u64, jitter_ms: u64) -> RetryPolicy {
        let config = RetryConfig {
            base_delay_ms: base_ms,
            jitter_ms,
            ..Default::default()
        };
        RetryPolicy::from_config("test", &config)
    }

    #[rstest]
    #[case(1, 2.0, 1_000)]
    #[case(2, 2.0, 2_000)]
    #[case(3, 2.0, 4_000)]
    #[case(4, 2.0, 8_000)]
    // 1000 * 2^4 = 16000, above the 10s default cap.
    #[case(5, 2.0, 10_000)]
    #[case(9, 2.0, 10_000)]
    // Steeper assertion-fault multiplier.
    #[case(2, 3.0, 3_000)]
    #[case(3, 3.0, 9_000)]
    fn backoff_base_follows_capped_exponential(
        #[case] attempt: u32,
        #[case] multiplier: f64,
        #[case] expected_ms: u64,
    ) {
        let policy = policy(1_000, 0);
        assert_eq!(
            policy.backoff_base(attempt, multiplier),
            Duration::from_millis(expected_ms)
        );
    }

    #[test]
    fn jittered_delay_stays_within_the_documented_window() {
        let policy = policy(1_000, 1_000);
        for attempt in 1..=6 {
            let base = policy.backoff_base(attempt, 2.0);
            for _ in 0..50 {
                let delay = policy.delay_for_attempt(attempt, 2.0);
                assert!(delay >= base, "delay below un-jittered base");
                assert!(delay < base + Duration::from_millis(1_000));
            }
        }
    }

    #[test]
    fn zero_jitter_is_deterministic() {
        let policy = policy(500, 0);
        assert_eq!(
            policy.delay_for_attempt(2, 2.0),
            Duration::from_millis(1_000)
        );
    }
}
