//! Retry execution loop

use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::policy::RetryPolicy;
use crate::config::ResilienceConfig;
use crate::error::{self, ErrorKind, ResilienceError, Result};
use crate::monitoring::{ErrorContext, ErrorMonitor};
use crate::network::{NetworkMonitor, NetworkState};
use crate::recovery::RecoveryController;

/// Executes operations under a [`RetryPolicy`].
///
/// Attempts are strictly sequential; the executor introduces no concurrency
/// of its own and exposes no cancellation, so an in-flight loop runs to
/// success, a fatal error, or exhaustion.
pub struct RetryExecutor {
    monitor: Arc<NetworkMonitor>,
    errors: Arc<ErrorMonitor>,
    recovery: Arc<RecoveryController>,
    config: Arc<RwLock<ResilienceConfig>>,
}

impl RetryExecutor {
    pub fn new(
        monitor: Arc<NetworkMonitor>,
        errors: Arc<ErrorMonitor>,
        recovery: Arc<RecoveryController>,
        config: Arc<RwLock<ResilienceConfig>>,
    ) -> Self {
        Self {
            monitor,
            errors,
            recovery,
            config,
        }
    }

    /// Execute `operation` with at most `policy.max_retries` executions.
    ///
    /// Connectivity is checked before every attempt: when offline, a
    /// synthesized network failure takes the place of a doomed round trip.
    /// Every failure is recorded before the retry/abort decision, so the
    /// log reflects each attempt and not just the final outcome.
    pub async fn execute<F, Fut, T>(&self, operation: F, policy: &RetryPolicy) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_retries = policy.max_retries.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let online = self.monitor.is_online().await;
            let error = if !online {
                debug!(
                    operation = %policy.operation_name,
                    attempt,
                    "offline, synthesizing network failure"
                );
                ResilienceError::network("no connectivity")
            } else {
                match operation().await {
                    Ok(value) => {
                        if attempt > 1 {
                            info!(
                                operation = %policy.operation_name,
                                attempt,
                                "operation succeeded after retry"
                            );
                        }
                        return Ok(value);
                    }
                    Err(error) => error,
                }
            };

            let kind = error.kind();
            let network_status = if online {
                NetworkState::Connected
            } else {
                NetworkState::Disconnected
            };
            self.errors
                .record(
                    &error,
                    ErrorContext::new(policy.operation_name.clone())
                        .with_attempt(attempt)
                        .with_network_status(network_status),
                )
                .await;

            let (retryable, assertion_multiplier) = {
                let config = self.config.read().await;
                let retryable = match &policy.retry_predicate {
                    Some(predicate) => predicate(&error),
                    None => error::is_retryable(&error, &config.classification),
                };
                (retryable, config.retry.assertion_backoff_multiplier)
            };

            if !retryable {
                debug!(
                    operation = %policy.operation_name,
                    kind = kind.as_str(),
                    "fatal error, aborting without retry"
                );
                return Err(error);
            }

            if attempt >= max_retries {
                warn!(
                    operation = %policy.operation_name,
                    attempts = attempt,
                    "retries exhausted"
                );
                return Err(error);
            }

            // Backend assertion faults back off harder and get one shot at
            // a connection recovery before the next attempt; the cooldown
            // gate inside the controller absorbs repeat triggers.
            let multiplier = if kind == ErrorKind::InternalAssertion {
                assertion_multiplier
            } else {
                policy.backoff_multiplier
            };
            if error::is_recovery_eligible(&error) && self.recovery.should_attempt_recovery().await
            {
                self.recovery
                    .attempt_recovery(&policy.operation_name)
                    .await;
            }

            let delay = policy.delay_for_attempt(attempt, multiplier);
            if let Some(callback) = &policy.on_retry {
                callback(attempt, &error);
            }
            debug!(
                operation = %policy.operation_name,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "retrying after backoff"
            );
            sleep(delay).await;
        }
    }
}
