//! Backend connection recovery
//!
//! A narrow class of backend-client faults (internal assertion failures,
//! stale connection channels) is not fixed by retrying the operation: the
//! client's realtime connection itself holds bad state. The recovery
//! controller clears it with a bounded disable/re-enable sequence, gated by
//! a cooldown so repeated faults cannot trigger a recovery storm.
//!
//! Which errors qualify is decided by [`crate::error::is_recovery_eligible`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::ResilienceConfig;
use crate::error::Result;

/// Seam over the realtime backend client's network layer.
#[async_trait]
pub trait BackendConnection: Send + Sync {
    /// Tear down the realtime network layer
    async fn disable_network(&self) -> Result<()>;

    /// Bring the realtime network layer back up
    async fn enable_network(&self) -> Result<()>;
}

/// No-op connection for hosts without a recoverable realtime client.
pub struct NoopConnection;

#[async_trait]
impl BackendConnection for NoopConnection {
    async fn disable_network(&self) -> Result<()> {
        Ok(())
    }

    async fn enable_network(&self) -> Result<()> {
        Ok(())
    }
}

/// Recovery state machine: `Idle -> Detecting -> Recovering -> Idle` on
/// success, with a detour through `RecoveryFailed` on failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecoveryState {
    Idle,
    Detecting,
    Recovering,
    RecoveryFailed,
}

/// Outcome of a finished recovery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    Success,
    Failure,
}

/// In-memory record of the most recent recovery attempt, used only for
/// cooldown gating and diagnostics. Never persisted.
#[derive(Debug, Clone)]
pub struct RecoveryAttempt {
    pub trigger_operation: String,
    pub started_at: DateTime<Utc>,
    pub outcome: Option<RecoveryOutcome>,
}

/// Controller for the disable/re-enable recovery sequence.
pub struct RecoveryController {
    connection: Arc<dyn BackendConnection>,
    config: Arc<RwLock<ResilienceConfig>>,
    state: RwLock<RecoveryState>,
    last_attempt: RwLock<Option<RecoveryAttempt>>,
}

impl RecoveryController {
    pub fn new(
        connection: Arc<dyn BackendConnection>,
        config: Arc<RwLock<ResilienceConfig>>,
    ) -> Self {
        Self {
            connection,
            config,
            state: RwLock::new(RecoveryState::Idle),
            last_attempt: RwLock::new(None),
        }
    }

    /// Whether a new recovery attempt is currently allowed.
    ///
    /// Refused while a recovery is in flight or within the cooldown window
    /// of the previous attempt's start.
    pub async fn should_attempt_recovery(&self) -> bool {
        if *self.state.read().await != RecoveryState::Idle {
            return false;
        }
        let cooldown = {
            let config = self.config.read().await;
            chrono::Duration::milliseconds(config.recovery.cooldown_ms as i64)
        };
        match self.last_attempt.read().await.as_ref() {
            Some(attempt) => Utc::now() - attempt.started_at >= cooldown,
            None => true,
        }
    }

    /// Run the bounded recovery sequence: disable the network layer, pause,
    /// re-enable it. Returns whether the sequence completed; never errors.
    pub async fn attempt_recovery(&self, trigger_operation: &str) -> bool {
        if !self.should_attempt_recovery().await {
            debug!(
                operation = trigger_operation,
                "recovery suppressed by cooldown"
            );
            return false;
        }

        *self.state.write().await = RecoveryState::Detecting;
        *self.last_attempt.write().await = Some(RecoveryAttempt {
            trigger_operation: trigger_operation.to_string(),
            started_at: Utc::now(),
            outcome: None,
        });

        let pause = {
            let config = self.config.read().await;
            Duration::from_millis(config.recovery.network_pause_ms)
        };

        info!(
            operation = trigger_operation,
            "starting backend connection recovery"
        );
        *self.state.write().await = RecoveryState::Recovering;

        let result = self.cycle_network(pause).await;

        let outcome = match &result {
            Ok(()) => {
                info!(
                    operation = trigger_operation,
                    "backend connection recovery succeeded"
                );
                RecoveryOutcome::Success
            }
            Err(e) => {
                warn!(
                    operation = trigger_operation,
                    error = %e,
                    "backend connection recovery failed"
                );
                *self.state.write().await = RecoveryState::RecoveryFailed;
                RecoveryOutcome::Failure
            }
        };

        if let Some(attempt) = self.last_attempt.write().await.as_mut() {
            attempt.outcome = Some(outcome);
        }
        *self.state.write().await = RecoveryState::Idle;

        matches!(outcome, RecoveryOutcome::Success)
    }

    async fn cycle_network(&self, pause: Duration) -> Result<()> {
        self.connection.disable_network().await?;
        tokio::time::sleep(pause).await;
        self.connection.enable_network().await?;
        Ok(())
    }

    /// Current state machine position
    pub async fn state(&self) -> RecoveryState {
        *self.state.read().await
    }

    /// Most recent attempt, for diagnostics
    pub async fn last_attempt(&self) -> Option<RecoveryAttempt> {
        self.last_attempt.read().await.clone()
    }
}
