//! Global resilience policy configuration
//!
//! All retry, queue, recovery, and monitoring constants live here as
//! configurable defaults. The source values (3 retries, 1s base delay, 10s
//! cap, 5s recovery cooldown) were tuned empirically, so nothing is
//! hardcoded at the call sites: consumers merge partial updates through
//! [`ConfigUpdate`].

use serde::{Deserialize, Serialize};

/// Retry engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of executions per logical operation
    pub max_retries: u32,
    /// Base delay before the first retry, in milliseconds
    pub base_delay_ms: u64,
    /// Ceiling for the exponential component of the backoff
    pub max_delay_ms: u64,
    /// Upper bound of the random jitter added to every delay
    pub jitter_ms: u64,
    /// Multiplier for the standard exponential backoff
    pub backoff_multiplier: f64,
    /// Steeper multiplier used for backend assertion faults
    pub assertion_backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 10_000,
            jitter_ms: 1_000,
            backoff_multiplier: 2.0,
            assertion_backoff_multiplier: 3.0,
        }
    }
}

/// Offline queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum number of queued operations; oldest are evicted beyond this
    pub max_size: usize,
    /// Default per-operation ceiling on drain processing attempts
    pub max_attempts: u32,
    /// Base retry delay while draining, longer than interactive calls so a
    /// just-recovered network is not hammered
    pub drain_base_delay_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_size: 100,
            max_attempts: 3,
            drain_base_delay_ms: 2_000,
        }
    }
}

/// Backend connection recovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Minimum time between recovery attempts
    pub cooldown_ms: u64,
    /// Pause between disabling and re-enabling the network layer
    pub network_pause_ms: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: 5_000,
            network_pause_ms: 300,
        }
    }
}

/// Network monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// How long a cached connectivity status stays fresh
    pub status_ttl_ms: u64,
    /// Capacity of the transition event channel
    pub event_capacity: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            status_ttl_ms: 10_000,
            event_capacity: 64,
        }
    }
}

/// Error log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorLogConfig {
    /// Ring buffer capacity; oldest records are evicted beyond this
    pub max_records: usize,
    /// Platform tag stamped on every record
    pub platform: String,
    /// Whether records are tagged as coming from a development build
    pub dev_build: bool,
}

impl Default for ErrorLogConfig {
    fn default() -> Self {
        Self {
            max_records: 1_000,
            platform: std::env::consts::OS.to_string(),
            dev_build: cfg!(debug_assertions),
        }
    }
}

/// Per-code overrides for the retry decision.
///
/// Codes listed here beat the built-in classification table, letting an app
/// adjust retry eligibility without a new release of this crate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationConfig {
    /// Backend codes always treated as retryable
    pub retryable_codes: Vec<String>,
    /// Backend codes always treated as fatal
    pub fatal_codes: Vec<String>,
}

/// Top-level resilience configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    pub retry: RetryConfig,
    pub queue: QueueConfig,
    pub recovery: RecoveryConfig,
    pub network: NetworkConfig,
    pub error_log: ErrorLogConfig,
    pub classification: ClassificationConfig,
}

/// Partial configuration update; `None` fields keep their current value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigUpdate {
    pub max_retries: Option<u32>,
    pub base_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub jitter_ms: Option<u64>,
    pub queue_max_size: Option<usize>,
    pub queue_max_attempts: Option<u32>,
    pub drain_base_delay_ms: Option<u64>,
    pub recovery_cooldown_ms: Option<u64>,
    pub status_ttl_ms: Option<u64>,
    pub error_log_max_records: Option<usize>,
    pub retryable_codes: Option<Vec<String>>,
    pub fatal_codes: Option<Vec<String>>,
}

impl ConfigUpdate {
    /// Merge this update into an existing configuration.
    pub fn apply(&self, config: &mut ResilienceConfig) {
        if let Some(v) = self.max_retries {
            config.retry.max_retries = v;
        }
        if let Some(v) = self.base_delay_ms {
            config.retry.base_delay_ms = v;
        }
        if let Some(v) = self.max_delay_ms {
            config.retry.max_delay_ms = v;
        }
        if let Some(v) = self.jitter_ms {
            config.retry.jitter_ms = v;
        }
        if let Some(v) = self.queue_max_size {
            config.queue.max_size = v;
        }
        if let Some(v) = self.queue_max_attempts {
            config.queue.max_attempts = v;
        }
        if let Some(v) = self.drain_base_delay_ms {
            config.queue.drain_base_delay_ms = v;
        }
        if let Some(v) = self.recovery_cooldown_ms {
            config.recovery.cooldown_ms = v;
        }
        if let Some(v) = self.status_ttl_ms {
            config.network.status_ttl_ms = v;
        }
        if let Some(v) = self.error_log_max_records {
            config.error_log.max_records = v;
        }
        if let Some(v) = &self.retryable_codes {
            config.classification.retryable_codes = v.clone();
        }
        if let Some(v) = &self.fatal_codes {
            config.classification.fatal_codes = v.clone();
        }
    }
}
