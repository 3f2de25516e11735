//! Bounded, persisted error log with derived statistics

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::ResilienceConfig;
use crate::error::{classify, ErrorKind, ResilienceError};
use crate::network::NetworkState;
use crate::storage::{KeyValueStore, ERROR_LOG_KEY};

/// Context captured alongside a failure
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub operation_name: String,
    pub retry_attempt: u32,
    pub network_status: NetworkState,
    pub user_id: Option<String>,
    pub entity_id: Option<String>,
}

impl ErrorContext {
    pub fn new(operation_name: impl Into<String>) -> Self {
        Self {
            operation_name: operation_name.into(),
            retry_attempt: 1,
            network_status: NetworkState::Connected,
            user_id: None,
            entity_id: None,
        }
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.retry_attempt = attempt;
        self
    }

    pub fn with_network_status(mut self, status: NetworkState) -> Self {
        self.network_status = status;
        self
    }

    pub fn with_user_id(mut self, id: impl Into<String>) -> Self {
        self.user_id = Some(id.into());
        self
    }

    pub fn with_entity_id(mut self, id: impl Into<String>) -> Self {
        self.entity_id = Some(id.into());
        self
    }
}

/// Immutable record of one classified failure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub operation_name: String,
    pub message: String,
    pub code: Option<String>,
    pub kind: ErrorKind,
    pub platform: String,
    pub is_dev_build: bool,
    pub network_status: NetworkState,
    pub retry_attempt: u32,
    pub user_id: Option<String>,
    pub entity_id: Option<String>,
}

/// Aggregated error counts over a trailing window
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorStats {
    pub total: u64,
    pub by_operation: HashMap<String, u64>,
    pub by_code: HashMap<String, u64>,
    pub by_hour: HashMap<u32, u64>,
}

/// Bounded ring buffer of error records, persisted after every append.
pub struct ErrorMonitor {
    store: Arc<dyn KeyValueStore>,
    config: Arc<RwLock<ResilienceConfig>>,
    records: RwLock<VecDeque<ErrorRecord>>,
}

impl ErrorMonitor {
    pub fn new(store: Arc<dyn KeyValueStore>, config: Arc<RwLock<ResilienceConfig>>) -> Self {
        Self {
            store,
            config,
            records: RwLock::new(VecDeque::new()),
        }
    }

    /// Load the persisted log. Corrupt snapshots are discarded with a
    /// warning, never propagated.
    pub async fn restore(&self) {
        let snapshot = match self.store.get(ERROR_LOG_KEY).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "failed to read persisted error log");
                return;
            }
        };
        match serde_json::from_str::<Vec<ErrorRecord>>(&snapshot) {
            Ok(restored) => {
                let mut records = self.records.write().await;
                *records = restored.into();
                debug!(count = records.len(), "restored error log");
            }
            Err(e) => {
                warn!(error = %e, "discarding corrupt error log snapshot");
                let _ = self.store.remove(ERROR_LOG_KEY).await;
            }
        }
    }

    /// Append a classified failure to the log and persist the snapshot.
    pub async fn record(&self, error: &ResilienceError, context: ErrorContext) -> ErrorRecord {
        let (max_records, platform, is_dev_build) = {
            let config = self.config.read().await;
            (
                config.error_log.max_records,
                config.error_log.platform.clone(),
                config.error_log.dev_build,
            )
        };

        let record = ErrorRecord {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            operation_name: context.operation_name,
            message: error.to_string(),
            code: error.backend_code().map(str::to_string),
            kind: classify(error),
            platform,
            is_dev_build,
            network_status: context.network_status,
            retry_attempt: context.retry_attempt,
            user_id: context.user_id,
            entity_id: context.entity_id,
        };

        let snapshot = {
            let mut records = self.records.write().await;
            records.push_back(record.clone());
            while records.len() > max_records {
                records.pop_front();
            }
            records.iter().cloned().collect::<Vec<_>>()
        };
        self.persist(&snapshot).await;

        debug!(
            operation = %record.operation_name,
            kind = record.kind.as_str(),
            attempt = record.retry_attempt,
            "recorded failure"
        );
        record
    }

    async fn persist(&self, snapshot: &[ErrorRecord]) {
        let serialized = match serde_json::to_string(snapshot) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "failed to serialize error log");
                return;
            }
        };
        if let Err(e) = self.store.set(ERROR_LOG_KEY, &serialized).await {
            // The in-memory log is still intact; only durability is lost.
            warn!(error = %e, "failed to persist error log");
        }
    }

    /// Aggregate counts over the trailing `window_hours`. Read-only.
    pub async fn stats(&self, window_hours: i64) -> ErrorStats {
        let cutoff = Utc::now() - Duration::hours(window_hours);
        let records = self.records.read().await;

        let mut stats = ErrorStats::default();
        for record in records.iter().filter(|r| r.timestamp >= cutoff) {
            stats.total += 1;
            *stats
                .by_operation
                .entry(record.operation_name.clone())
                .or_insert(0) += 1;
            let code = record
                .code
                .clone()
                .unwrap_or_else(|| record.kind.as_str().to_string());
            *stats.by_code.entry(code).or_insert(0) += 1;
            *stats.by_hour.entry(record.timestamp.hour()).or_insert(0) += 1;
        }
        stats
    }

    /// The most recent `n` records, newest last.
    pub async fn recent(&self, n: usize) -> Vec<ErrorRecord> {
        let records = self.records.read().await;
        records.iter().rev().take(n).rev().cloned().collect()
    }

    /// Number of records currently held.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Drop all records and the persisted snapshot.
    pub async fn clear(&self) {
        self.records.write().await.clear();
        if let Err(e) = self.store.remove(ERROR_LOG_KEY).await {
            warn!(error = %e, "failed to clear persisted error log");
        }
    }
}
