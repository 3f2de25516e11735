//! Size-bounded, persisted FIFO of deferred operations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::command::{CommandRegistry, OperationCommand};
use crate::config::ResilienceConfig;
use crate::error::{self, Result};
use crate::retry::{RetryExecutor, RetryPolicy};
use crate::storage::{KeyValueStore, OFFLINE_QUEUE_KEY};

/// Metadata key whose value names the operation in logs and error records
pub const METADATA_OPERATION: &str = "operation";

/// One deferred operation with its bookkeeping
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedOperation {
    pub id: String,
    pub command: OperationCommand,
    pub metadata: HashMap<String, String>,
    pub enqueued_at: DateTime<Utc>,
    /// Failed drain attempts so far; never exceeds `max_attempts`
    pub attempt_count: u32,
    pub max_attempts: u32,
}

impl QueuedOperation {
    fn operation_name(&self) -> &str {
        self.metadata
            .get(METADATA_OPERATION)
            .map(String::as_str)
            .unwrap_or(&self.command.kind)
    }
}

/// Durable FIFO of operations awaiting connectivity.
///
/// The queue applies backpressure by capacity: enqueueing into a full queue
/// evicts the oldest entry and always returns immediately. A single-flight
/// guard keeps concurrent drain triggers from processing the same batch.
pub struct OfflineQueue {
    store: Arc<dyn KeyValueStore>,
    config: Arc<RwLock<ResilienceConfig>>,
    entries: Mutex<std::collections::VecDeque<QueuedOperation>>,
    draining: AtomicBool,
}

impl OfflineQueue {
    pub fn new(store: Arc<dyn KeyValueStore>, config: Arc<RwLock<ResilienceConfig>>) -> Self {
        Self {
            store,
            config,
            entries: Mutex::new(std::collections::VecDeque::new()),
            draining: AtomicBool::new(false),
        }
    }

    /// Load the persisted snapshot. Corrupt snapshots are discarded with a
    /// warning; restored entries keep their ids, metadata, and counts.
    pub async fn restore(&self) {
        let snapshot = match self.store.get(OFFLINE_QUEUE_KEY).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "failed to read persisted offline queue");
                return;
            }
        };
        match serde_json::from_str::<Vec<QueuedOperation>>(&snapshot) {
            Ok(restored) => {
                let mut entries = self.entries.lock().await;
                *entries = restored.into();
                info!(count = entries.len(), "restored offline queue");
            }
            Err(e) => {
                warn!(error = %e, "discarding corrupt offline queue snapshot");
                let _ = self.store.remove(OFFLINE_QUEUE_KEY).await;
            }
        }
    }

    /// Defer a command. Returns the generated operation id.
    pub async fn enqueue(
        &self,
        command: OperationCommand,
        metadata: HashMap<String, String>,
    ) -> Result<String> {
        let (max_size, max_attempts) = {
            let config = self.config.read().await;
            (config.queue.max_size, config.queue.max_attempts)
        };

        let entry = QueuedOperation {
            id: Uuid::new_v4().to_string(),
            command,
            metadata,
            enqueued_at: Utc::now(),
            attempt_count: 0,
            max_attempts,
        };
        let id = entry.id.clone();

        let snapshot = {
            let mut entries = self.entries.lock().await;
            while entries.len() >= max_size.max(1) {
                if let Some(dropped) = entries.pop_front() {
                    warn!(
                        id = %dropped.id,
                        operation = dropped.operation_name(),
                        "offline queue full, evicting oldest entry"
                    );
                }
            }
            entries.push_back(entry);
            debug!(id = %id, depth = entries.len(), "enqueued offline operation");
            entries.iter().cloned().collect::<Vec<_>>()
        };
        self.persist(&snapshot).await;

        Ok(id)
    }

    /// Process every queued operation in enqueue order.
    ///
    /// No-op when a drain is already running or the queue is empty. The live
    /// queue is snapshotted and cleared up front; retryable per-item
    /// failures below the attempt ceiling re-enqueue at the tail, everything
    /// else is dropped with a permanent-failure log. The resulting queue
    /// state is persisted regardless of partial success.
    pub async fn drain(&self, executor: &RetryExecutor, registry: &CommandRegistry) {
        if self.draining.swap(true, Ordering::SeqCst) {
            debug!("offline queue drain already in progress");
            return;
        }

        let batch: Vec<QueuedOperation> = {
            let mut entries = self.entries.lock().await;
            entries.drain(..).collect()
        };
        if batch.is_empty() {
            self.draining.store(false, Ordering::SeqCst);
            return;
        }
        self.persist(&[]).await;
        info!(count = batch.len(), "draining offline queue");

        let (retry_config, drain_delay_ms, classification) = {
            let config = self.config.read().await;
            (
                config.retry.clone(),
                config.queue.drain_base_delay_ms,
                config.classification.clone(),
            )
        };

        for mut entry in batch {
            let Some(handler) = registry.get(&entry.command.kind).await else {
                // The executable half of a restored entry is gone unless the
                // app re-registered its handler; the bookkeeping alone is
                // not runnable.
                warn!(
                    id = %entry.id,
                    kind = %entry.command.kind,
                    "dropping queued operation with no registered handler"
                );
                continue;
            };

            // Drain retries more slowly than interactive calls so a network
            // that just came back is not immediately hammered.
            let policy = RetryPolicy::from_config(entry.operation_name(), &retry_config)
                .with_base_delay(std::time::Duration::from_millis(drain_delay_ms));

            let result = executor
                .execute(|| handler.execute(&entry.command), &policy)
                .await;
            match result {
                Ok(_) => {
                    debug!(id = %entry.id, "queued operation completed");
                }
                Err(e) => {
                    entry.attempt_count += 1;
                    let retryable = error::is_retryable(&e, &classification);
                    if retryable && entry.attempt_count < entry.max_attempts {
                        debug!(
                            id = %entry.id,
                            attempt_count = entry.attempt_count,
                            "re-enqueueing failed operation"
                        );
                        self.entries.lock().await.push_back(entry);
                    } else {
                        warn!(
                            id = %entry.id,
                            operation = entry.operation_name(),
                            error = %e,
                            "queued operation permanently failed"
                        );
                    }
                }
            }
        }

        let snapshot = {
            let entries = self.entries.lock().await;
            entries.iter().cloned().collect::<Vec<_>>()
        };
        self.persist(&snapshot).await;
        self.draining.store(false, Ordering::SeqCst);
        info!(remaining = snapshot.len(), "offline queue drain complete");
    }

    async fn persist(&self, snapshot: &[QueuedOperation]) {
        let serialized = match serde_json::to_string(snapshot) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "failed to serialize offline queue");
                return;
            }
        };
        if let Err(e) = self.store.set(OFFLINE_QUEUE_KEY, &serialized).await {
            // The in-memory queue still holds the operations; only
            // restart durability is lost.
            warn!(error = %e, "failed to persist offline queue");
        }
    }

    /// Number of operations currently queued.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Whether a drain is currently running.
    pub fn is_processing(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }

    /// Snapshot of the queued operations, oldest first.
    pub async fn pending(&self) -> Vec<QueuedOperation> {
        self.entries.lock().await.iter().cloned().collect()
    }
}
