//! Resilience service facade
//!
//! Application code talks to one explicitly constructed [`ResilienceService`]
//! that owns the monitor, retry executor, offline queue, recovery
//! controller, and error log. Components are wired by dependency injection
//! at startup; there are no module-level singletons, so tests can build as
//! many isolated services as they need.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{ConfigUpdate, ResilienceConfig};
use crate::error::{ErrorKind, ResilienceError, Result};
use crate::monitoring::{ErrorMonitor, ErrorRecord, ErrorStats};
use crate::network::{ConnectivityProbe, NetworkEvent, NetworkMonitor, NetworkState};
use crate::queue::{CommandHandler, CommandRegistry, OfflineQueue, OperationCommand};
use crate::recovery::{BackendConnection, RecoveryController};
use crate::retry::{RetryExecutor, RetryPolicy};
use crate::storage::KeyValueStore;

/// Result of running a command through the resilience layer
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    /// The operation completed (possibly after retries)
    Completed(serde_json::Value),
    /// Connectivity was absent after all retries; the command was queued
    /// offline under the returned operation id
    Queued(String),
}

/// Facade over the resilience components.
pub struct ResilienceService {
    config: Arc<RwLock<ResilienceConfig>>,
    monitor: Arc<NetworkMonitor>,
    errors: Arc<ErrorMonitor>,
    recovery: Arc<RecoveryController>,
    queue: Arc<OfflineQueue>,
    registry: Arc<CommandRegistry>,
    executor: Arc<RetryExecutor>,
    drain_task: Mutex<Option<JoinHandle<()>>>,
}

impl ResilienceService {
    /// Construct the service and restore persisted state (offline queue and
    /// error log) from the store.
    pub async fn new(
        probe: Arc<dyn ConnectivityProbe>,
        store: Arc<dyn KeyValueStore>,
        connection: Arc<dyn BackendConnection>,
        config: ResilienceConfig,
    ) -> Self {
        let config = Arc::new(RwLock::new(config));
        let network_config = config.read().await.network.clone();

        let monitor = Arc::new(NetworkMonitor::new(probe, &network_config));
        let errors = Arc::new(ErrorMonitor::new(store.clone(), config.clone()));
        let recovery = Arc::new(RecoveryController::new(connection, config.clone()));
        let queue = Arc::new(OfflineQueue::new(store, config.clone()));
        let executor = Arc::new(RetryExecutor::new(
            monitor.clone(),
            errors.clone(),
            recovery.clone(),
            config.clone(),
        ));

        errors.restore().await;
        queue.restore().await;

        Self {
            config,
            monitor,
            errors,
            recovery,
            queue,
            registry: Arc::new(CommandRegistry::new()),
            executor,
            drain_task: Mutex::new(None),
        }
    }

    /// Start the drain-on-reconnect subscriber.
    ///
    /// Each `Online` transition triggers exactly one drain; duplicate
    /// notifications are already collapsed by the monitor.
    pub async fn start(self: &Arc<Self>) {
        let mut task = self.drain_task.lock().await;
        if task.is_some() {
            debug!("resilience service already started");
            return;
        }

        let service = Arc::downgrade(self);
        let mut events = self.monitor.subscribe();
        *task = Some(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(NetworkEvent::Online) => {
                        let Some(service) = service.upgrade() else { break };
                        info!("connectivity restored, draining offline queue");
                        service.queue.drain(&service.executor, &service.registry).await;
                    }
                    Ok(NetworkEvent::Offline) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "network event subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }));
        info!("resilience service started");
    }

    /// Stop the background subscriber.
    pub async fn shutdown(&self) {
        if let Some(task) = self.drain_task.lock().await.take() {
            task.abort();
        }
    }

    /// Register the handler that executes commands of `kind`, both for
    /// `run_command` and for queued work restored after a restart.
    pub async fn register_handler(&self, kind: impl Into<String>, handler: Arc<dyn CommandHandler>) {
        self.registry.register(kind, handler).await;
    }

    /// Execute an arbitrary async operation under the default retry policy.
    pub async fn with_retry<F, Fut, T>(&self, operation_name: &str, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let policy = {
            let config = self.config.read().await;
            RetryPolicy::from_config(operation_name, &config.retry)
        };
        self.executor.execute(operation, &policy).await
    }

    /// Execute an arbitrary async operation under a caller-supplied policy.
    pub async fn with_policy<F, Fut, T>(&self, policy: &RetryPolicy, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.executor.execute(operation, policy).await
    }

    /// Run a registered command with retry, hardening network absence into
    /// an offline enqueue instead of a plain failure.
    pub async fn run_command(
        &self,
        command: OperationCommand,
        metadata: HashMap<String, String>,
    ) -> Result<CommandOutcome> {
        let handler = self.registry.get(&command.kind).await.ok_or_else(|| {
            ResilienceError::internal(format!("no handler registered for '{}'", command.kind))
        })?;

        let policy = {
            let config = self.config.read().await;
            RetryPolicy::from_config(command.kind.clone(), &config.retry)
        };

        let result = self
            .executor
            .execute(|| handler.execute(&command), &policy)
            .await;
        match result {
            Ok(value) => Ok(CommandOutcome::Completed(value)),
            // Queueing keys on the Network kind, which covers both the
            // synthesized no-connectivity failure and backend `unavailable`.
            // The backend reports `unavailable` when it cannot be reached
            // from this client, so both cases are offline from the app's
            // point of view and the command is safe to defer.
            Err(e) if e.kind() == ErrorKind::Network => {
                info!(kind = %command.kind, "network absent, deferring command offline");
                let id = self.queue.enqueue(command, metadata).await?;
                Ok(CommandOutcome::Queued(id))
            }
            Err(e) => Err(e),
        }
    }

    /// Defer a command without attempting it first.
    pub async fn enqueue_offline(
        &self,
        command: OperationCommand,
        metadata: HashMap<String, String>,
    ) -> Result<String> {
        self.queue.enqueue(command, metadata).await
    }

    /// Drain the offline queue now, regardless of connectivity events.
    pub async fn drain_now(&self) {
        self.queue.drain(&self.executor, &self.registry).await;
    }

    /// User-facing message for an error, derived purely from the taxonomy.
    pub fn error_message(&self, error: &ResilienceError) -> &'static str {
        error.user_message()
    }

    /// Current connectivity, probing afresh when the cache is stale.
    pub async fn is_online(&self) -> bool {
        self.monitor.is_online().await
    }

    /// Current connectivity state without forcing a probe result format.
    pub async fn network_status(&self) -> NetworkState {
        self.monitor.current_status().await
    }

    /// Subscribe to connectivity transitions.
    pub fn subscribe_network(&self) -> broadcast::Receiver<NetworkEvent> {
        self.monitor.subscribe()
    }

    /// Push-path hook for platform connectivity callbacks.
    pub async fn handle_connectivity_change(&self, connected: bool) {
        self.monitor.handle_connectivity_change(connected).await;
    }

    /// Number of operations waiting in the offline queue.
    pub async fn offline_queue_len(&self) -> usize {
        self.queue.len().await
    }

    /// Whether an offline queue drain is currently running.
    pub fn is_queue_processing(&self) -> bool {
        self.queue.is_processing()
    }

    /// Merge a partial update into the global policy config.
    pub async fn update_config(&self, update: ConfigUpdate) {
        let mut config = self.config.write().await;
        update.apply(&mut config);
        debug!("resilience config updated");
    }

    /// Snapshot of the current config.
    pub async fn config(&self) -> ResilienceConfig {
        self.config.read().await.clone()
    }

    /// Aggregated error statistics over the trailing window.
    pub async fn error_stats(&self, window_hours: i64) -> ErrorStats {
        self.errors.stats(window_hours).await
    }

    /// The most recent `n` error records.
    pub async fn recent_errors(&self, n: usize) -> Vec<ErrorRecord> {
        self.errors.recent(n).await
    }

    /// Recovery controller, exposed for diagnostics surfaces.
    pub fn recovery(&self) -> &Arc<RecoveryController> {
        &self.recovery
    }
}
