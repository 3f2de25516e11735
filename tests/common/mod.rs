//! Shared fixtures for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use amoria_resilience::{
    CommandHandler, ConnectivityProbe, OperationCommand, ResilienceConfig, ResilienceError, Result,
};

/// Probe whose answer can be flipped from the test body.
pub struct SwitchProbe {
    connected: AtomicBool,
}

impl SwitchProbe {
    pub fn new(connected: bool) -> Arc<Self> {
        Arc::new(Self {
            connected: AtomicBool::new(connected),
        })
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConnectivityProbe for SwitchProbe {
    async fn check(&self) -> Result<bool> {
        Ok(self.connected.load(Ordering::SeqCst))
    }
}

/// Handler that fails a fixed number of times before succeeding.
pub struct FlakyHandler {
    pub calls: AtomicU32,
    failures: AtomicU32,
    error: fn() -> ResilienceError,
}

impl FlakyHandler {
    pub fn new(failures: u32, error: fn() -> ResilienceError) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
            failures: AtomicU32::new(failures),
            error,
        })
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommandHandler for FlakyHandler {
    async fn execute(&self, command: &OperationCommand) -> Result<serde_json::Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failures.load(Ordering::SeqCst) > 0 {
            self.failures.fetch_sub(1, Ordering::SeqCst);
            return Err((self.error)());
        }
        Ok(command.params.clone())
    }
}

/// Handler that records the order in which commands execute.
#[derive(Default)]
pub struct RecordingHandler {
    pub executed: Mutex<Vec<String>>,
}

impl RecordingHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn executed(&self) -> Vec<String> {
        self.executed.lock().await.clone()
    }
}

#[async_trait]
impl CommandHandler for RecordingHandler {
    async fn execute(&self, command: &OperationCommand) -> Result<serde_json::Value> {
        let label = command.params["label"]
            .as_str()
            .unwrap_or("unlabeled")
            .to_string();
        self.executed.lock().await.push(label);
        Ok(serde_json::Value::Null)
    }
}

/// Backend connection that counts disable/enable cycles.
pub struct CountingConnection {
    pub disables: AtomicU32,
    pub enables: AtomicU32,
}

impl CountingConnection {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            disables: AtomicU32::new(0),
            enables: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl amoria_resilience::BackendConnection for CountingConnection {
    async fn disable_network(&self) -> Result<()> {
        self.disables.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn enable_network(&self) -> Result<()> {
        self.enables.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Route crate logs through a test subscriber, honoring `RUST_LOG`.
pub fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Config with millisecond-scale delays so tests run fast.
pub fn fast_config() -> ResilienceConfig {
    let mut config = ResilienceConfig::default();
    config.retry.base_delay_ms = 1;
    config.retry.jitter_ms = 0;
    config.queue.drain_base_delay_ms = 1;
    config.recovery.network_pause_ms = 1;
    config.network.status_ttl_ms = 0;
    config
}
