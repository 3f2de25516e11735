//! Client-side resilience layer for the Amoria app
//!
//! This crate sits between application data-access code and the backend
//! SDK, turning flaky mobile networking into predictable behavior:
//!
//! - Policy-driven retry with exponential backoff and jitter
//! - A durable, size-bounded offline queue that drains on reconnect
//! - A single network monitor with typed transition events
//! - Bounded recovery of stale backend connections
//! - Error classification, user messaging, and a persisted error log
//!
//! Collaborators (connectivity probe, key-value storage, backend
//! connection) are traits, so the crate stays independent of any concrete
//! platform or backend SDK.

// Core modules
pub mod config;
pub mod error;
pub mod monitoring;
pub mod network;
pub mod queue;
pub mod recovery;
pub mod retry;
pub mod service;
pub mod storage;

// Re-export main types for convenience
pub use config::{ConfigUpdate, ResilienceConfig};
pub use error::{ErrorKind, ResilienceError, Result};
pub use monitoring::{ErrorMonitor, ErrorRecord, ErrorStats};
pub use network::{ConnectivityProbe, NetworkEvent, NetworkMonitor, NetworkState};
pub use queue::{CommandHandler, CommandRegistry, OfflineQueue, OperationCommand};
pub use recovery::{BackendConnection, NoopConnection, RecoveryController, RecoveryState};
pub use retry::{RetryExecutor, RetryPolicy};
pub use service::{CommandOutcome, ResilienceService};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
