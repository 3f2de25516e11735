//! Network connectivity monitoring
//!
//! Single source of truth for the device's online/offline state. The
//! monitor owns a typed broadcast channel of transition events; consumers
//! subscribe instead of reaching into shared globals.

pub mod monitor;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use monitor::NetworkMonitor;

/// Process-wide connectivity state, written only by the monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NetworkState {
    Connected,
    Disconnected,
    Checking,
}

/// Connectivity transition events. At most one event is emitted per real
/// transition; repeated identical states are suppressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkEvent {
    Online,
    Offline,
}

/// Platform connectivity provider.
///
/// Probe failures are treated as offline by the monitor (fail-closed).
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    /// Perform a fresh reachability check
    async fn check(&self) -> Result<bool>;
}
