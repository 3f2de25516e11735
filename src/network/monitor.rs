//! Connectivity state cache and transition events

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use super::{ConnectivityProbe, NetworkEvent, NetworkState};
use crate::config::NetworkConfig;

struct MonitorState {
    state: NetworkState,
    last_checked: Option<Instant>,
}

/// Single source of truth for connectivity.
///
/// The cached status is re-probed once it is older than the configured TTL.
/// All writes go through this type; other components only read the state or
/// subscribe to transition events, so no further locking discipline is
/// needed on their side.
pub struct NetworkMonitor {
    probe: Arc<dyn ConnectivityProbe>,
    status_ttl: Duration,
    inner: RwLock<MonitorState>,
    events: broadcast::Sender<NetworkEvent>,
}

impl NetworkMonitor {
    /// Create a monitor around a platform connectivity probe.
    ///
    /// The initial state is `Disconnected` until the first probe; callers
    /// that want an immediate answer should `refresh()` at startup.
    pub fn new(probe: Arc<dyn ConnectivityProbe>, config: &NetworkConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            probe,
            status_ttl: Duration::from_millis(config.status_ttl_ms),
            inner: RwLock::new(MonitorState {
                state: NetworkState::Disconnected,
                last_checked: None,
            }),
            events,
        }
    }

    /// Subscribe to connectivity transitions.
    pub fn subscribe(&self) -> broadcast::Receiver<NetworkEvent> {
        self.events.subscribe()
    }

    /// Current connectivity, probing afresh when the cached value is stale.
    pub async fn current_status(&self) -> NetworkState {
        {
            let inner = self.inner.read().await;
            if let Some(checked) = inner.last_checked {
                if checked.elapsed() < self.status_ttl && inner.state != NetworkState::Checking {
                    return inner.state;
                }
            }
        }
        self.refresh().await
    }

    /// Convenience accessor used before every retry attempt.
    pub async fn is_online(&self) -> bool {
        self.current_status().await == NetworkState::Connected
    }

    /// Force a fresh probe and update the cached state.
    pub async fn refresh(&self) -> NetworkState {
        {
            let mut inner = self.inner.write().await;
            inner.state = match inner.state {
                NetworkState::Connected => NetworkState::Connected,
                _ => NetworkState::Checking,
            };
        }
        let connected = match self.probe.check().await {
            Ok(connected) => connected,
            Err(e) => {
                // Fail closed: an unanswerable probe means we must assume
                // the network is gone.
                warn!(error = %e, "connectivity probe failed, assuming offline");
                false
            }
        };
        self.apply(connected).await
    }

    /// Push-path entry point for platform connectivity callbacks.
    pub async fn handle_connectivity_change(&self, connected: bool) {
        self.apply(connected).await;
    }

    async fn apply(&self, connected: bool) -> NetworkState {
        let new_state = if connected {
            NetworkState::Connected
        } else {
            NetworkState::Disconnected
        };

        let transition = {
            let mut inner = self.inner.write().await;
            let previous = inner.state;
            inner.state = new_state;
            inner.last_checked = Some(Instant::now());
            // Checking is a probe-in-progress marker, not a real status, so
            // Checking -> Disconnected is not an offline transition unless
            // we were previously connected.
            match (previous, new_state) {
                (NetworkState::Connected, NetworkState::Connected) => None,
                (NetworkState::Disconnected, NetworkState::Disconnected) => None,
                (NetworkState::Checking, NetworkState::Disconnected) => None,
                (_, NetworkState::Connected) => Some(NetworkEvent::Online),
                (NetworkState::Connected, NetworkState::Disconnected) => {
                    Some(NetworkEvent::Offline)
                }
                _ => None,
            }
        };

        if let Some(event) = transition {
            match event {
                NetworkEvent::Online => info!("network transition: online"),
                NetworkEvent::Offline => info!("network transition: offline"),
            }
            // Send fails only when nobody is subscribed, which is fine.
            let _ = self.events.send(event);
        } else {
            debug!(?new_state, "connectivity unchanged");
        }

        new_state
    }
}
