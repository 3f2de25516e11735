//! Serializable operation intents and their handler registry

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::Result;

/// A deferred unit of work: an operation kind plus structured parameters.
///
/// Unlike a closure, a command survives serialization, so the offline queue
/// can persist it and a restarted process can rebuild the executable work
/// from the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationCommand {
    /// Registered handler kind, e.g. `"send_message"` or `"like_profile"`
    pub kind: String,
    /// Handler-defined parameters
    pub params: serde_json::Value,
}

impl OperationCommand {
    pub fn new(kind: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            params,
        }
    }
}

/// Executes commands of one registered kind.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn execute(&self, command: &OperationCommand) -> Result<serde_json::Value>;
}

/// Maps command kinds to their handlers.
#[derive(Default)]
pub struct CommandRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn CommandHandler>>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the handler for `kind`.
    pub async fn register(&self, kind: impl Into<String>, handler: Arc<dyn CommandHandler>) {
        let kind = kind.into();
        debug!(kind = %kind, "registered command handler");
        self.handlers.write().await.insert(kind, handler);
    }

    /// The handler for `kind`, if one is registered.
    pub async fn get(&self, kind: &str) -> Option<Arc<dyn CommandHandler>> {
        self.handlers.read().await.get(kind).cloned()
    }

    pub async fn contains(&self, kind: &str) -> bool {
        self.handlers.read().await.contains_key(kind)
    }
}
