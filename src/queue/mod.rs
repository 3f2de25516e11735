//! Durable offline operation queue
//!
//! Operations that cannot complete for lack of connectivity are deferred
//! here and drained once the network returns. Deferred work is represented
//! as a tagged, serializable [`OperationCommand`] rather than a closure, so
//! a restarted process can re-execute queued work through its registered
//! [`CommandHandler`]s instead of restoring bookkeeping only.

pub mod command;
pub mod offline_queue;

pub use command::{CommandHandler, CommandRegistry, OperationCommand};
pub use offline_queue::{OfflineQueue, QueuedOperation};
