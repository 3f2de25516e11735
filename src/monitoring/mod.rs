//! Structured error monitoring
//!
//! Every classified failure is recorded here before the retry engine makes
//! its next decision, so diagnostics survive even when a later retry
//! succeeds and the caller never sees the error.

pub mod error_log;

pub use error_log::{ErrorContext, ErrorMonitor, ErrorRecord, ErrorStats};
