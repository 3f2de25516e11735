//! Policy-driven retry with exponential backoff and jitter
//!
//! The retry engine wraps arbitrary async operations. Each failure is
//! classified and recorded before the retry/abort decision, fatal errors
//! short-circuit, and backend assertion faults get a steeper backoff plus
//! an opportunistic connection recovery between attempts.

pub mod executor;
pub mod policy;

pub use executor::RetryExecutor;
pub use policy::RetryPolicy;
