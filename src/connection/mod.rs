// src/connection/mod.rs
//! Connection liveness: debounced state tracking and failure accounting

pub mod debounce;
pub mod failures;
pub mod tracker;

pub use debounce::DebounceGuard;
pub use failures::{FailureGovernor, FailureOutcome};
pub use tracker::ConnectionStateTracker;
