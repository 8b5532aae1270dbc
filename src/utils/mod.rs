//! Common utilities shared across the telemetry subsystem

pub mod time;

pub use time::{current_timestamp_millis, MockTimeProvider, SystemTimeProvider, TimeProvider};
