//! Multiplexer statistics

pub mod metrics;

pub use metrics::{DeliveryCounters, MuxStats};
