//! Telemetry module for logging and metrics.
//!
//! Provides:
//! - Logging configuration and initialization
//! - Counters for dispatched commands

mod logging;
mod metrics;

pub use logging::{init_logging, LogConfig};
pub use metrics::{CommandMetrics, Counter};
