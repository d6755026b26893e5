//! Metrics collection and export for herald.
//!
//! Every crate records through the `metrics` facade using the names in
//! [`definitions`]. Nothing is exported unless a recorder is installed with
//! [`init_metrics`]; with the `prometheus` feature the handle renders the
//! Prometheus text format.
//!
//! ```rust,ignore
//! use herald_metrics::{counter, bots, labels};
//!
//! counter!(bots::DELIVERIES_TOTAL, labels::EVENT => "PING", labels::OUTCOME => "delivered")
//!     .increment(1);
//! ```

mod definitions;
mod recorder;

pub use {
    definitions::*,
    recorder::{MetricsHandle, MetricsRecorderConfig, init_metrics},
};

// Re-export metrics macros for convenience
pub use metrics::{counter, gauge, histogram};
