//! Metrics collection and export for herald.
//!
//! Built on the `metrics` crate facade. Crates record through the re-exported
//! macros using the metric names defined here; with the `prometheus` feature
//! the binary can install an exporter and render text.
//!
//! ```rust,ignore
//! use herald_metrics::{broadcast, counter};
//!
//! counter!(broadcast::RECIPIENTS_SENT_TOTAL).increment(1);
//! ```

mod definitions;
mod recorder;

pub use {
    definitions::*,
    recorder::{MetricsHandle, MetricsRecorderConfig, init_metrics},
};

pub use metrics::{counter, gauge, histogram};
