//! Observability for the gateway
//!
//! Counters exported in Prometheus text format on `/metrics`.

pub mod metrics;

pub use metrics::{GaugeSnapshot, Metrics};
