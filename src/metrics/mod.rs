//! Prometheus metrics.

mod collector;

pub use collector::Metrics;
