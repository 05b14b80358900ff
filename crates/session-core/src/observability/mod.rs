//! Observability helpers for the coordination layer.

pub mod metrics;
