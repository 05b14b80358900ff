//! Observability for the Session Service.

pub mod metrics;
