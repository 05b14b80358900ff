//! HTTP request handlers.

pub mod admission;
pub mod health;
pub mod history;
pub mod metrics;

pub use admission::{decide_participant, join_session, leave_session, list_pending};
pub use health::{health_check, readiness_check, DependencyProbe, ReadinessProbe};
pub use history::{list_messages, list_recordings};
pub use metrics::metrics_handler;
