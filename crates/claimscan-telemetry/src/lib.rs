//! ClaimScan Telemetry
//!
//! Engine observers for monitoring and compliance.
//!
//! Provides:
//! - Rule engine metrics, kept in-process and mirrored to the `metrics` facade
//! - A hash-chained audit trail of per-rule outcomes

pub mod audit;
pub mod metrics;

pub use crate::audit::{AuditEvent, AuditObserver, AuditSeverity, AuditTrail};
pub use crate::metrics::{describe_metrics, MetricsCollector, MetricsSnapshot};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::audit::{AuditObserver, AuditTrail};
    pub use crate::metrics::MetricsCollector;
}
