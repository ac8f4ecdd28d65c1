//! Metrics collection and reporting

use claimscan_core::{EngineEvent, EngineObserver};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Metric names published through the `metrics` facade
pub mod names {
    pub const RUNS: &str = "claimscan_runs_total";
    pub const RULES_EVALUATED: &str = "claimscan_rules_evaluated_total";
    pub const RULE_OUTCOMES: &str = "claimscan_rule_outcomes_total";
    pub const RULE_FAILURES: &str = "claimscan_rule_failures_total";
    pub const RULE_WARNINGS: &str = "claimscan_rule_warnings_total";
    pub const RULES_SKIPPED: &str = "claimscan_rules_skipped_total";
    pub const CLAIMS_FLAGGED: &str = "claimscan_claims_flagged_total";
    pub const RULE_LATENCY: &str = "claimscan_rule_latency_us";
}

/// Register descriptions for every published metric
///
/// Call once after a recorder has been installed.
pub fn describe_metrics() {
    metrics::describe_counter!(names::RUNS, "Total number of rule engine runs");
    metrics::describe_counter!(
        names::RULES_EVALUATED,
        "Total number of rules evaluated against a claim pool"
    );
    metrics::describe_counter!(
        names::RULE_OUTCOMES,
        "Rule evaluations by outcome (matched, no_match, failed)"
    );
    metrics::describe_counter!(names::RULE_FAILURES, "Rule failures by kind");
    metrics::describe_counter!(names::RULE_WARNINGS, "Non-fatal rule warnings");
    metrics::describe_counter!(
        names::RULES_SKIPPED,
        "Rules not evaluated because the claim pool was empty"
    );
    metrics::describe_counter!(names::CLAIMS_FLAGGED, "Claims attributed to a rule");
    metrics::describe_histogram!(
        names::RULE_LATENCY,
        metrics::Unit::Microseconds,
        "Rule evaluation latency in microseconds"
    );
}

/// Metrics collector for rule engine runs
///
/// Keeps its own atomic totals for in-process reporting and mirrors every
/// update to the global `metrics` recorder, if one is installed.
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<MetricsInner>,
}

#[derive(Default)]
struct MetricsInner {
    runs: AtomicU64,
    rules_evaluated: AtomicU64,
    rules_matched: AtomicU64,
    rules_no_match: AtomicU64,
    rules_failed: AtomicU64,
    rules_skipped: AtomicU64,
    warnings: AtomicU64,
    claims_flagged: AtomicU64,
    claims_removed: AtomicU64,
    total_latency_us: AtomicU64,
}

impl MetricsCollector {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner::default()),
        }
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = &self.inner;
        MetricsSnapshot {
            runs: inner.runs.load(Ordering::Relaxed),
            rules_evaluated: inner.rules_evaluated.load(Ordering::Relaxed),
            rules_matched: inner.rules_matched.load(Ordering::Relaxed),
            rules_no_match: inner.rules_no_match.load(Ordering::Relaxed),
            rules_failed: inner.rules_failed.load(Ordering::Relaxed),
            rules_skipped: inner.rules_skipped.load(Ordering::Relaxed),
            warnings: inner.warnings.load(Ordering::Relaxed),
            claims_flagged: inner.claims_flagged.load(Ordering::Relaxed),
            claims_removed: inner.claims_removed.load(Ordering::Relaxed),
            total_latency_us: inner.total_latency_us.load(Ordering::Relaxed),
        }
    }

    fn record_latency(&self, elapsed_us: u64) {
        self.inner
            .total_latency_us
            .fetch_add(elapsed_us, Ordering::Relaxed);
        metrics::histogram!(names::RULE_LATENCY).record(elapsed_us as f64);
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineObserver for MetricsCollector {
    fn on_event(&self, event: &EngineEvent) {
        let inner = &self.inner;
        match event {
            EngineEvent::RunStarted { .. } => {
                inner.runs.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(names::RUNS).increment(1);
            }
            EngineEvent::RuleStarted { .. } => {
                inner.rules_evaluated.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(names::RULES_EVALUATED).increment(1);
            }
            EngineEvent::RuleMatched {
                matched,
                removed,
                elapsed_us,
                ..
            } => {
                inner.rules_matched.fetch_add(1, Ordering::Relaxed);
                inner
                    .claims_flagged
                    .fetch_add(*matched as u64, Ordering::Relaxed);
                inner
                    .claims_removed
                    .fetch_add(*removed as u64, Ordering::Relaxed);
                metrics::counter!(names::RULE_OUTCOMES, "outcome" => "matched").increment(1);
                metrics::counter!(names::CLAIMS_FLAGGED).increment(*matched as u64);
                self.record_latency(*elapsed_us);
            }
            EngineEvent::RuleNoMatch { elapsed_us, .. } => {
                inner.rules_no_match.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(names::RULE_OUTCOMES, "outcome" => "no_match").increment(1);
                self.record_latency(*elapsed_us);
            }
            EngineEvent::RuleFailed { failure, .. } => {
                inner.rules_failed.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(names::RULE_OUTCOMES, "outcome" => "failed").increment(1);
                metrics::counter!(names::RULE_FAILURES, "kind" => failure.kind()).increment(1);
            }
            EngineEvent::RuleWarning { .. } => {
                inner.warnings.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(names::RULE_WARNINGS).increment(1);
            }
            EngineEvent::PoolExhausted { skipped_rules } => {
                inner
                    .rules_skipped
                    .fetch_add(*skipped_rules as u64, Ordering::Relaxed);
                metrics::counter!(names::RULES_SKIPPED).increment(*skipped_rules as u64);
            }
            EngineEvent::RunFinished { .. } => {}
        }
    }
}

/// Snapshot of current metrics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub runs: u64,
    pub rules_evaluated: u64,
    pub rules_matched: u64,
    pub rules_no_match: u64,
    pub rules_failed: u64,
    pub rules_skipped: u64,
    pub warnings: u64,
    pub claims_flagged: u64,
    pub claims_removed: u64,
    pub total_latency_us: u64,
}

impl MetricsSnapshot {
    /// Average latency of rules that evaluated cleanly
    pub fn avg_latency_us(&self) -> u64 {
        let evaluated = self.rules_matched + self.rules_no_match;
        if evaluated == 0 {
            0
        } else {
            self.total_latency_us / evaluated
        }
    }

    /// Share of evaluated rules that matched at least one claim
    pub fn match_rate(&self) -> f64 {
        if self.rules_evaluated == 0 {
            0.0
        } else {
            self.rules_matched as f64 / self.rules_evaluated as f64
        }
    }
}
