//! Structured engine events and the observer seam
//!
//! The rule engine never logs or counts anything through global state of
//! its own. Every outcome is reported as an [`EngineEvent`] to an injected
//! [`EngineObserver`]; logging, metrics and audit trails are observers.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::error::RuleFailure;
use crate::types::RuleId;

/// Something that happened while applying rules
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    /// Rule application is starting
    RunStarted { rules: usize, claims: usize },

    /// A rule is about to be evaluated against the current pool
    RuleStarted {
        rule_id: RuleId,
        description: String,
        remaining: usize,
    },

    /// A rule matched claims, which were removed from the pool
    RuleMatched {
        rule_id: RuleId,
        matched: usize,
        removed: usize,
        remaining: usize,
        elapsed_us: u64,
    },

    /// A rule evaluated cleanly but matched nothing
    RuleNoMatch { rule_id: RuleId, elapsed_us: u64 },

    /// A rule failed and contributes no matches
    RuleFailed {
        rule_id: RuleId,
        condition: String,
        failure: RuleFailure,
    },

    /// Non-fatal oddity noticed while evaluating a rule
    RuleWarning { rule_id: RuleId, message: String },

    /// The pool is empty; the remaining rules are not evaluated
    PoolExhausted { skipped_rules: usize },

    /// Rule application finished
    RunFinished {
        violations: usize,
        rules_matched: usize,
        elapsed_us: u64,
    },
}

impl EngineEvent {
    /// Stable event name, used for audit records and metrics labels
    pub fn name(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "run_started",
            Self::RuleStarted { .. } => "rule_started",
            Self::RuleMatched { .. } => "rule_matched",
            Self::RuleNoMatch { .. } => "rule_no_match",
            Self::RuleFailed { .. } => "rule_failed",
            Self::RuleWarning { .. } => "rule_warning",
            Self::PoolExhausted { .. } => "pool_exhausted",
            Self::RunFinished { .. } => "run_finished",
        }
    }

    /// The rule this event concerns, if any
    pub fn rule_id(&self) -> Option<&RuleId> {
        match self {
            Self::RuleStarted { rule_id, .. }
            | Self::RuleMatched { rule_id, .. }
            | Self::RuleNoMatch { rule_id, .. }
            | Self::RuleFailed { rule_id, .. }
            | Self::RuleWarning { rule_id, .. } => Some(rule_id),
            _ => None,
        }
    }
}

/// Receives engine events
pub trait EngineObserver: Send + Sync {
    fn on_event(&self, event: &EngineEvent);
}

/// Observer that drops every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl EngineObserver for NoopObserver {
    fn on_event(&self, _event: &EngineEvent) {}
}

/// Observer that writes events to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl EngineObserver for TracingObserver {
    fn on_event(&self, event: &EngineEvent) {
        match event {
            EngineEvent::RunStarted { rules, claims } => {
                info!(rules = %rules, claims = %claims, "Applying rules to claims");
            }
            EngineEvent::RuleStarted {
                rule_id,
                description,
                remaining,
            } => {
                debug!(
                    rule = %rule_id,
                    description = %description,
                    remaining = %remaining,
                    "Processing rule"
                );
            }
            EngineEvent::RuleMatched {
                rule_id,
                matched,
                removed,
                remaining,
                elapsed_us,
            } => {
                info!(
                    rule = %rule_id,
                    matched = %matched,
                    removed = %removed,
                    remaining = %remaining,
                    elapsed_us = %elapsed_us,
                    "Rule found matches"
                );
            }
            EngineEvent::RuleNoMatch { rule_id, elapsed_us } => {
                debug!(rule = %rule_id, elapsed_us = %elapsed_us, "Rule found no matches");
            }
            EngineEvent::RuleFailed {
                rule_id,
                condition,
                failure,
            } => match failure {
                RuleFailure::UnrecognizedStructure => {
                    warn!(
                        rule = %rule_id,
                        condition = %condition,
                        "Unrecognized DataSet rule structure, skipping"
                    );
                }
                _ => {
                    error!(
                        rule = %rule_id,
                        condition = %condition,
                        kind = failure.kind(),
                        "Rule failed: {}",
                        failure
                    );
                }
            },
            EngineEvent::RuleWarning { rule_id, message } => {
                warn!(rule = %rule_id, "{}", message);
            }
            EngineEvent::PoolExhausted { skipped_rules } => {
                info!(
                    skipped_rules = %skipped_rules,
                    "No claims left to process, stopping rule application"
                );
            }
            EngineEvent::RunFinished {
                violations,
                rules_matched,
                elapsed_us,
            } => {
                info!(
                    violations = %violations,
                    rules_matched = %rules_matched,
                    elapsed_us = %elapsed_us,
                    "Rule application complete"
                );
            }
        }
    }
}

/// Fans events out to several observers in registration order
#[derive(Clone, Default)]
pub struct ObserverSet {
    observers: Vec<Arc<dyn EngineObserver>>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an observer
    pub fn with(mut self, observer: Arc<dyn EngineObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn push(&mut self, observer: Arc<dyn EngineObserver>) {
        self.observers.push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl EngineObserver for ObserverSet {
    fn on_event(&self, event: &EngineEvent) {
        for observer in &self.observers {
            observer.on_event(event);
        }
    }
}
