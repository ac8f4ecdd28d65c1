//! Hash-chained audit trail of rule outcomes

use chrono::{DateTime, Utc};
use claimscan_core::{EngineEvent, EngineObserver, RuleFailure};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

/// Audit trail with hash-chained events for tamper detection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditTrail {
    events: Vec<AuditEvent>,
    chain_hash: Option<String>,
}

impl AuditTrail {
    /// Create a new audit trail
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event, linking it to the current head of the chain
    pub fn add_event(&mut self, mut event: AuditEvent) {
        event.previous_hash = self.chain_hash.clone();

        let hash = compute_hash(&event);
        event.hash = Some(hash.clone());

        self.chain_hash = Some(hash);
        self.events.push(event);
    }

    /// Verify the integrity of the audit trail
    pub fn verify(&self) -> bool {
        let mut prev_hash: Option<&String> = None;

        for event in &self.events {
            if event.previous_hash.as_ref() != prev_hash {
                warn!(event = %event.id, "Audit chain link broken");
                return false;
            }
            if event.hash.as_deref() != Some(compute_hash(event).as_str()) {
                warn!(event = %event.id, "Audit event hash mismatch");
                return false;
            }
            prev_hash = event.hash.as_ref();
        }

        prev_hash == self.chain_hash.as_ref()
    }

    pub fn events(&self) -> &[AuditEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Hash of the most recent event
    pub fn head(&self) -> Option<&str> {
        self.chain_hash.as_deref()
    }

    /// Pretty-printed JSON of the whole trail
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Hash over every field except the hash itself
fn compute_hash(event: &AuditEvent) -> String {
    let mut hasher = Sha256::new();

    hasher.update(event.id.as_bytes());
    hasher.update(event.event_type.as_bytes());
    if let Some(ref rule_id) = event.rule_id {
        hasher.update(rule_id.as_bytes());
    }
    if let Some(ref data) = event.data {
        hasher.update(data.as_bytes());
    }
    hasher.update(event.timestamp.to_rfc3339().as_bytes());
    hasher.update(event.severity.as_str().as_bytes());
    if let Some(ref prev) = event.previous_hash {
        hasher.update(prev.as_bytes());
    }

    format!("{:x}", hasher.finalize())
}

/// A single audit event in the trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event id
    pub id: String,

    /// Event type, e.g. `rule_matched`
    pub event_type: String,

    /// Rule the event concerns
    pub rule_id: Option<String>,

    /// Event payload (JSON serialized)
    pub data: Option<String>,

    pub timestamp: DateTime<Utc>,

    /// Hash of this event
    pub hash: Option<String>,

    /// Hash of previous event (for chaining)
    pub previous_hash: Option<String>,

    pub severity: AuditSeverity,
}

impl AuditEvent {
    /// Create a new audit event
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            id: format!("aud_{}", uuid::Uuid::new_v4()),
            event_type: event_type.into(),
            rule_id: None,
            data: None,
            timestamp: Utc::now(),
            hash: None,
            previous_hash: None,
            severity: AuditSeverity::Info,
        }
    }

    pub fn with_rule_id(mut self, rule_id: impl Into<String>) -> Self {
        self.rule_id = Some(rule_id.into());
        self
    }

    /// Set event data
    pub fn with_data(mut self, data: impl Serialize) -> Self {
        self.data = serde_json::to_string(&data).ok();
        self
    }

    pub fn with_severity(mut self, severity: AuditSeverity) -> Self {
        self.severity = severity;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditSeverity {
    Info,
    Warning,
    Error,
}

impl AuditSeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// Records rule outcomes into an [`AuditTrail`]
///
/// `RuleStarted` events are not recorded; every other engine event becomes
/// one audit entry carrying the event as its JSON payload.
#[derive(Debug, Default)]
pub struct AuditObserver {
    trail: Mutex<AuditTrail>,
}

impl AuditObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the trail recorded so far
    pub fn trail(&self) -> AuditTrail {
        self.trail.lock().clone()
    }

    pub fn into_trail(self) -> AuditTrail {
        self.trail.into_inner()
    }
}

impl EngineObserver for AuditObserver {
    fn on_event(&self, event: &EngineEvent) {
        let severity = match event {
            EngineEvent::RuleStarted { .. } => return,
            EngineEvent::RuleFailed {
                failure: RuleFailure::UnrecognizedStructure,
                ..
            }
            | EngineEvent::RuleWarning { .. } => AuditSeverity::Warning,
            EngineEvent::RuleFailed { .. } => AuditSeverity::Error,
            _ => AuditSeverity::Info,
        };

        let mut entry = AuditEvent::new(event.name())
            .with_data(event)
            .with_severity(severity);
        if let Some(rule_id) = event.rule_id() {
            entry = entry.with_rule_id(rule_id.to_string());
        }

        self.trail.lock().add_event(entry);
    }
}
