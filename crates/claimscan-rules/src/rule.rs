//! Rule definitions

use claimscan_core::RuleId;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// A rule cell as it may arrive from JSON or YAML
#[derive(Deserialize)]
#[serde(untagged)]
enum RawText {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl RawText {
    fn into_text(self) -> String {
        match self {
            RawText::Text(s) => s,
            RawText::Integer(n) => n.to_string(),
            RawText::Float(n) => n.to_string(),
            RawText::Bool(b) => b.to_string(),
            RawText::Null => String::new(),
        }
    }
}

/// Read any scalar cell as text; null becomes empty
fn lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    RawText::deserialize(deserializer).map(RawText::into_text)
}

/// How a rule's condition is applied to the claims
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub enum RuleLevel {
    /// Evaluated independently per claim row
    Record,
    /// Compares claim rows with each other
    DataSet,
    /// Anything else; such rules are skipped
    Other(String),
}

impl From<String> for RuleLevel {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl<'de> Deserialize<'de> for RuleLevel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        lenient_text(deserializer).map(Self::from)
    }
}

impl From<&str> for RuleLevel {
    fn from(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "record" => Self::Record,
            "dataset" => Self::DataSet,
            _ => Self::Other(s.to_string()),
        }
    }
}

impl From<RuleLevel> for String {
    fn from(level: RuleLevel) -> Self {
        level.to_string()
    }
}

impl fmt::Display for RuleLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Record => f.write_str("Record"),
            Self::DataSet => f.write_str("DataSet"),
            Self::Other(s) => f.write_str(s),
        }
    }
}

/// A single fraud or discrepancy rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Ordering key; rules run in ascending id order
    #[serde(rename = "Rule_ID")]
    pub id: RuleId,

    /// Human-readable description copied onto every violation
    #[serde(rename = "Rule_Desc", default, deserialize_with = "lenient_text")]
    pub description: String,

    /// Record or DataSet
    #[serde(rename = "Level")]
    pub level: RuleLevel,

    /// Condition in the comparison grammar; a null cell reads as empty
    #[serde(rename = "Rule_Allegation", deserialize_with = "lenient_text")]
    pub condition: String,
}

impl Rule {
    pub fn new(
        id: impl Into<RuleId>,
        description: impl Into<String>,
        level: RuleLevel,
        condition: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            level,
            condition: condition.into(),
        }
    }

    /// Shorthand for a Record-level rule
    pub fn record(id: impl Into<RuleId>, description: &str, condition: &str) -> Self {
        Self::new(id, description, RuleLevel::Record, condition)
    }

    /// Shorthand for a DataSet-level rule
    pub fn dataset(id: impl Into<RuleId>, description: &str, condition: &str) -> Self {
        Self::new(id, description, RuleLevel::DataSet, condition)
    }
}

/// A collection of rules loaded from a file or built in code
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// Load rules from a YAML sequence
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Load rules from a JSON array
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn push(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    /// Rules in processing order: ascending id, ties in input order
    pub fn sorted(&self) -> Vec<&Rule> {
        sort_rules(&self.rules)
    }

    /// Count of rules per level, in first-seen order
    pub fn level_counts(&self) -> Vec<(RuleLevel, usize)> {
        let mut counts: Vec<(RuleLevel, usize)> = Vec::new();
        for rule in &self.rules {
            match counts.iter_mut().find(|(level, _)| *level == rule.level) {
                Some((_, n)) => *n += 1,
                None => counts.push((rule.level.clone(), 1)),
            }
        }
        counts
    }
}

impl From<Vec<Rule>> for RuleSet {
    fn from(rules: Vec<Rule>) -> Self {
        Self::new(rules)
    }
}

/// Stable sort by rule id
pub fn sort_rules(rules: &[Rule]) -> Vec<&Rule> {
    let mut ordered: Vec<&Rule> = rules.iter().collect();
    ordered.sort_by(|a, b| a.id.cmp(&b.id));
    ordered
}
