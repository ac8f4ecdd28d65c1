//! Core types for ClaimScan

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Date formats accepted for claim cells and condition literals
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d-%b-%Y"];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S",
];

/// Parse a date, dropping any time-of-day component
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(date);
        }
    }

    for format in DATETIME_FORMATS {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(text, format) {
            return Some(datetime.date());
        }
    }

    DateTime::parse_from_rfc3339(text).ok().map(|dt| dt.date_naive())
}

/// A single cell in a claims table
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Date(NaiveDate),
    Text(String),
}

impl Value {
    /// Infer a typed value from a raw text cell
    pub fn infer(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Value::Null;
        }

        match trimmed {
            "true" | "True" | "TRUE" => return Value::Bool(true),
            "false" | "False" | "FALSE" => return Value::Bool(false),
            _ => {}
        }

        match trimmed.parse::<f64>() {
            Ok(n) if n.is_finite() => Value::Number(n),
            _ => Value::Text(raw.to_string()),
        }
    }

    /// Convert a JSON value into a cell
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => n.as_f64().map(Value::Number).unwrap_or(Value::Null),
            serde_json::Value::String(s) => Value::Text(s.clone()),
            other => Value::Text(other.to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Name of the value's type, for diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::Date(_) => "date",
            Value::Text(_) => "text",
        }
    }

    /// Numeric view of the value; numeric text is accepted
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Text(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Date view of the value; parseable text is accepted
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            Value::Text(s) => parse_date(s),
            _ => None,
        }
    }

    /// Compare two values of compatible types
    ///
    /// Returns `None` for nulls and type mismatches. Text compared against a
    /// date is parsed as a date first.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Text(b)) => parse_date(b).map(|b| a.cmp(&b)),
            (Value::Text(a), Value::Date(b)) => parse_date(a).map(|a| a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Hashable identity of this value
    pub fn key_part(&self) -> KeyPart {
        match self {
            Value::Null => KeyPart::Null,
            Value::Bool(b) => KeyPart::Bool(*b),
            Value::Number(n) => KeyPart::Number(canonical_bits(*n)),
            Value::Date(d) => KeyPart::Date(*d),
            Value::Text(s) => KeyPart::Text(s.clone()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write_number(f, *n),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) => serializer.serialize_f64(*n),
            Value::Date(d) => serializer.collect_str(&d.format("%Y-%m-%d")),
            Value::Text(s) => serializer.serialize_str(s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}

/// Hashable, totally-equal projection of a [`Value`]
///
/// Numbers are keyed by their bit pattern after folding `-0.0` into `0.0`
/// and every NaN into one canonical NaN.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyPart {
    Null,
    Bool(bool),
    Number(u64),
    Date(NaiveDate),
    Text(String),
}

fn canonical_bits(n: f64) -> u64 {
    if n == 0.0 {
        0.0f64.to_bits()
    } else if n.is_nan() {
        f64::NAN.to_bits()
    } else {
        n.to_bits()
    }
}

fn write_number(f: &mut fmt::Formatter<'_>, n: f64) -> fmt::Result {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        write!(f, "{:.0}", n)
    } else {
        write!(f, "{}", n)
    }
}

/// Orderable rule identifier
///
/// Numeric ids order before text ids; numbers compare by value and text
/// lexicographically.
#[derive(Debug, Clone, Deserialize)]
#[serde(from = "RawRuleId")]
pub enum RuleId {
    Number(f64),
    Text(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawRuleId {
    Number(f64),
    Text(String),
}

impl From<RawRuleId> for RuleId {
    fn from(raw: RawRuleId) -> Self {
        match raw {
            RawRuleId::Number(n) => RuleId::Number(n),
            RawRuleId::Text(s) => RuleId::from(s.as_str()),
        }
    }
}

impl From<&str> for RuleId {
    fn from(s: &str) -> Self {
        let trimmed = s.trim();
        match trimmed.parse::<f64>() {
            Ok(n) if n.is_finite() => RuleId::Number(n),
            _ => RuleId::Text(trimmed.to_string()),
        }
    }
}

impl From<i64> for RuleId {
    fn from(n: i64) -> Self {
        RuleId::Number(n as f64)
    }
}

impl From<i32> for RuleId {
    fn from(n: i32) -> Self {
        RuleId::Number(f64::from(n))
    }
}

impl RuleId {
    /// The id as a claims cell
    pub fn to_value(&self) -> Value {
        match self {
            RuleId::Number(n) => Value::Number(*n),
            RuleId::Text(s) => Value::Text(s.clone()),
        }
    }
}

impl Ord for RuleId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (RuleId::Number(a), RuleId::Number(b)) => a.total_cmp(b),
            (RuleId::Number(_), RuleId::Text(_)) => Ordering::Less,
            (RuleId::Text(_), RuleId::Number(_)) => Ordering::Greater,
            (RuleId::Text(a), RuleId::Text(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for RuleId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for RuleId {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for RuleId {}

impl Hash for RuleId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            RuleId::Number(n) => {
                0u8.hash(state);
                n.to_bits().hash(state);
            }
            RuleId::Text(s) => {
                1u8.hash(state);
                s.hash(state);
            }
        }
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleId::Number(n) => write_number(f, *n),
            RuleId::Text(s) => f.write_str(s),
        }
    }
}

impl Serialize for RuleId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RuleId::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                serializer.serialize_i64(*n as i64)
            }
            RuleId::Number(n) => serializer.serialize_f64(*n),
            RuleId::Text(s) => serializer.serialize_str(s),
        }
    }
}
