//! Condition parsing
//!
//! A rule condition is a restricted comparison language:
//!
//! ```text
//! paid_amount > 1000 AND (place_of_service = "11" OR modifier != "25")
//! member_id = member_id AND claim_service_from - claim_service_from < 3
//! ```
//!
//! Parsing first normalizes bare `=` into `==` (quoted literals are never
//! touched), then decomposes the normalized string into the three atomic
//! patterns DataSet rules are built from:
//!
//! - self comparisons, `field = field`, which declare duplicate-key grouping
//! - value comparisons, `field op literal`, used as a prefilter
//! - field differences, `field1 - field2 op threshold`, checked across row pairs
//!
//! Record rules additionally compile into a full [`Expr`] predicate tree.

use claimscan_core::{Error, Result, RuleFailure, Value};
use regex::Regex;
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;
use std::ops::Range;

use crate::expr::Expr;
use crate::rule::RuleLevel;

/// Why a condition string does not compile
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConditionError {
    #[error("condition is empty")]
    Empty,

    #[error("unterminated quoted literal starting at offset {0}")]
    UnterminatedQuote(usize),

    #[error("unexpected character `{ch}` at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },

    #[error("unexpected {found} at offset {offset}, expected {expected}")]
    UnexpectedToken {
        found: String,
        expected: &'static str,
        offset: usize,
    },

    #[error("unexpected end of condition, expected {0}")]
    UnexpectedEnd(&'static str),

    #[error("chained comparison at offset {0}")]
    ChainedComparison(usize),

    #[error("arithmetic at offset {0} is only supported as `field - field` in DataSet rules")]
    Arithmetic(usize),

    #[error("{0} is not a boolean condition")]
    NotBoolean(String),
}

impl From<ConditionError> for RuleFailure {
    fn from(err: ConditionError) -> Self {
        RuleFailure::Parse(err.to_string())
    }
}

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CompareOp {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
}

impl CompareOp {
    /// Parse an operator symbol; a bare `=` means equality
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "=" | "==" => Some(Self::Eq),
            "!=" | "<>" => Some(Self::Ne),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Le),
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Ge),
            _ => None,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }

    /// Apply to the ordering of two values; incomparable values never match
    pub fn test(self, ordering: Option<Ordering>) -> bool {
        let Some(ordering) = ordering else {
            return false;
        };
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::Ne => ordering != Ordering::Equal,
            Self::Lt => ordering == Ordering::Less,
            Self::Le => ordering != Ordering::Greater,
            Self::Gt => ordering == Ordering::Greater,
            Self::Ge => ordering != Ordering::Less,
        }
    }

    /// Apply to two floats with IEEE semantics
    ///
    /// An infinite left side fails `<`, `<=` and `==` against any finite
    /// threshold and satisfies `>`, `>=` and `!=`.
    pub fn holds(self, lhs: f64, rhs: f64) -> bool {
        match self {
            Self::Eq => lhs == rhs,
            Self::Ne => lhs != rhs,
            Self::Lt => lhs < rhs,
            Self::Le => lhs <= rhs,
            Self::Gt => lhs > rhs,
            Self::Ge => lhs >= rhs,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// `field op literal`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueComparison {
    pub field: String,
    pub op: CompareOp,
    pub value: Value,
}

impl ValueComparison {
    /// Test a single cell against the literal
    ///
    /// A null cell, or one that cannot be ordered against the literal,
    /// satisfies `!=` and fails every other operator.
    pub fn matches(&self, cell: &Value) -> bool {
        match cell.compare(&self.value) {
            Some(ordering) => self.op.test(Some(ordering)),
            None => self.op == CompareOp::Ne,
        }
    }
}

/// `field1 - field2 op threshold`, evaluated across a pair of rows
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDifference {
    pub left: String,
    pub right: String,
    pub op: CompareOp,
    pub threshold: f64,
}

/// Structured form of a rule condition
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCondition {
    /// The condition after `=` normalization
    pub normalized: String,

    /// Fields declared as duplicate keys
    pub self_comparisons: Vec<String>,

    /// Prefilter comparisons
    pub value_comparisons: Vec<ValueComparison>,

    /// Cross-row distance constraints
    pub field_differences: Vec<FieldDifference>,

    /// Full predicate tree; present for Record rules only
    pub predicate: Option<Expr>,
}

/// Rewrite bare `=` to `==`
///
/// Multi-character operators (`==`, `!=`, `<=`, `>=`) and anything inside a
/// quoted literal or a backtick-quoted field name are left as they are.
/// Applying this to an already normalized condition returns it unchanged.
pub fn normalize(condition: &str) -> String {
    let chars: Vec<char> = condition.chars().collect();
    let mut out = String::with_capacity(condition.len() + 8);
    let mut quote: Option<char> = None;

    for (i, &c) in chars.iter().enumerate() {
        if let Some(q) = quote {
            out.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }

        match c {
            '"' | '\'' | '`' => {
                quote = Some(c);
                out.push(c);
            }
            '=' => {
                let prev = if i > 0 { Some(chars[i - 1]) } else { None };
                let next = chars.get(i + 1).copied();
                if matches!(prev, Some('<' | '>' | '=' | '!')) || next == Some('=') {
                    out.push('=');
                } else {
                    out.push_str("==");
                }
            }
            _ => out.push(c),
        }
    }

    out
}

/// Byte ranges of quoted literals and backtick fields, quotes included
///
/// Returns the offset of the opening quote when a literal is unterminated.
fn quoted_spans(text: &str) -> std::result::Result<Vec<Range<usize>>, usize> {
    let mut spans = Vec::new();
    let mut open: Option<(char, usize)> = None;

    for (offset, c) in text.char_indices() {
        match open {
            Some((q, start)) if c == q => {
                spans.push(start..offset + c.len_utf8());
                open = None;
            }
            Some(_) => {}
            None if matches!(c, '"' | '\'' | '`') => open = Some((c, offset)),
            None => {}
        }
    }

    match open {
        Some((_, start)) => Err(start),
        None => Ok(spans),
    }
}

fn inside(spans: &[Range<usize>], offset: usize) -> bool {
    spans.iter().any(|span| span.contains(&offset))
}

/// True when the last non-blank character before `offset` is a minus sign
fn preceded_by_minus(text: &str, offset: usize) -> bool {
    text[..offset].trim_end().ends_with('-')
}

fn parse_literal(raw: &str) -> Value {
    let quoted = raw.len() >= 2
        && ((raw.starts_with('"') && raw.ends_with('"'))
            || (raw.starts_with('\'') && raw.ends_with('\'')));
    if quoted {
        return Value::Text(raw[1..raw.len() - 1].to_string());
    }
    raw.parse::<f64>()
        .map(Value::Number)
        .unwrap_or_else(|_| Value::Text(raw.to_string()))
}

/// Condition parser holding its compiled extraction patterns
pub struct ConditionParser {
    self_comparison: Regex,
    value_comparison: Regex,
    field_difference: Regex,
}

impl ConditionParser {
    /// Create a new condition parser
    pub fn new() -> Result<Self> {
        Ok(Self {
            self_comparison: Regex::new(r"\b([A-Za-z_]\w*)\s*==\s*([A-Za-z_]\w*)\b").map_err(
                |e| Error::internal(format!("Failed to compile self-comparison regex: {}", e)),
            )?,
            value_comparison: Regex::new(
                r#"\b([A-Za-z_]\w*)\s*(==|!=|<=|>=|<|>)\s*(-?\d+(?:\.\d+)?\b|"[^"]*"|'[^']*')"#,
            )
            .map_err(|e| {
                Error::internal(format!("Failed to compile value-comparison regex: {}", e))
            })?,
            field_difference: Regex::new(
                r"\b([A-Za-z_]\w*)\s*-\s*([A-Za-z_]\w*)\s*(==|!=|<=|>=|<|>)\s*(\d+(?:\.\d+)?)",
            )
            .map_err(|e| {
                Error::internal(format!("Failed to compile field-difference regex: {}", e))
            })?,
        })
    }

    /// Parse a condition for a rule of the given level
    pub fn parse(
        &self,
        level: &RuleLevel,
        condition: &str,
    ) -> std::result::Result<ParsedCondition, ConditionError> {
        if condition.trim().is_empty() {
            return Err(ConditionError::Empty);
        }

        let normalized = normalize(condition);
        quoted_spans(&normalized).map_err(ConditionError::UnterminatedQuote)?;

        let predicate = match level {
            RuleLevel::Record => Some(Expr::parse(&normalized)?),
            _ => None,
        };

        Ok(ParsedCondition {
            self_comparisons: self.extract_self_comparisons(&normalized),
            value_comparisons: self.extract_value_comparisons(&normalized),
            field_differences: self.extract_field_differences(&normalized),
            normalized,
            predicate,
        })
    }

    /// Fields compared with themselves (`member_id = member_id`), deduplicated
    pub fn extract_self_comparisons(&self, condition: &str) -> Vec<String> {
        let normalized = normalize(condition);
        let spans = quoted_spans(&normalized).unwrap_or_default();
        let mut fields: Vec<String> = Vec::new();

        for caps in self.self_comparison.captures_iter(&normalized) {
            let (Some(left), Some(right)) = (caps.get(1), caps.get(2)) else {
                continue;
            };
            if inside(&spans, left.start()) || left.as_str() != right.as_str() {
                continue;
            }
            if !fields.iter().any(|f| f == left.as_str()) {
                fields.push(left.as_str().to_string());
            }
        }

        fields
    }

    /// `field op literal` comparisons
    ///
    /// The right-hand field of a `field - field op n` difference is not a
    /// value comparison and is skipped.
    pub fn extract_value_comparisons(&self, condition: &str) -> Vec<ValueComparison> {
        let normalized = normalize(condition);
        let spans = quoted_spans(&normalized).unwrap_or_default();
        let mut comparisons = Vec::new();

        for caps in self.value_comparison.captures_iter(&normalized) {
            let (Some(field), Some(op), Some(literal)) = (caps.get(1), caps.get(2), caps.get(3))
            else {
                continue;
            };
            if inside(&spans, field.start()) || preceded_by_minus(&normalized, field.start()) {
                continue;
            }
            let Some(op) = CompareOp::from_symbol(op.as_str()) else {
                continue;
            };
            comparisons.push(ValueComparison {
                field: field.as_str().to_string(),
                op,
                value: parse_literal(literal.as_str()),
            });
        }

        comparisons
    }

    /// `field1 - field2 op threshold` constraints
    pub fn extract_field_differences(&self, condition: &str) -> Vec<FieldDifference> {
        let normalized = normalize(condition);
        let spans = quoted_spans(&normalized).unwrap_or_default();
        let mut differences = Vec::new();

        for caps in self.field_difference.captures_iter(&normalized) {
            let (Some(left), Some(right), Some(op), Some(threshold)) =
                (caps.get(1), caps.get(2), caps.get(3), caps.get(4))
            else {
                continue;
            };
            if inside(&spans, left.start()) {
                continue;
            }
            let (Some(op), Ok(threshold)) = (
                CompareOp::from_symbol(op.as_str()),
                threshold.as_str().parse::<f64>(),
            ) else {
                continue;
            };
            differences.push(FieldDifference {
                left: left.as_str().to_string(),
                right: right.as_str().to_string(),
                op,
                threshold,
            });
        }

        differences
    }
}

impl Default for ConditionParser {
    fn default() -> Self {
        Self::new().expect("Failed to create condition parser")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_bare_equals() {
        assert_eq!(normalize("status = \"A\""), "status == \"A\"");
        assert_eq!(normalize("a=1 and b>=2 and c<=3 and d!=4"), "a==1 and b>=2 and c<=3 and d!=4");
        assert_eq!(normalize("a == 1"), "a == 1");
    }

    #[test]
    fn test_normalize_protects_quotes() {
        assert_eq!(normalize(r#"status = "A=B""#), r#"status == "A=B""#);
        assert_eq!(normalize("note = 'x = y'"), "note == 'x = y'");
    }

    #[test]
    fn test_normalize_protects_backtick_fields() {
        assert_eq!(normalize("`a=b` = 1"), "`a=b` == 1");
        assert_eq!(normalize("`x = y`=`x = y`"), "`x = y`==`x = y`");
    }

    #[test]
    fn test_backtick_fields_are_not_extracted() {
        let parser = ConditionParser::new().unwrap();
        assert!(parser.extract_self_comparisons("`a = a` > 1").is_empty());
        assert!(parser.extract_value_comparisons("`b=1` = 1").is_empty());
        assert_eq!(
            parser.parse(&RuleLevel::Record, "`a=b = 1"),
            Err(ConditionError::UnterminatedQuote(0))
        );
    }

    #[test]
    fn test_normalize_idempotent() {
        let once = normalize(r#"member_id = member_id AND code = "9=9" OR amt >= 5"#);
        assert_eq!(normalize(&once), once);
    }

    #[test]
    fn test_extract_self_comparisons() {
        let parser = ConditionParser::new().unwrap();
        let fields = parser.extract_self_comparisons(
            "member_id = member_id AND procedure_cd == procedure_cd AND member_id = member_id",
        );
        assert_eq!(fields, vec!["member_id", "procedure_cd"]);

        assert!(parser.extract_self_comparisons("a = b").is_empty());
        assert!(parser.extract_self_comparisons(r#"note = "x = x""#).is_empty());
        assert!(parser.extract_self_comparisons("member_id = member_id_2").is_empty());
    }

    #[test]
    fn test_extract_value_comparisons() {
        let parser = ConditionParser::new().unwrap();
        let comparisons = parser.extract_value_comparisons(
            r#"member_id = member_id AND paid_amount > 100.5 AND status = "DENIED""#,
        );
        assert_eq!(
            comparisons,
            vec![
                ValueComparison {
                    field: "paid_amount".into(),
                    op: CompareOp::Gt,
                    value: Value::Number(100.5),
                },
                ValueComparison {
                    field: "status".into(),
                    op: CompareOp::Eq,
                    value: Value::Text("DENIED".into()),
                },
            ]
        );
    }

    #[test]
    fn test_difference_operand_is_not_a_prefilter() {
        let parser = ConditionParser::new().unwrap();
        let condition = "member_id = member_id AND claim_service_from - claim_service_from < 3";
        assert!(parser.extract_value_comparisons(condition).is_empty());

        let differences = parser.extract_field_differences(condition);
        assert_eq!(
            differences,
            vec![FieldDifference {
                left: "claim_service_from".into(),
                right: "claim_service_from".into(),
                op: CompareOp::Lt,
                threshold: 3.0,
            }]
        );
    }

    #[test]
    fn test_parse_record_builds_predicate() {
        let parser = ConditionParser::new().unwrap();
        let parsed = parser.parse(&RuleLevel::Record, "paid_amount > 1000").unwrap();
        assert!(parsed.predicate.is_some());
        assert_eq!(parsed.normalized, "paid_amount > 1000");

        let parsed = parser
            .parse(&RuleLevel::DataSet, "member_id = member_id")
            .unwrap();
        assert!(parsed.predicate.is_none());
        assert_eq!(parsed.normalized, "member_id == member_id");
    }

    #[test]
    fn test_parse_failures() {
        let parser = ConditionParser::new().unwrap();
        assert_eq!(parser.parse(&RuleLevel::Record, "  "), Err(ConditionError::Empty));
        assert_eq!(
            parser.parse(&RuleLevel::DataSet, r#"code = "abc"#),
            Err(ConditionError::UnterminatedQuote(8))
        );
        assert!(parser.parse(&RuleLevel::Record, "paid_amount >").is_err());

        let failure: RuleFailure = ConditionError::Empty.into();
        assert_eq!(failure, RuleFailure::Parse("condition is empty".into()));
    }

    #[test]
    fn test_value_comparison_against_null() {
        let comparison = |op| ValueComparison {
            field: "status".into(),
            op,
            value: Value::from("X"),
        };
        assert!(comparison(CompareOp::Ne).matches(&Value::Null));
        assert!(comparison(CompareOp::Ne).matches(&Value::from(3)));
        assert!(!comparison(CompareOp::Ne).matches(&Value::from("X")));
        assert!(!comparison(CompareOp::Eq).matches(&Value::Null));
        assert!(!comparison(CompareOp::Lt).matches(&Value::Null));
    }

    #[test]
    fn test_operator_semantics() {
        assert!(CompareOp::Le.test(Some(Ordering::Equal)));
        assert!(!CompareOp::Ne.test(None));
        assert!(!CompareOp::Lt.holds(f64::INFINITY, 5.0));
        assert!(!CompareOp::Eq.holds(f64::INFINITY, 5.0));
        assert!(CompareOp::Ge.holds(f64::INFINITY, 5.0));
        assert!(CompareOp::Ne.holds(f64::INFINITY, 5.0));
        assert_eq!(CompareOp::from_symbol("="), Some(CompareOp::Eq));
    }
}
