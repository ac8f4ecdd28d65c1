//! Violation report tabulation

use claimscan_core::{KeyPart, RuleId, Value, ViolationTable, RULE_DESC_COLUMN, RULE_ID_COLUMN};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::HashSet;
use tracing::debug;

/// Leading report columns, in order; `rule_id` and `rule_desc` are always present
pub const REPORT_COLUMNS: [&str; 5] = [
    "claim_id",
    RULE_ID_COLUMN,
    RULE_DESC_COLUMN,
    "member_id",
    "provider_npi",
];

/// Columns appended when the claims carry them
pub const OPTIONAL_COLUMNS: [&str; 8] = [
    "procedure_cd",
    "diag_cd",
    "paid_amount",
    "claim_service_from",
    "claim_service_to",
    "member_gender",
    "member_age",
    "member_state",
];

/// One report line
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub rule_id: RuleId,
    pub rule_desc: String,
    cells: Vec<Value>,
}

impl ReportRow {
    /// Cells aligned with [`ViolationReport::columns`]
    pub fn cells(&self) -> &[Value] {
        &self.cells
    }
}

/// De-duplicated, sorted view of the violation table
#[derive(Debug, Clone, Default)]
pub struct ViolationReport {
    columns: Vec<String>,
    rows: Vec<ReportRow>,
}

impl ViolationReport {
    /// Build a report from engine output
    ///
    /// Keeps the first row per `(claim_id, rule_id)` and orders by rule id,
    /// then claim id. An empty violation table gives an empty report.
    pub fn generate(violations: &ViolationTable) -> Self {
        if violations.is_empty() {
            debug!("No violations, report is empty");
            return Self::default();
        }

        let schema = violations.claim_schema();
        let columns: Vec<String> = REPORT_COLUMNS
            .iter()
            .filter(|c| {
                **c == RULE_ID_COLUMN || **c == RULE_DESC_COLUMN || schema.contains(c)
            })
            .chain(OPTIONAL_COLUMNS.iter().filter(|c| schema.contains(c)))
            .map(|c| c.to_string())
            .collect();

        let mut seen: HashSet<(KeyPart, RuleId)> = HashSet::new();
        let mut rows: Vec<ReportRow> = Vec::new();

        for violation in violations.violations() {
            let claim_id = violations
                .value(violation, "claim_id")
                .unwrap_or(Value::Null);
            if !seen.insert((claim_id.key_part(), violation.rule_id.clone())) {
                continue;
            }

            let cells = columns
                .iter()
                .map(|c| violations.value(violation, c).unwrap_or(Value::Null))
                .collect();
            rows.push(ReportRow {
                rule_id: violation.rule_id.clone(),
                rule_desc: violation.rule_desc.clone(),
                cells,
            });
        }

        let claim_position = columns.iter().position(|c| c == "claim_id");
        rows.sort_by(|a, b| {
            a.rule_id.cmp(&b.rule_id).then_with(|| match claim_position {
                Some(p) => order_values(&a.cells[p], &b.cells[p]),
                None => Ordering::Equal,
            })
        });

        debug!(
            violations = %violations.len(),
            rows = %rows.len(),
            "Generated violation report"
        );

        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[ReportRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows grouped per rule, in report order
    pub fn by_rule(&self) -> Vec<RuleSection<'_>> {
        let mut sections: Vec<RuleSection<'_>> = Vec::new();

        for row in &self.rows {
            match sections.last_mut() {
                Some(section) if section.rule_id == row.rule_id => section.rows.push(row),
                _ => sections.push(RuleSection {
                    rule_id: row.rule_id.clone(),
                    rule_desc: row.rule_desc.clone(),
                    columns: &self.columns,
                    rows: vec![row],
                }),
            }
        }

        sections
    }
}

impl Serialize for ViolationReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.rows.iter().map(|row| RowMap {
            columns: &self.columns,
            cells: &row.cells,
            skip_rule: false,
        }))
    }
}

/// All report rows for one rule
#[derive(Debug, Clone)]
pub struct RuleSection<'a> {
    pub rule_id: RuleId,
    pub rule_desc: String,
    columns: &'a [String],
    rows: Vec<&'a ReportRow>,
}

impl<'a> RuleSection<'a> {
    pub fn count(&self) -> usize {
        self.rows.len()
    }

    pub fn rows(&self) -> &[&'a ReportRow] {
        &self.rows
    }

    /// Report columns without the two rule columns
    pub fn columns(&self) -> Vec<&'a str> {
        self.columns
            .iter()
            .map(String::as_str)
            .filter(|c| *c != RULE_ID_COLUMN && *c != RULE_DESC_COLUMN)
            .collect()
    }
}

impl Serialize for RuleSection<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let rows: Vec<RowMap<'_>> = self
            .rows
            .iter()
            .map(|row| RowMap {
                columns: self.columns,
                cells: &row.cells,
                skip_rule: true,
            })
            .collect();

        let mut map = serializer.serialize_map(Some(4))?;
        map.serialize_entry("rule_id", &self.rule_id)?;
        map.serialize_entry("rule_desc", &self.rule_desc)?;
        map.serialize_entry("count", &self.count())?;
        map.serialize_entry("rows", &rows)?;
        map.end()
    }
}

struct RowMap<'a> {
    columns: &'a [String],
    cells: &'a [Value],
    skip_rule: bool,
}

impl Serialize for RowMap<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        for (name, value) in self.columns.iter().zip(self.cells) {
            if self.skip_rule && (name == RULE_ID_COLUMN || name == RULE_DESC_COLUMN) {
                continue;
            }
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Total order for report sorting: comparable values by value, otherwise by type
fn order_values(a: &Value, b: &Value) -> Ordering {
    a.compare(b)
        .unwrap_or_else(|| a.key_part().cmp(&b.key_part()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use claimscan_core::{ClaimTable, Violation};

    fn violations() -> ViolationTable {
        let claims = ClaimTable::from_records(vec![
            vec![
                ("claim_id", Value::from("C2")),
                ("member_id", Value::from("M1")),
                ("provider_npi", Value::from("P1")),
                ("paid_amount", Value::from(100)),
                ("internal_flag", Value::from(true)),
            ],
            vec![
                ("claim_id", Value::from("C1")),
                ("member_id", Value::from("M1")),
                ("provider_npi", Value::from("P2")),
                ("paid_amount", Value::from(200)),
                ("internal_flag", Value::from(false)),
            ],
            vec![
                ("claim_id", Value::from("C3")),
                ("member_id", Value::from("M2")),
                ("provider_npi", Value::from("P1")),
                ("paid_amount", Value::from(300)),
                ("internal_flag", Value::from(false)),
            ],
        ]);
        let (schema, rows) = claims.into_parts();
        let tag = |row: usize, id: i64, desc: &str| Violation {
            claim: rows[row].clone(),
            rule_id: RuleId::from(id),
            rule_desc: desc.to_string(),
        };

        ViolationTable::new(
            schema,
            vec![
                tag(2, 5, "Duplicate"),
                tag(0, 2, "High paid"),
                tag(1, 2, "High paid"),
                tag(0, 2, "High paid"),
            ],
        )
    }

    #[test]
    fn test_columns_dedup_and_order() {
        let report = ViolationReport::generate(&violations());

        assert_eq!(
            report.columns(),
            &["claim_id", "rule_id", "rule_desc", "member_id", "provider_npi", "paid_amount"]
        );
        assert_eq!(report.len(), 3);

        let order: Vec<(String, String)> = report
            .rows()
            .iter()
            .map(|r| (r.rule_id.to_string(), r.cells()[0].to_string()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("2".to_string(), "C1".to_string()),
                ("2".to_string(), "C2".to_string()),
                ("5".to_string(), "C3".to_string()),
            ]
        );
    }

    #[test]
    fn test_sections_by_rule() {
        let report = ViolationReport::generate(&violations());
        let sections = report.by_rule();

        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].rule_desc, "High paid");
        assert_eq!(sections[0].count(), 2);
        assert_eq!(sections[1].count(), 1);
        assert_eq!(
            sections[0].columns(),
            vec!["claim_id", "member_id", "provider_npi", "paid_amount"]
        );

        let json = serde_json::to_value(&sections[1]).unwrap();
        assert_eq!(json["rule_id"], 5);
        assert_eq!(json["rows"][0]["claim_id"], "C3");
        assert!(json["rows"][0].get("rule_desc").is_none());
    }

    #[test]
    fn test_empty_report() {
        let empty = ViolationTable::empty(std::sync::Arc::new(claimscan_core::Schema::new([
            "claim_id",
        ])));
        let report = ViolationReport::generate(&empty);
        assert!(report.is_empty());
        assert!(report.by_rule().is_empty());
        assert_eq!(serde_json::to_string(&report).unwrap(), "[]");
    }
}
