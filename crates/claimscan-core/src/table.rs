//! Claim tables, composite row keys and the violation table

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::types::{KeyPart, RuleId, Value};

/// Column appended to every violation row: id of the matching rule
pub const RULE_ID_COLUMN: &str = "rule_id";

/// Column appended to every violation row: description of the matching rule
pub const RULE_DESC_COLUMN: &str = "rule_desc";

/// Ordered column names of a claims table
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Schema {
    columns: Vec<String>,
    index: HashMap<String, usize>,
}

impl Schema {
    /// Create a schema from column names; later duplicates are ignored by lookup
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        let mut index = HashMap::with_capacity(columns.len());
        for (i, name) in columns.iter().enumerate() {
            index.entry(name.clone()).or_insert(i);
        }
        Self { columns, index }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Position of a column by name
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }
}

/// A single claim row, aligned with its table's [`Schema`]
#[derive(Debug, Clone, PartialEq)]
pub struct Claim {
    values: Vec<Value>,
}

impl Claim {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn value(&self, position: usize) -> Option<&Value> {
        self.values.get(position)
    }

    /// Composite identity over every column of the row
    pub fn key(&self) -> RowKey {
        RowKey(self.values.iter().map(Value::key_part).collect())
    }
}

/// Full-row identity used to remove matched claims from the pool
///
/// Two claims with identical values in every original column have equal
/// keys and are indistinguishable for removal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RowKey(Vec<KeyPart>);

impl RowKey {
    pub fn parts(&self) -> &[KeyPart] {
        &self.0
    }
}

/// Borrowed view of one claim together with its schema
#[derive(Debug, Clone, Copy)]
pub struct ClaimRef<'a> {
    schema: &'a Schema,
    claim: &'a Claim,
}

impl<'a> ClaimRef<'a> {
    pub fn new(schema: &'a Schema, claim: &'a Claim) -> Self {
        Self { schema, claim }
    }

    /// Look up a cell by column name
    pub fn get(&self, column: &str) -> Option<&'a Value> {
        self.schema
            .position(column)
            .and_then(|i| self.claim.value(i))
    }

    pub fn claim(&self) -> &'a Claim {
        self.claim
    }
}

/// A fully materialized claims table
#[derive(Debug, Clone)]
pub struct ClaimTable {
    schema: Arc<Schema>,
    rows: Vec<Claim>,
}

impl ClaimTable {
    /// Build a table, checking every row against the schema width
    pub fn new(schema: Schema, rows: Vec<Claim>) -> Result<Self> {
        for (i, row) in rows.iter().enumerate() {
            if row.values.len() != schema.len() {
                return Err(Error::RowWidth {
                    row: i,
                    expected: schema.len(),
                    found: row.values.len(),
                });
            }
        }
        Ok(Self {
            schema: Arc::new(schema),
            rows,
        })
    }

    /// An empty table that still carries its columns
    pub fn empty(schema: Schema) -> Self {
        Self {
            schema: Arc::new(schema),
            rows: Vec::new(),
        }
    }

    /// Build a table from rows of `(column, value)` pairs
    ///
    /// Columns are taken in first-seen order; cells missing from a row are
    /// filled with [`Value::Null`].
    pub fn from_records<R, K, V>(records: R) -> Self
    where
        R: IntoIterator,
        R::Item: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut columns: Vec<String> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        let mut sparse: Vec<Vec<(usize, Value)>> = Vec::new();

        for record in records {
            let mut cells = Vec::new();
            for (name, value) in record {
                let name = name.into();
                let position = match positions.get(&name) {
                    Some(&p) => p,
                    None => {
                        positions.insert(name.clone(), columns.len());
                        columns.push(name);
                        columns.len() - 1
                    }
                };
                cells.push((position, value.into()));
            }
            sparse.push(cells);
        }

        let width = columns.len();
        let rows = sparse
            .into_iter()
            .map(|cells| {
                let mut values = vec![Value::Null; width];
                for (position, value) in cells {
                    values[position] = value;
                }
                Claim::new(values)
            })
            .collect();

        Self {
            schema: Arc::new(Schema::new(columns)),
            rows,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Shared handle to the schema
    pub fn schema_arc(&self) -> Arc<Schema> {
        Arc::clone(&self.schema)
    }

    pub fn rows(&self) -> &[Claim] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row view by position
    pub fn row(&self, index: usize) -> Option<ClaimRef<'_>> {
        self.rows.get(index).map(|c| ClaimRef::new(&self.schema, c))
    }

    /// Iterate over row views
    pub fn iter(&self) -> impl Iterator<Item = ClaimRef<'_>> {
        self.rows.iter().map(move |c| ClaimRef::new(&self.schema, c))
    }

    /// Consume the table into its parts
    pub fn into_parts(self) -> (Arc<Schema>, Vec<Claim>) {
        (self.schema, self.rows)
    }

    /// Rebuild a table from a shared schema and rows already aligned with it
    pub fn from_parts(schema: Arc<Schema>, rows: Vec<Claim>) -> Self {
        Self { schema, rows }
    }
}

/// A claim row tagged with the rule that matched it
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub claim: Claim,
    pub rule_id: RuleId,
    pub rule_desc: String,
}

/// Engine output: claims columns plus `rule_id` and `rule_desc`
#[derive(Debug, Clone)]
pub struct ViolationTable {
    schema: Arc<Schema>,
    violations: Vec<Violation>,
}

impl ViolationTable {
    /// An empty result carrying the claims schema
    pub fn empty(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            violations: Vec::new(),
        }
    }

    pub fn new(schema: Arc<Schema>, violations: Vec<Violation>) -> Self {
        Self { schema, violations }
    }

    /// Schema of the original claims columns
    pub fn claim_schema(&self) -> &Schema {
        &self.schema
    }

    /// Full output column list
    pub fn columns(&self) -> Vec<String> {
        let mut columns = self.schema.columns().to_vec();
        columns.push(RULE_ID_COLUMN.to_string());
        columns.push(RULE_DESC_COLUMN.to_string());
        columns
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    pub fn len(&self) -> usize {
        self.violations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn push(&mut self, violation: Violation) {
        self.violations.push(violation);
    }

    /// Look up any output column, including the two tag columns
    pub fn value(&self, violation: &Violation, column: &str) -> Option<Value> {
        match column {
            RULE_ID_COLUMN => Some(violation.rule_id.to_value()),
            RULE_DESC_COLUMN => Some(Value::Text(violation.rule_desc.clone())),
            _ => self
                .schema
                .position(column)
                .and_then(|i| violation.claim.value(i))
                .cloned(),
        }
    }

    /// Rows as ordered cell vectors matching [`columns`](Self::columns)
    pub fn records(&self) -> impl Iterator<Item = Vec<Value>> + '_ {
        self.violations.iter().map(|v| {
            let mut cells = v.claim.values().to_vec();
            cells.push(v.rule_id.to_value());
            cells.push(Value::Text(v.rule_desc.clone()));
            cells
        })
    }
}

struct ViolationRow<'a> {
    columns: &'a [String],
    violation: &'a Violation,
}

impl Serialize for ViolationRow<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len() + 2))?;
        for (name, value) in self.columns.iter().zip(self.violation.claim.values()) {
            map.serialize_entry(name, value)?;
        }
        map.serialize_entry(RULE_ID_COLUMN, &self.violation.rule_id)?;
        map.serialize_entry(RULE_DESC_COLUMN, &self.violation.rule_desc)?;
        map.end()
    }
}

impl Serialize for ViolationTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(self.violations.iter().map(|violation| ViolationRow {
            columns: self.schema.columns(),
            violation,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ClaimTable {
        ClaimTable::from_records(vec![
            vec![("claim_id", Value::from("C1")), ("paid_amount", Value::from(1500.0))],
            vec![("claim_id", Value::from("C2")), ("member_id", Value::from("M9"))],
        ])
    }

    #[test]
    fn test_from_records_fills_nulls() {
        let table = sample();
        assert_eq!(table.schema().columns(), &["claim_id", "paid_amount", "member_id"]);
        assert_eq!(table.row(0).unwrap().get("member_id"), Some(&Value::Null));
        assert_eq!(table.row(1).unwrap().get("paid_amount"), Some(&Value::Null));
        assert_eq!(table.row(1).unwrap().get("missing"), None);
    }

    #[test]
    fn test_row_width_checked() {
        let err = ClaimTable::new(Schema::new(["a", "b"]), vec![Claim::new(vec![Value::Null])])
            .unwrap_err();
        assert!(matches!(err, Error::RowWidth { row: 0, expected: 2, found: 1 }));
    }

    #[test]
    fn test_row_key_identity() {
        let a = Claim::new(vec![Value::from("C1"), Value::from(10.0)]);
        let b = Claim::new(vec![Value::from("C1"), Value::from(10.0)]);
        let c = Claim::new(vec![Value::from("C1"), Value::from(11.0)]);
        assert_eq!(a.key(), b.key());
        assert_ne!(a.key(), c.key());
    }

    #[test]
    fn test_violation_columns_and_json() {
        let table = sample();
        let (schema, rows) = table.into_parts();
        let mut violations = ViolationTable::empty(schema);
        assert_eq!(
            violations.columns(),
            vec!["claim_id", "paid_amount", "member_id", "rule_id", "rule_desc"]
        );

        violations.push(Violation {
            claim: rows[0].clone(),
            rule_id: RuleId::from(1),
            rule_desc: "High paid amount".to_string(),
        });

        let json = serde_json::to_value(&violations).unwrap();
        assert_eq!(json[0]["claim_id"], "C1");
        assert_eq!(json[0]["rule_id"], 1);
        assert_eq!(json[0]["member_id"], serde_json::Value::Null);
        assert_eq!(
            violations.value(&violations.violations()[0], "rule_desc"),
            Some(Value::from("High paid amount"))
        );
    }
}
