//! Rules and claims ingestion
//!
//! Rules come from CSV, JSON or YAML and must carry the four rule columns.
//! Claims come from CSV or JSON; cells are typed on the way in, configured
//! text columns stay text, and date-hinted columns become dates where they
//! parse.

use claimscan_core::{parse_date, Claim, ClaimTable, Error, KeyPart, Result, Schema, Value};
use claimscan_rules::RuleSet;
use serde_json::Map;
use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, info};

use crate::config::IngestConfig;

/// Columns every rules file must provide
pub const RULE_COLUMNS: [&str; 4] = ["Rule_ID", "Rule_Desc", "Level", "Rule_Allegation"];

/// Supported input file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Csv,
    Json,
    Yaml,
}

impl Format {
    /// Detect the format from the file extension
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            "yaml" | "yml" => Ok(Self::Yaml),
            _ => Err(Error::ingest(format!(
                "unsupported file type: {}",
                path.display()
            ))),
        }
    }
}

/// Load a rules file, checking the required columns first
pub fn load_rules(path: &Path) -> Result<RuleSet> {
    let records = match Format::from_path(path)? {
        Format::Csv => csv_objects(path)?,
        Format::Json => {
            let reader = BufReader::new(File::open(path)?);
            objects(serde_json::from_reader(reader)?)?
        }
        Format::Yaml => {
            let reader = BufReader::new(File::open(path)?);
            objects(serde_yaml::from_reader(reader)?)?
        }
    };

    check_rule_columns(&records)?;

    let rules: RuleSet = serde_json::from_value(serde_json::Value::Array(
        records.into_iter().map(serde_json::Value::Object).collect(),
    ))?;

    info!(path = %path.display(), rules = %rules.len(), "Loaded rules");
    for (level, count) in rules.level_counts() {
        info!(level = %level, count = %count, "Rule level count");
    }

    Ok(rules)
}

/// Load a claims file
pub fn load_claims(path: &Path, config: &IngestConfig, date_hints: &[String]) -> Result<ClaimTable> {
    let table = match Format::from_path(path)? {
        Format::Csv => claims_from_csv(path, config)?,
        Format::Json => claims_from_json(path, config)?,
        Format::Yaml => {
            return Err(Error::ingest(format!(
                "claims must be csv or json: {}",
                path.display()
            )))
        }
    };

    let table = if config.parse_dates {
        coerce_dates(table, date_hints)
    } else {
        table
    };

    log_claims_summary(path, &table);
    Ok(table)
}

fn csv_objects(path: &Path) -> Result<Vec<Map<String, serde_json::Value>>> {
    let mut reader = csv::Reader::from_reader(BufReader::new(File::open(path)?));
    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    require_columns(|column| headers.iter().any(|h| h == column))?;

    let mut records = Vec::new();
    for record in reader.records() {
        let record = record?;
        let object = headers
            .iter()
            .zip(record.iter())
            .map(|(name, cell)| (name.clone(), serde_json::Value::from(cell)))
            .collect();
        records.push(object);
    }

    Ok(records)
}

fn objects(value: serde_json::Value) -> Result<Vec<Map<String, serde_json::Value>>> {
    match value {
        serde_json::Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| match item {
                serde_json::Value::Object(map) => Ok(map),
                other => Err(Error::ingest(format!(
                    "record {} is not an object: {}",
                    i, other
                ))),
            })
            .collect(),
        serde_json::Value::Null => Ok(Vec::new()),
        other => Err(Error::ingest(format!(
            "expected a list of records, found {}",
            json_type(&other)
        ))),
    }
}

fn check_rule_columns(records: &[Map<String, serde_json::Value>]) -> Result<()> {
    require_columns(|column| records.iter().all(|r| r.contains_key(column)))
}

fn require_columns(present: impl Fn(&str) -> bool) -> Result<()> {
    let missing: Vec<String> = RULE_COLUMNS
        .iter()
        .filter(|c| !present(**c))
        .map(|c| c.to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::MissingColumns(missing))
    }
}

fn claims_from_csv(path: &Path, config: &IngestConfig) -> Result<ClaimTable> {
    let mut reader = csv::Reader::from_reader(BufReader::new(File::open(path)?));
    let columns: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    let text: Vec<bool> = columns
        .iter()
        .map(|c| config.text_columns.iter().any(|t| t == c))
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let values = record
            .iter()
            .zip(&text)
            .map(|(cell, &keep_text)| text_cell(cell, keep_text))
            .collect();
        rows.push(Claim::new(values));
    }

    ClaimTable::new(Schema::new(columns), rows)
}

fn text_cell(raw: &str, keep_text: bool) -> Value {
    if !keep_text {
        return Value::infer(raw);
    }
    if raw.trim().is_empty() {
        Value::Null
    } else {
        Value::Text(raw.to_string())
    }
}

fn claims_from_json(path: &Path, config: &IngestConfig) -> Result<ClaimTable> {
    let reader = BufReader::new(File::open(path)?);
    let records = objects(serde_json::from_reader(reader)?)?;

    let keep_text = |name: &str| config.text_columns.iter().any(|t| t == name);

    Ok(ClaimTable::from_records(records.into_iter().map(|record| {
        record
            .into_iter()
            .map(|(name, value)| {
                let cell = match &value {
                    serde_json::Value::Number(n) if keep_text(&name) => Value::Text(n.to_string()),
                    other => Value::from_json(other),
                };
                (name, cell)
            })
            .collect::<Vec<_>>()
    })))
}

/// Parse text cells in date-hinted columns; unparseable cells are kept
fn coerce_dates(table: ClaimTable, date_hints: &[String]) -> ClaimTable {
    let hinted: Vec<bool> = table
        .schema()
        .columns()
        .iter()
        .map(|c| {
            let lower = c.to_ascii_lowercase();
            date_hints
                .iter()
                .any(|h| lower.contains(&h.to_ascii_lowercase()))
        })
        .collect();

    if !hinted.iter().any(|&h| h) {
        return table;
    }

    let (schema, rows) = table.into_parts();
    let mut coerced = 0usize;
    let rows = rows
        .into_iter()
        .map(|claim| {
            let values = claim
                .values()
                .iter()
                .zip(&hinted)
                .map(|(value, &hint)| match value {
                    Value::Text(s) if hint => match parse_date(s) {
                        Some(date) => {
                            coerced += 1;
                            Value::Date(date)
                        }
                        None => value.clone(),
                    },
                    _ => value.clone(),
                })
                .collect();
            Claim::new(values)
        })
        .collect();

    debug!(cells = %coerced, "Coerced date-hinted cells");
    ClaimTable::from_parts(schema, rows)
}

fn log_claims_summary(path: &Path, table: &ClaimTable) {
    info!(
        path = %path.display(),
        claims = %table.len(),
        columns = %table.schema().len(),
        "Loaded claims"
    );

    let first = table
        .iter()
        .filter_map(|c| c.get("claim_service_from")?.as_date())
        .min();
    let last = table
        .iter()
        .filter_map(|c| c.get("claim_service_to")?.as_date())
        .max();
    if let (Some(from), Some(to)) = (first, last) {
        info!(from = %from, to = %to, "Claim service date span");
    }

    for column in ["member_id", "provider_npi"] {
        if table.schema().contains(column) {
            let distinct: HashSet<KeyPart> = table
                .iter()
                .filter_map(|c| c.get(column))
                .filter(|v| !v.is_null())
                .map(Value::key_part)
                .collect();
            info!(column = %column, distinct = %distinct.len(), "Distinct values");
        }
    }
}

fn json_type(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
