//! DataSet-level evaluation
//!
//! Three stages over the current pool:
//!
//! 1. value comparisons filter rows conjunctively
//! 2. surviving rows are grouped by the self-compared fields; only groups
//!    of two or more rows qualify
//! 3. when field differences are declared, every unordered pair within a
//!    group is checked and rows of accepted pairs are kept
//!
//! A distance that cannot be computed is `+inf`, so bounded constraints
//! (`<`, `<=`, `==`) fail and unbounded ones (`>`, `>=`, `!=`) hold.

use aho_corasick::AhoCorasick;
use claimscan_core::{ClaimRef, ClaimTable, Error, KeyPart, Result, RuleFailure, Value};
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::condition::{FieldDifference, ParsedCondition, ValueComparison};
use crate::config::EngineConfig;
use crate::evaluator::{MatchSet, RuleEvaluator};

/// Duplicate-key and pairwise-distance evaluator
#[derive(Debug, Clone)]
pub struct DataSetEvaluator {
    strict_columns: bool,
    max_group_size: usize,
    date_hints: AhoCorasick,
}

impl DataSetEvaluator {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let date_hints = AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .build(&config.date_hints)
            .map_err(|e| Error::config(format!("Invalid date hints: {}", e)))?;

        Ok(Self {
            strict_columns: config.strict_columns,
            max_group_size: config.max_group_size,
            date_hints,
        })
    }

    /// Whether a difference is measured in days
    pub fn is_date_difference(&self, difference: &FieldDifference) -> bool {
        self.date_hints.is_match(&difference.left) || self.date_hints.is_match(&difference.right)
    }

    fn prefilter(
        &self,
        pool: &ClaimTable,
        comparisons: &[ValueComparison],
        warnings: &mut Vec<String>,
    ) -> std::result::Result<Vec<usize>, RuleFailure> {
        let mut active: Vec<(usize, &ValueComparison)> = Vec::with_capacity(comparisons.len());
        let mut unknown: Vec<&str> = Vec::new();

        for comparison in comparisons {
            match pool.schema().position(&comparison.field) {
                Some(position) => active.push((position, comparison)),
                None if self.strict_columns => {
                    return Err(RuleFailure::UnknownColumn(comparison.field.clone()));
                }
                None => {
                    if !unknown.contains(&comparison.field.as_str()) {
                        unknown.push(&comparison.field);
                        warnings.push(format!(
                            "prefilter column `{}` is not in the claims; comparison ignored",
                            comparison.field
                        ));
                    }
                }
            }
        }

        Ok(pool
            .rows()
            .iter()
            .enumerate()
            .filter(|(_, claim)| {
                active.iter().all(|(position, comparison)| {
                    claim
                        .value(*position)
                        .is_some_and(|cell| comparison.matches(cell))
                })
            })
            .map(|(i, _)| i)
            .collect())
    }

    /// Groups of two or more rows sharing every key field, in first-seen order
    fn duplicate_groups(
        &self,
        pool: &ClaimTable,
        candidates: &[usize],
        fields: &[String],
    ) -> std::result::Result<Vec<Vec<usize>>, RuleFailure> {
        let positions = fields
            .iter()
            .map(|field| {
                pool.schema()
                    .position(field)
                    .ok_or_else(|| RuleFailure::UnknownColumn(field.clone()))
            })
            .collect::<std::result::Result<Vec<usize>, RuleFailure>>()?;

        let mut index: HashMap<Vec<KeyPart>, usize> = HashMap::new();
        let mut groups: Vec<Vec<usize>> = Vec::new();

        for &row in candidates {
            let Some(claim) = pool.rows().get(row) else {
                continue;
            };
            let key: Vec<KeyPart> = positions
                .iter()
                .map(|&p| claim.value(p).map_or(KeyPart::Null, Value::key_part))
                .collect();
            if key.contains(&KeyPart::Null) {
                continue;
            }
            match index.get(&key) {
                Some(&g) => groups[g].push(row),
                None => {
                    index.insert(key, groups.len());
                    groups.push(vec![row]);
                }
            }
        }

        groups.retain(|group| group.len() >= 2);
        Ok(groups)
    }

    fn distance(
        &self,
        difference: &FieldDifference,
        as_days: bool,
        first: &ClaimRef<'_>,
        second: &ClaimRef<'_>,
    ) -> std::result::Result<f64, RuleFailure> {
        let lhs = cell(first, &difference.left)?;
        let rhs = cell(second, &difference.right)?;

        if as_days {
            let a = coerce_date(&difference.left, lhs)?;
            let b = coerce_date(&difference.right, rhs)?;
            Ok((a - b).num_days().abs() as f64)
        } else {
            let a = coerce_number(&difference.left, lhs)?;
            let b = coerce_number(&difference.right, rhs)?;
            Ok((a - b).abs())
        }
    }

    fn pair_accepted(
        &self,
        differences: &[(&FieldDifference, bool)],
        first: &ClaimRef<'_>,
        second: &ClaimRef<'_>,
    ) -> bool {
        differences.iter().all(|&(difference, as_days)| {
            let distance = self
                .distance(difference, as_days, first, second)
                .unwrap_or_else(|failure| {
                    debug!(
                        left = %difference.left,
                        right = %difference.right,
                        "Distance not computable, treating as unbounded: {}",
                        failure
                    );
                    f64::INFINITY
                });
            difference.op.holds(distance, difference.threshold)
        })
    }

    fn pairwise(
        &self,
        pool: &ClaimTable,
        groups: &[Vec<usize>],
        differences: &[FieldDifference],
        warnings: &mut Vec<String>,
    ) -> std::result::Result<Vec<usize>, RuleFailure> {
        for difference in differences {
            for field in [&difference.left, &difference.right] {
                if pool.schema().contains(field) {
                    continue;
                }
                if self.strict_columns {
                    return Err(RuleFailure::UnknownColumn(field.clone()));
                }
                warnings.push(format!(
                    "difference column `{}` is not in the claims; distance is unbounded",
                    field
                ));
            }
        }

        let differences: Vec<(&FieldDifference, bool)> = differences
            .iter()
            .map(|d| (d, self.is_date_difference(d)))
            .collect();

        let mut seen: HashSet<usize> = HashSet::new();
        let mut matched: Vec<usize> = Vec::new();

        for group in groups {
            if group.len() > self.max_group_size {
                warnings.push(format!(
                    "duplicate group of {} rows exceeds max_group_size {}; pairwise check skipped",
                    group.len(),
                    self.max_group_size
                ));
                continue;
            }

            for (i, &a) in group.iter().enumerate() {
                for &b in &group[i + 1..] {
                    let (Some(first), Some(second)) = (pool.row(a), pool.row(b)) else {
                        continue;
                    };
                    if !self.pair_accepted(&differences, &first, &second) {
                        continue;
                    }
                    for row in [a, b] {
                        if seen.insert(row) {
                            matched.push(row);
                        }
                    }
                }
            }
        }

        Ok(matched)
    }
}

impl Default for DataSetEvaluator {
    fn default() -> Self {
        Self::new(&EngineConfig::default()).expect("Failed to create dataset evaluator")
    }
}

impl RuleEvaluator for DataSetEvaluator {
    fn evaluate(
        &self,
        pool: &ClaimTable,
        condition: &ParsedCondition,
        warnings: &mut Vec<String>,
    ) -> std::result::Result<MatchSet, RuleFailure> {
        let candidates = self.prefilter(pool, &condition.value_comparisons, warnings)?;
        if candidates.is_empty() {
            return Ok(MatchSet::empty());
        }

        if condition.self_comparisons.is_empty() {
            return Err(RuleFailure::UnrecognizedStructure);
        }

        let groups = self.duplicate_groups(pool, &candidates, &condition.self_comparisons)?;
        if groups.is_empty() {
            return Ok(MatchSet::empty());
        }

        if condition.field_differences.is_empty() {
            let mut rows: Vec<usize> = groups.into_iter().flatten().collect();
            rows.sort_unstable();
            return Ok(MatchSet::new(rows));
        }

        let rows = self.pairwise(pool, &groups, &condition.field_differences, warnings)?;
        Ok(MatchSet::new(rows))
    }
}

fn cell<'a>(row: &ClaimRef<'a>, column: &str) -> std::result::Result<&'a Value, RuleFailure> {
    row.get(column)
        .ok_or_else(|| RuleFailure::UnknownColumn(column.to_string()))
}

fn coerce_date(
    column: &str,
    value: &Value,
) -> std::result::Result<chrono::NaiveDate, RuleFailure> {
    value.as_date().ok_or_else(|| RuleFailure::TypeCoercion {
        column: column.to_string(),
        value: value.to_string(),
        expected: "date",
    })
}

fn coerce_number(column: &str, value: &Value) -> std::result::Result<f64, RuleFailure> {
    value.as_f64().ok_or_else(|| RuleFailure::TypeCoercion {
        column: column.to_string(),
        value: value.to_string(),
        expected: "number",
    })
}
