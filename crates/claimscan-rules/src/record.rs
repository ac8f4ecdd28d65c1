//! Record-level evaluation

use claimscan_core::{ClaimTable, RuleFailure};

use crate::condition::ParsedCondition;
use crate::evaluator::{MatchSet, RuleEvaluator};

/// Evaluates a compiled predicate independently against every pool row
#[derive(Debug, Clone, Default)]
pub struct RecordEvaluator {
    strict_columns: bool,
}

impl RecordEvaluator {
    pub fn new(strict_columns: bool) -> Self {
        Self { strict_columns }
    }
}

impl RuleEvaluator for RecordEvaluator {
    fn evaluate(
        &self,
        pool: &ClaimTable,
        condition: &ParsedCondition,
        warnings: &mut Vec<String>,
    ) -> Result<MatchSet, RuleFailure> {
        let predicate = condition.predicate.as_ref().ok_or_else(|| {
            RuleFailure::evaluation("record rule has no compiled predicate")
        })?;

        for field in predicate.fields() {
            if pool.schema().contains(field) {
                continue;
            }
            if self.strict_columns {
                return Err(RuleFailure::UnknownColumn(field.to_string()));
            }
            warnings.push(format!(
                "column `{}` is not in the claims; comparisons on it are false",
                field
            ));
        }

        let rows = pool
            .iter()
            .enumerate()
            .filter(|(_, row)| predicate.matches(row))
            .map(|(i, _)| i)
            .collect();

        Ok(MatchSet::new(rows))
    }
}
