//! Evaluator seam shared by the Record and DataSet evaluators

use claimscan_core::{ClaimTable, RuleFailure};

use crate::condition::ParsedCondition;

/// Rows of the current pool matched by one rule, in discovery order
///
/// Indices refer to the pool table the evaluator was given and are only
/// meaningful until the pool next shrinks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchSet {
    rows: Vec<usize>,
}

impl MatchSet {
    pub fn new(rows: Vec<usize>) -> Self {
        Self { rows }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> &[usize] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Applies a parsed condition to a read-only pool
///
/// Implementations never mutate the pool. Non-fatal findings are pushed to
/// `warnings`; the engine forwards them to its observer tagged with the rule.
pub trait RuleEvaluator {
    fn evaluate(
        &self,
        pool: &ClaimTable,
        condition: &ParsedCondition,
        warnings: &mut Vec<String>,
    ) -> Result<MatchSet, RuleFailure>;
}
