//! ClaimScan Rules
//!
//! Declarative fraud and billing-discrepancy rules over claims tables.
//!
//! This crate provides:
//! - Rule definitions loaded from YAML or JSON
//! - A condition parser for the comparison grammar
//! - Record-level evaluation against a compiled predicate tree
//! - DataSet-level evaluation: prefilter, duplicate-key grouping, pairwise distances
//! - A first-match-wins engine that removes matched claims between rules

pub mod condition;
pub mod config;
pub mod dataset;
pub mod engine;
pub mod evaluator;
pub mod expr;
pub mod pool;
pub mod record;
pub mod rule;

pub use condition::{
    normalize, CompareOp, ConditionError, ConditionParser, FieldDifference, ParsedCondition,
    ValueComparison,
};
pub use config::EngineConfig;
pub use dataset::DataSetEvaluator;
pub use engine::RuleEngine;
pub use evaluator::{MatchSet, RuleEvaluator};
pub use expr::Expr;
pub use pool::ClaimPool;
pub use record::RecordEvaluator;
pub use rule::{sort_rules, Rule, RuleLevel, RuleSet};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::condition::{ConditionParser, ParsedCondition};
    pub use crate::config::EngineConfig;
    pub use crate::engine::RuleEngine;
    pub use crate::rule::{Rule, RuleLevel, RuleSet};
}
