//! ClaimScan Report
//!
//! Consumers of the engine's violation table:
//! - a de-duplicated report sorted by rule and claim, with per-rule sections
//! - summary statistics with rule, member and provider breakdowns

pub mod report;
pub mod stats;

pub use report::{ReportRow, RuleSection, ViolationReport};
pub use stats::{EntityAnalysis, EntityTotal, RuleCount, Statistics};
