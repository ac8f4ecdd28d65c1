//! ClaimScan CLI
//!
//! Loads rules and claims, runs the rule engine and writes the violation
//! table, report, statistics, audit trail and metrics.

pub mod cli;
pub mod commands;
pub mod config;
pub mod export;
pub mod ingest;

pub use cli::{Cli, Commands, LogFormat, RunArgs};
pub use commands::{check_rules, run, RuleCheck, RunOutcome};
pub use config::AppConfig;
