//! Error types for ClaimScan

use serde::Serialize;

/// Result type alias using ClaimScan's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal errors surfaced to the caller
///
/// Anything raised while evaluating a single rule is a [`RuleFailure`]
/// instead, and never leaves the rule engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Input table could not be read or is structurally invalid
    #[error("ingest error: {0}")]
    Ingest(String),

    /// A required input column is absent
    #[error("missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    /// A row does not match its table schema
    #[error("row {row} has {found} values, schema has {expected} columns")]
    RowWidth {
        row: usize,
        expected: usize,
        found: usize,
    },

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Report generation or export errors
    #[error("report error: {0}")]
    Report(String),

    /// IO errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV read/write errors
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML serialization errors
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new ingest error
    pub fn ingest(msg: impl Into<String>) -> Self {
        Self::Ingest(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new report error
    pub fn report(msg: impl Into<String>) -> Self {
        Self::Report(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Why a single rule contributed no matches
///
/// The engine degrades every variant to an empty match set for the
/// offending rule and carries on with the next one.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum RuleFailure {
    /// The condition string does not compile
    #[error("condition does not parse: {0}")]
    Parse(String),

    /// A predicate or comparison cannot be computed for the data
    #[error("evaluation failed: {0}")]
    Evaluation(String),

    /// A value cannot be coerced to the type a comparison needs
    #[error("cannot coerce `{value}` in column `{column}` to {expected}")]
    TypeCoercion {
        column: String,
        value: String,
        expected: &'static str,
    },

    /// A DataSet rule without a duplicate-key declaration
    #[error("dataset rule structure not recognized: no `field = field` grouping")]
    UnrecognizedStructure,

    /// Level is neither Record nor DataSet
    #[error("unknown rule level `{0}`")]
    UnknownLevel(String),

    /// A referenced column does not exist in the claims schema
    #[error("unknown column `{0}`")]
    UnknownColumn(String),
}

impl RuleFailure {
    /// Create a new parse failure
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Create a new evaluation failure
    pub fn evaluation(msg: impl Into<String>) -> Self {
        Self::Evaluation(msg.into())
    }

    /// Short machine-readable name, used as a metrics label
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Parse(_) => "parse",
            Self::Evaluation(_) => "evaluation",
            Self::TypeCoercion { .. } => "type_coercion",
            Self::UnrecognizedStructure => "unrecognized_structure",
            Self::UnknownLevel(_) => "unknown_level",
            Self::UnknownColumn(_) => "unknown_column",
        }
    }
}
