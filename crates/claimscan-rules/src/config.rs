//! Engine configuration

use serde::{Deserialize, Serialize};

/// Rule engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Treat references to columns missing from the claims as rule failures
    /// instead of warnings
    #[serde(default)]
    pub strict_columns: bool,

    /// Duplicate-key groups larger than this skip the pairwise difference check
    #[serde(default = "default_max_group_size")]
    pub max_group_size: usize,

    /// A field difference is measured in days when either field name
    /// contains one of these substrings (case-insensitive)
    #[serde(default = "default_date_hints")]
    pub date_hints: Vec<String>,
}

impl EngineConfig {
    pub fn with_strict_columns(mut self, strict: bool) -> Self {
        self.strict_columns = strict;
        self
    }

    pub fn with_max_group_size(mut self, size: usize) -> Self {
        self.max_group_size = size;
        self
    }

    pub fn with_date_hints<I, S>(mut self, hints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.date_hints = hints.into_iter().map(Into::into).collect();
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            strict_columns: false,
            max_group_size: default_max_group_size(),
            date_hints: default_date_hints(),
        }
    }
}

fn default_max_group_size() -> usize {
    5000
}

fn default_date_hints() -> Vec<String> {
    vec!["date".to_string(), "from".to_string(), "to".to_string()]
}
