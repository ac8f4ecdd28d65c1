//! Application configuration

use claimscan_rules::EngineConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::cli::RunArgs;

/// Top-level configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Rule engine settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Claims and rules ingestion
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Report settings
    #[serde(default)]
    pub report: ReportConfig,

    /// Telemetry settings
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// Load configuration from file and CLI overrides
    pub fn load(config_path: &str, run: Option<&RunArgs>) -> anyhow::Result<Self> {
        let mut config: Self = if Path::new(config_path).exists() {
            let content = std::fs::read_to_string(config_path)?;
            debug!(path = %config_path, "Loading configuration file");
            serde_yaml::from_str(&content)?
        } else {
            Self::default()
        };

        if let Some(run) = run {
            if run.strict_columns {
                config.engine.strict_columns = true;
            }
            if run.audit.is_some() {
                config.telemetry.audit = true;
            }
        }

        Ok(config)
    }
}

/// Ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Columns kept as text even when every cell looks numeric
    #[serde(default = "default_text_columns")]
    pub text_columns: Vec<String>,

    /// Coerce date-hinted columns to dates
    #[serde(default = "default_true")]
    pub parse_dates: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            text_columns: default_text_columns(),
            parse_dates: true,
        }
    }
}

/// Report configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Entries kept per member and provider ranking
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Record a hash-chained audit trail
    #[serde(default)]
    pub audit: bool,
}

fn default_text_columns() -> Vec<String> {
    ["procedure_cd", "diag_cd", "claim_id", "member_id", "provider_npi"]
        .iter()
        .map(|c| c.to_string())
        .collect()
}

fn default_true() -> bool {
    true
}

fn default_top_n() -> usize {
    10
}
