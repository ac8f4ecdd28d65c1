//! Command implementations

use anyhow::Context;
use claimscan_core::{ObserverSet, RuleFailure, RuleId, TracingObserver, ViolationTable};
use claimscan_report::{Statistics, ViolationReport};
use claimscan_rules::{RuleEngine, RuleLevel};
use claimscan_telemetry::{AuditObserver, AuditTrail, MetricsCollector, MetricsSnapshot};
use metrics_exporter_prometheus::PrometheusHandle;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::config::AppConfig;
use crate::export;
use crate::ingest;

/// Everything a run produced
#[derive(Debug)]
pub struct RunOutcome {
    pub violations: ViolationTable,
    pub report: ViolationReport,
    pub statistics: Statistics,
    pub metrics: MetricsSnapshot,
    pub audit: Option<AuditTrail>,
}

/// Load inputs, apply the rules and write every requested output
///
/// `prometheus` is the installed metrics recorder, when there is one.
pub fn run(
    config: &AppConfig,
    args: &RunArgs,
    prometheus: Option<&PrometheusHandle>,
) -> anyhow::Result<RunOutcome> {
    let rules = ingest::load_rules(&args.rules)
        .with_context(|| format!("failed to load rules from {}", args.rules.display()))?;
    let claims = ingest::load_claims(&args.claims, &config.ingest, &config.engine.date_hints)
        .with_context(|| format!("failed to load claims from {}", args.claims.display()))?;

    let metrics = Arc::new(MetricsCollector::new());
    let audit = config.telemetry.audit.then(|| Arc::new(AuditObserver::new()));

    let mut observers = ObserverSet::new()
        .with(Arc::new(TracingObserver))
        .with(metrics.clone());
    if let Some(audit) = &audit {
        observers.push(audit.clone());
    }

    let engine = RuleEngine::new(config.engine.clone())?.with_observer(Arc::new(observers));
    let violations = engine.apply_rules(rules.rules(), claims);

    let report = ViolationReport::generate(&violations);
    let statistics = Statistics::calculate(&violations, config.report.top_n);
    let audit = audit.map(|a| a.trail());

    if let Some(trail) = &audit {
        if !trail.verify() {
            warn!(events = %trail.len(), "Audit trail failed verification");
        }
    }

    let outcome = RunOutcome {
        violations,
        report,
        statistics,
        metrics: metrics.snapshot(),
        audit,
    };

    write_outputs(args, &outcome, prometheus)?;

    info!(
        violations = %outcome.violations.len(),
        report_rows = %outcome.report.len(),
        unique_claims = %outcome.statistics.unique_claims,
        rules_matched = %outcome.metrics.rules_matched,
        "Run complete"
    );

    Ok(outcome)
}

fn write_outputs(
    args: &RunArgs,
    outcome: &RunOutcome,
    prometheus: Option<&PrometheusHandle>,
) -> anyhow::Result<()> {
    if let Some(path) = &args.output {
        export::write_violations(path, &outcome.violations)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    if let Some(path) = &args.report {
        export::write_report(path, &outcome.report)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    if let Some(path) = &args.stats {
        export::write_json(path, &outcome.statistics)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    if let (Some(path), Some(trail)) = (&args.audit, &outcome.audit) {
        export::write_json(path, trail)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    if let Some(path) = &args.metrics {
        let text = match prometheus {
            Some(handle) => handle.render(),
            None => {
                warn!("No metrics recorder installed, writing the in-process snapshot");
                serde_json::to_string_pretty(&outcome.metrics)?
            }
        };
        export::write_text(path, &text)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    Ok(())
}

/// Outcome of checking one rule
#[derive(Debug, Clone)]
pub struct RuleCheck {
    pub id: RuleId,
    pub level: RuleLevel,
    pub result: Result<String, RuleFailure>,
}

/// Parse every rule without touching claims
pub fn check_rules(config: &AppConfig, rules_path: &Path) -> anyhow::Result<Vec<RuleCheck>> {
    let rules = ingest::load_rules(rules_path)
        .with_context(|| format!("failed to load rules from {}", rules_path.display()))?;
    let engine = RuleEngine::new(config.engine.clone())?;

    let checks = rules
        .sorted()
        .into_iter()
        .map(|rule| RuleCheck {
            id: rule.id.clone(),
            level: rule.level.clone(),
            result: engine.check(rule).map(|parsed| {
                format!(
                    "keys={} filters={} differences={}",
                    parsed.self_comparisons.len(),
                    parsed.value_comparisons.len(),
                    parsed.field_differences.len()
                )
            }),
        })
        .collect();

    Ok(checks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const RULES: &str = "Rule_ID,Rule_Desc,Level,Rule_Allegation\n\
        2,Duplicate billing,DataSet,member_id = member_id and procedure_cd = procedure_cd\n\
        1,High paid,Record,paid_amount > 1000\n\
        3,Broken,Record,paid_amount >\n";

    const CLAIMS: &str = "claim_id,member_id,procedure_cd,paid_amount,claim_service_from\n\
        C1,M1,00100,1500,2024-01-01\n\
        C2,M2,00200,50,2024-01-02\n\
        C3,M2,00200,60,2024-01-03\n\
        C4,M3,00300,70,2024-01-04\n";

    #[test]
    fn test_run_writes_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let rules = dir.path().join("rules.csv");
        let claims = dir.path().join("claims.csv");
        fs::write(&rules, RULES).unwrap();
        fs::write(&claims, CLAIMS).unwrap();

        let args = RunArgs {
            rules,
            claims,
            output: Some(dir.path().join("violations.csv")),
            report: Some(dir.path().join("report.csv")),
            stats: Some(dir.path().join("stats.json")),
            audit: Some(dir.path().join("audit.json")),
            metrics: Some(dir.path().join("metrics.json")),
            ..RunArgs::default()
        };
        let config = AppConfig::load("/nonexistent.yaml", Some(&args)).unwrap();

        let outcome = run(&config, &args, None).unwrap();

        assert_eq!(outcome.violations.len(), 3);
        assert_eq!(outcome.report.len(), 3);
        assert_eq!(outcome.statistics.rules_triggered, 2);
        assert_eq!(outcome.metrics.rules_matched, 2);
        assert_eq!(outcome.metrics.rules_failed, 1);
        assert!(outcome.audit.as_ref().unwrap().verify());

        let violations = fs::read_to_string(dir.path().join("violations.csv")).unwrap();
        assert!(violations.starts_with("claim_id,member_id,procedure_cd,paid_amount"));
        assert!(violations.contains("C1,M1,00100,1500,2024-01-01,1,High paid"));

        let stats: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("stats.json")).unwrap())
                .unwrap();
        assert_eq!(stats["unique_claims"], 3);

        let audit: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("audit.json")).unwrap())
                .unwrap();
        assert!(!audit["events"].as_array().unwrap().is_empty());

        assert!(dir.path().join("metrics.json").exists());
    }

    #[test]
    fn test_check_rules() {
        let dir = tempfile::tempdir().unwrap();
        let rules = dir.path().join("rules.csv");
        fs::write(&rules, RULES).unwrap();

        let checks = check_rules(&AppConfig::default(), &rules).unwrap();
        assert_eq!(checks.len(), 3);
        assert_eq!(checks[0].id, RuleId::from(1));
        assert_eq!(checks[0].result.as_ref().unwrap(), "keys=0 filters=1 differences=0");
        assert_eq!(checks[1].result.as_ref().unwrap(), "keys=2 filters=0 differences=0");
        assert!(matches!(checks[2].result, Err(RuleFailure::Parse(_))));
    }
}
