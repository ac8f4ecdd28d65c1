//! Rule engine
//!
//! Applies rules in ascending id order against a shrinking pool of claims.
//! A claim matched by one rule is removed before the next rule runs, so
//! every claim is attributed to at most one rule.

use claimscan_core::{
    ClaimTable, EngineEvent, EngineObserver, Result, RuleFailure, TracingObserver, Violation,
    ViolationTable,
};
use std::sync::Arc;
use std::time::Instant;

use crate::condition::{ConditionParser, ParsedCondition};
use crate::config::EngineConfig;
use crate::dataset::DataSetEvaluator;
use crate::evaluator::{MatchSet, RuleEvaluator};
use crate::pool::ClaimPool;
use crate::record::RecordEvaluator;
use crate::rule::{sort_rules, Rule, RuleLevel};

/// First-match-wins rule engine
pub struct RuleEngine {
    config: EngineConfig,
    parser: ConditionParser,
    record: RecordEvaluator,
    dataset: DataSetEvaluator,
    observer: Arc<dyn EngineObserver>,
}

impl RuleEngine {
    /// Create a new engine that reports to `tracing`
    pub fn new(config: EngineConfig) -> Result<Self> {
        Ok(Self {
            parser: ConditionParser::new()?,
            record: RecordEvaluator::new(config.strict_columns),
            dataset: DataSetEvaluator::new(&config)?,
            observer: Arc::new(TracingObserver),
            config,
        })
    }

    /// Replace the observer receiving engine events
    pub fn with_observer(mut self, observer: Arc<dyn EngineObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Apply every rule to the claims
    ///
    /// Output rows follow rule order, then discovery order within a rule.
    /// When nothing matches the result is empty but keeps the claims columns.
    /// A failing rule contributes nothing and never stops the run.
    pub fn apply_rules(&self, rules: &[Rule], claims: ClaimTable) -> ViolationTable {
        let started = Instant::now();
        let ordered = sort_rules(rules);
        let mut pool = ClaimPool::new(claims);
        let mut violations = ViolationTable::empty(pool.schema_arc());
        let mut rules_matched = 0;

        self.emit(EngineEvent::RunStarted {
            rules: ordered.len(),
            claims: pool.len(),
        });

        for (position, rule) in ordered.iter().enumerate() {
            if pool.is_empty() {
                self.emit(EngineEvent::PoolExhausted {
                    skipped_rules: ordered.len() - position,
                });
                break;
            }

            self.emit(EngineEvent::RuleStarted {
                rule_id: rule.id.clone(),
                description: rule.description.clone(),
                remaining: pool.len(),
            });

            let rule_started = Instant::now();
            let mut warnings = Vec::new();
            let outcome = self.evaluate_rule(rule, pool.table(), &mut warnings);

            for message in warnings {
                self.emit(EngineEvent::RuleWarning {
                    rule_id: rule.id.clone(),
                    message,
                });
            }

            match outcome {
                Err(failure) => self.emit(EngineEvent::RuleFailed {
                    rule_id: rule.id.clone(),
                    condition: rule.condition.clone(),
                    failure,
                }),
                Ok(matches) if matches.is_empty() => self.emit(EngineEvent::RuleNoMatch {
                    rule_id: rule.id.clone(),
                    elapsed_us: elapsed_us(rule_started),
                }),
                Ok(matches) => {
                    for &row in matches.rows() {
                        if let Some(claim) = pool.table().rows().get(row) {
                            violations.push(Violation {
                                claim: claim.clone(),
                                rule_id: rule.id.clone(),
                                rule_desc: rule.description.clone(),
                            });
                        }
                    }

                    let removed = pool.remove(&matches);
                    rules_matched += 1;

                    self.emit(EngineEvent::RuleMatched {
                        rule_id: rule.id.clone(),
                        matched: matches.len(),
                        removed,
                        remaining: pool.len(),
                        elapsed_us: elapsed_us(rule_started),
                    });
                }
            }
        }

        self.emit(EngineEvent::RunFinished {
            violations: violations.len(),
            rules_matched,
            elapsed_us: elapsed_us(started),
        });

        violations
    }

    /// Evaluate one rule against a pool without changing it
    pub fn evaluate_rule(
        &self,
        rule: &Rule,
        pool: &ClaimTable,
        warnings: &mut Vec<String>,
    ) -> std::result::Result<MatchSet, RuleFailure> {
        let evaluator: &dyn RuleEvaluator = match &rule.level {
            RuleLevel::Record => &self.record,
            RuleLevel::DataSet => &self.dataset,
            RuleLevel::Other(level) => return Err(RuleFailure::UnknownLevel(level.clone())),
        };

        let parsed = self.parser.parse(&rule.level, &rule.condition)?;
        evaluator.evaluate(pool, &parsed, warnings)
    }

    /// Statically check a rule without any claims
    ///
    /// Catches unknown levels, conditions that do not parse and DataSet
    /// rules without a `field = field` grouping.
    pub fn check(&self, rule: &Rule) -> std::result::Result<ParsedCondition, RuleFailure> {
        if let RuleLevel::Other(level) = &rule.level {
            return Err(RuleFailure::UnknownLevel(level.clone()));
        }

        let parsed = self.parser.parse(&rule.level, &rule.condition)?;
        if rule.level == RuleLevel::DataSet && parsed.self_comparisons.is_empty() {
            return Err(RuleFailure::UnrecognizedStructure);
        }
        Ok(parsed)
    }

    fn emit(&self, event: EngineEvent) {
        self.observer.on_event(&event);
    }
}

fn elapsed_us(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_micros()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use claimscan_core::{RuleId, Value};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<EngineEvent>>);

    impl EngineObserver for Recorder {
        fn on_event(&self, event: &EngineEvent) {
            self.0.lock().unwrap().push(event.clone());
        }
    }

    fn claims() -> ClaimTable {
        ClaimTable::from_records(vec![
            vec![("claim_id", Value::from(1)), ("paid_amount", Value::from(1500))],
            vec![("claim_id", Value::from(2)), ("paid_amount", Value::from(500))],
        ])
    }

    #[test]
    fn test_record_rule_tags_matches() {
        let engine = RuleEngine::new(EngineConfig::default()).unwrap();
        let rules = vec![Rule::record(1, "High paid amount", "paid_amount > 1000")];

        let result = engine.apply_rules(&rules, claims());
        assert_eq!(result.len(), 1);
        let violation = &result.violations()[0];
        assert_eq!(result.value(violation, "claim_id"), Some(Value::from(1)));
        assert_eq!(violation.rule_id, RuleId::from(1));
        assert_eq!(violation.rule_desc, "High paid amount");
    }

    #[test]
    fn test_events_for_failures_and_exhaustion() {
        let recorder = Arc::new(Recorder::default());
        let engine = RuleEngine::new(EngineConfig::default())
            .unwrap()
            .with_observer(recorder.clone());

        let rules = vec![
            Rule::record(1, "broken", "paid_amount >"),
            Rule::new(2, "batch", RuleLevel::Other("Batch".into()), "paid_amount > 0"),
            Rule::record(3, "everything", "paid_amount > 0"),
            Rule::record(4, "never reached", "paid_amount > 0"),
            Rule::record(5, "never reached either", "paid_amount > 0"),
        ];

        let result = engine.apply_rules(&rules, claims());
        assert_eq!(result.len(), 2);

        let events = recorder.0.lock().unwrap();
        let names: Vec<&str> = events.iter().map(EngineEvent::name).collect();
        assert_eq!(
            names,
            vec![
                "run_started",
                "rule_started",
                "rule_failed",
                "rule_started",
                "rule_failed",
                "rule_started",
                "rule_matched",
                "pool_exhausted",
                "run_finished",
            ]
        );
        assert!(matches!(
            &events[4],
            EngineEvent::RuleFailed { failure: RuleFailure::UnknownLevel(level), .. } if level == "Batch"
        ));
        assert!(matches!(events[7], EngineEvent::PoolExhausted { skipped_rules: 2 }));
    }

    #[test]
    fn test_check() {
        let engine = RuleEngine::new(EngineConfig::default()).unwrap();
        assert!(engine.check(&Rule::record(1, "ok", "paid_amount > 1")).is_ok());
        assert_eq!(
            engine.check(&Rule::dataset(2, "no key", "paid_amount > 1")),
            Err(RuleFailure::UnrecognizedStructure)
        );
        assert!(matches!(
            engine.check(&Rule::record(3, "bad", "paid_amount >> 1")),
            Err(RuleFailure::Parse(_))
        ));
    }
}
