//! Summary statistics over the violation table

use claimscan_core::{KeyPart, RuleId, Value, Violation, ViolationTable};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

const CLAIM_ID: &str = "claim_id";
const MEMBER_ID: &str = "member_id";
const PROVIDER_NPI: &str = "provider_npi";
const MEMBER_STATE: &str = "member_state";
const PAID_AMOUNT: &str = "paid_amount";

/// Violations per rule
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleCount {
    pub rule_id: RuleId,
    pub rule_desc: String,
    pub count: usize,
}

/// Violation count and paid total for one member or provider
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityTotal {
    pub id: String,
    pub violation_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_amount: Option<f64>,
}

/// Top members or providers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityAnalysis {
    /// Most violations first
    pub most_violations: Vec<EntityTotal>,

    /// Highest paid total first; present when claims carry `paid_amount`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highest_paid: Option<Vec<EntityTotal>>,
}

/// Headline numbers and breakdowns for a run
///
/// Computed over every violation row, before report de-duplication.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    pub violations: usize,
    pub unique_claims: usize,
    pub rules_triggered: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique_providers: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique_members: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique_states: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_paid: Option<f64>,
    pub rule_breakdown: Vec<RuleCount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub members: Option<EntityAnalysis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub providers: Option<EntityAnalysis>,
}

impl Statistics {
    /// Calculate statistics, keeping `top_n` entries per entity ranking
    pub fn calculate(violations: &ViolationTable, top_n: usize) -> Self {
        let schema = violations.claim_schema();
        let has = |column: &str| schema.contains(column);
        let has_paid = has(PAID_AMOUNT);

        let unique = |column: &str| -> usize {
            violations
                .violations()
                .iter()
                .map(|v| cell(violations, v, column).key_part())
                .collect::<HashSet<KeyPart>>()
                .len()
        };

        let total_paid = has_paid.then(|| {
            violations
                .violations()
                .iter()
                .filter_map(|v| cell(violations, v, PAID_AMOUNT).as_f64())
                .sum::<f64>()
        });

        let rule_ids: HashSet<&RuleId> = violations.violations().iter().map(|v| &v.rule_id).collect();

        let stats = Self {
            violations: violations.len(),
            unique_claims: unique(CLAIM_ID),
            rules_triggered: rule_ids.len(),
            unique_providers: has(PROVIDER_NPI).then(|| unique(PROVIDER_NPI)),
            unique_members: has(MEMBER_ID).then(|| unique(MEMBER_ID)),
            unique_states: has(MEMBER_STATE).then(|| unique(MEMBER_STATE)),
            total_paid,
            rule_breakdown: rule_breakdown(violations),
            members: has(MEMBER_ID).then(|| analyse(violations, MEMBER_ID, has_paid, top_n)),
            providers: has(PROVIDER_NPI)
                .then(|| analyse(violations, PROVIDER_NPI, has_paid, top_n)),
        };

        debug!(
            violations = %stats.violations,
            unique_claims = %stats.unique_claims,
            rules_triggered = %stats.rules_triggered,
            "Calculated statistics"
        );

        stats
    }
}

fn cell(table: &ViolationTable, violation: &Violation, column: &str) -> Value {
    table.value(violation, column).unwrap_or(Value::Null)
}

fn rule_breakdown(violations: &ViolationTable) -> Vec<RuleCount> {
    let mut counts: BTreeMap<(RuleId, String), usize> = BTreeMap::new();
    for v in violations.violations() {
        *counts
            .entry((v.rule_id.clone(), v.rule_desc.clone()))
            .or_default() += 1;
    }

    counts
        .into_iter()
        .map(|((rule_id, rule_desc), count)| RuleCount {
            rule_id,
            rule_desc,
            count,
        })
        .collect()
}

/// Group by an entity column, then rank by count and by paid total
fn analyse(violations: &ViolationTable, column: &str, has_paid: bool, top_n: usize) -> EntityAnalysis {
    let mut groups: BTreeMap<KeyPart, EntityTotal> = BTreeMap::new();

    for v in violations.violations() {
        let id = cell(violations, v, column);
        let paid = has_paid.then(|| cell(violations, v, PAID_AMOUNT).as_f64().unwrap_or(0.0));

        let entry = groups.entry(id.key_part()).or_insert_with(|| EntityTotal {
            id: id.to_string(),
            violation_count: 0,
            paid_amount: has_paid.then_some(0.0),
        });
        entry.violation_count += 1;
        if let (Some(total), Some(paid)) = (entry.paid_amount.as_mut(), paid) {
            *total += paid;
        }
    }

    let mut by_count: Vec<EntityTotal> = groups.into_values().collect();
    by_count.sort_by(|a, b| b.violation_count.cmp(&a.violation_count));

    let highest_paid = has_paid.then(|| {
        let mut by_paid = by_count.clone();
        by_paid.sort_by(|a, b| {
            b.paid_amount
                .unwrap_or(0.0)
                .total_cmp(&a.paid_amount.unwrap_or(0.0))
        });
        by_paid.truncate(top_n);
        by_paid
    });

    by_count.truncate(top_n);
    EntityAnalysis {
        most_violations: by_count,
        highest_paid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claimscan_core::ClaimTable;
    use claimscan_rules::{EngineConfig, Rule, RuleEngine};

    fn claim(id: &str, member: &str, provider: &str, state: &str, paid: f64) -> Vec<(&'static str, Value)> {
        vec![
            ("claim_id", Value::from(id)),
            ("member_id", Value::from(member)),
            ("provider_npi", Value::from(provider)),
            ("member_state", Value::from(state)),
            ("paid_amount", Value::from(paid)),
        ]
    }

    fn run() -> ViolationTable {
        let claims = ClaimTable::from_records(vec![
            claim("C1", "M1", "P1", "TX", 5000.0),
            claim("C2", "M1", "P2", "TX", 100.0),
            claim("C3", "M2", "P2", "CA", 150.0),
            claim("C4", "M2", "P2", "CA", 2500.0),
            claim("C5", "M3", "P3", "NY", 10.0),
        ]);
        let rules = vec![
            Rule::record(1, "High paid", "paid_amount > 2000"),
            Rule::dataset(2, "Provider repeat", "provider_npi = provider_npi"),
        ];
        RuleEngine::new(EngineConfig::default())
            .unwrap()
            .apply_rules(&rules, claims)
    }

    #[test]
    fn test_headline_numbers() {
        let stats = Statistics::calculate(&run(), 10);

        assert_eq!(stats.violations, 4);
        assert_eq!(stats.unique_claims, 4);
        assert_eq!(stats.rules_triggered, 2);
        assert_eq!(stats.unique_providers, Some(2));
        assert_eq!(stats.unique_members, Some(2));
        assert_eq!(stats.unique_states, Some(2));
        assert_eq!(stats.total_paid, Some(7750.0));
        assert_eq!(
            stats.rule_breakdown,
            vec![
                RuleCount { rule_id: RuleId::from(1), rule_desc: "High paid".into(), count: 2 },
                RuleCount { rule_id: RuleId::from(2), rule_desc: "Provider repeat".into(), count: 2 },
            ]
        );
    }

    #[test]
    fn test_entity_rankings() {
        let stats = Statistics::calculate(&run(), 1);

        let members = stats.members.unwrap();
        assert_eq!(members.most_violations.len(), 1);
        assert_eq!(members.most_violations[0].id, "M1");
        assert_eq!(members.most_violations[0].violation_count, 2);

        let top_paid = members.highest_paid.unwrap();
        assert_eq!(top_paid[0].id, "M1");
        assert_eq!(top_paid[0].paid_amount, Some(5100.0));

        let providers = stats.providers.unwrap();
        assert_eq!(providers.most_violations[0].id, "P2");
        assert_eq!(providers.highest_paid.unwrap()[0].id, "P1");
    }

    #[test]
    fn test_empty_table() {
        let empty = ViolationTable::empty(std::sync::Arc::new(claimscan_core::Schema::new([
            "claim_id",
            "member_id",
        ])));
        let stats = Statistics::calculate(&empty, 10);
        assert_eq!(stats.violations, 0);
        assert_eq!(stats.unique_claims, 0);
        assert!(stats.rule_breakdown.is_empty());
        assert_eq!(stats.total_paid, None);
        assert!(stats.members.unwrap().most_violations.is_empty());
        assert_eq!(stats.unique_providers, None);
    }
}
