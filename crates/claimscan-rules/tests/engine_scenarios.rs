//! End-to-end rule application scenarios

use claimscan_core::{ClaimTable, RuleId, Schema, Value, ViolationTable};
use claimscan_rules::{EngineConfig, Rule, RuleEngine};

fn engine() -> RuleEngine {
    RuleEngine::new(EngineConfig::default()).expect("Failed to create rule engine")
}

fn claim(id: &str, member: &str, from: &str, paid: f64) -> Vec<(&'static str, Value)> {
    vec![
        ("claim_id", Value::from(id)),
        ("member_id", Value::from(member)),
        ("provider_npi", Value::from("1234567890")),
        ("procedure_cd", Value::from("99213")),
        ("claim_service_from", Value::Date(from.parse().expect("valid date"))),
        ("paid_amount", Value::from(paid)),
    ]
}

/// `(claim_id, rule_id)` pairs in output order
fn attributions(result: &ViolationTable) -> Vec<(String, RuleId)> {
    result
        .violations()
        .iter()
        .map(|v| {
            let claim_id = result
                .value(v, "claim_id")
                .map(|c| c.to_string())
                .unwrap_or_default();
            (claim_id, v.rule_id.clone())
        })
        .collect()
}

fn ids(result: &ViolationTable) -> Vec<String> {
    attributions(result).into_iter().map(|(id, _)| id).collect()
}

#[test]
fn test_record_rule_scenario() {
    let claims = ClaimTable::from_records(vec![
        vec![("id", Value::from(1)), ("paid_amount", Value::from(1500))],
        vec![("id", Value::from(2)), ("paid_amount", Value::from(500))],
    ]);
    let rules = vec![Rule::record(1, "High paid amount", "paid_amount > 1000")];

    let result = engine().apply_rules(&rules, claims);

    assert_eq!(result.len(), 1);
    let violation = &result.violations()[0];
    assert_eq!(result.value(violation, "id"), Some(Value::from(1)));
    assert_eq!(result.value(violation, "rule_id"), Some(Value::from(1)));
    assert_eq!(
        result.value(violation, "rule_desc"),
        Some(Value::from("High paid amount"))
    );
}

#[test]
fn test_dataset_close_pair_scenario() {
    let claims = ClaimTable::from_records(vec![
        claim("C1", "M1", "2024-03-01", 100.0),
        claim("C2", "M1", "2024-03-02", 100.0),
        claim("C3", "M1", "2024-03-12", 100.0),
    ]);
    let rules = vec![Rule::dataset(
        1,
        "Repeat visit within 3 days",
        "member_id = member_id AND claim_service_from - claim_service_from < 3",
    )];

    let result = engine().apply_rules(&rules, claims);
    assert_eq!(ids(&result), vec!["C1", "C2"]);
}

#[test]
fn test_earlier_rule_claims_row_first() {
    let claims = ClaimTable::from_records(vec![
        claim("C1", "M1", "2024-03-01", 5000.0),
        claim("C2", "M1", "2024-03-01", 200.0),
        claim("C3", "M1", "2024-03-02", 300.0),
    ]);
    let rules = vec![
        Rule::dataset(
            2,
            "Same member, same procedure",
            "member_id = member_id AND procedure_cd = procedure_cd",
        ),
        Rule::record(1, "High paid amount", "paid_amount > 1000"),
    ];

    let result = engine().apply_rules(&rules, claims);
    assert_eq!(
        attributions(&result),
        vec![
            ("C1".to_string(), RuleId::from(1)),
            ("C2".to_string(), RuleId::from(2)),
            ("C3".to_string(), RuleId::from(2)),
        ]
    );
}

#[test]
fn test_broader_rule_wins_overlap() {
    let claims = ClaimTable::from_records(vec![
        claim("C1", "M1", "2024-03-01", 1500.0),
        claim("C2", "M2", "2024-03-01", 2500.0),
        claim("C3", "M3", "2024-03-01", 800.0),
    ]);
    let rules = vec![
        Rule::record(20, "Very high paid", "paid_amount > 2000"),
        Rule::record(10, "High paid", "paid_amount > 1000"),
    ];

    let result = engine().apply_rules(&rules, claims);
    assert_eq!(
        attributions(&result),
        vec![
            ("C1".to_string(), RuleId::from(10)),
            ("C2".to_string(), RuleId::from(10)),
        ]
    );
}

#[test]
fn test_single_row_group_never_matches() {
    let claims = ClaimTable::from_records(vec![
        claim("C1", "M1", "2024-03-01", 100.0),
        claim("C2", "M2", "2024-03-01", 100.0),
    ]);
    let rules = vec![Rule::dataset(1, "Duplicate member", "member_id = member_id")];

    assert!(engine().apply_rules(&rules, claims).is_empty());
}

#[test]
fn test_date_distance_polarity() {
    let claims = || {
        ClaimTable::from_records(vec![
            claim("X", "M1", "2024-05-01", 100.0),
            claim("Y", "M1", "2024-05-11", 100.0),
        ])
    };

    let narrow = vec![Rule::dataset(
        1,
        "Within 5 days",
        "member_id = member_id AND claim_service_from - claim_service_from < 5",
    )];
    assert!(engine().apply_rules(&narrow, claims()).is_empty());

    let wide = vec![Rule::dataset(
        1,
        "Within 15 days",
        "member_id = member_id AND claim_service_from - claim_service_from < 15",
    )];
    assert_eq!(ids(&engine().apply_rules(&wide, claims())), vec!["X", "Y"]);
}

#[test]
fn test_empty_inputs_keep_schema() {
    let schema = Schema::new(["claim_id", "member_id", "paid_amount"]);
    let rules = vec![Rule::record(1, "High paid amount", "paid_amount > 1000")];

    let result = engine().apply_rules(&rules, ClaimTable::empty(schema));
    assert!(result.is_empty());
    assert_eq!(
        result.columns(),
        vec!["claim_id", "member_id", "paid_amount", "rule_id", "rule_desc"]
    );

    let claims = ClaimTable::from_records(vec![claim("C1", "M1", "2024-03-01", 5000.0)]);
    let result = engine().apply_rules(&[], claims);
    assert!(result.is_empty());
    assert_eq!(result.columns().len(), 8);
}

#[test]
fn test_failing_rules_do_not_stop_the_run() {
    let claims = ClaimTable::from_records(vec![
        claim("C1", "M1", "2024-03-01", 5000.0),
        claim("C2", "M2", "2024-03-01", 50.0),
    ]);
    let rules = vec![
        Rule::record(1, "Unparseable", "paid_amount >"),
        Rule::new(
            2,
            "Unknown level",
            claimscan_rules::RuleLevel::Other("Claim".into()),
            "paid_amount > 0",
        ),
        Rule::dataset(3, "No grouping", "paid_amount > 0"),
        Rule::record(4, "Arithmetic in record rule", "paid_amount - paid_amount > 1"),
        Rule::record(5, "High paid", "paid_amount > 1000"),
    ];

    let result = engine().apply_rules(&rules, claims);
    assert_eq!(
        attributions(&result),
        vec![("C1".to_string(), RuleId::from(5))]
    );
}

#[test]
fn test_identical_rows_leave_the_pool_together() {
    let claims = ClaimTable::from_records(vec![
        claim("C1", "M1", "2024-03-01", 1500.0),
        claim("C1", "M1", "2024-03-01", 1500.0),
        claim("C2", "M1", "2024-03-01", 1500.0),
    ]);
    let rules = vec![
        Rule::record(1, "Claim C1", "claim_id = 'C1'"),
        Rule::record(2, "High paid", "paid_amount > 1000"),
    ];

    let result = engine().apply_rules(&rules, claims);
    assert_eq!(
        attributions(&result),
        vec![
            ("C1".to_string(), RuleId::from(1)),
            ("C1".to_string(), RuleId::from(1)),
            ("C2".to_string(), RuleId::from(2)),
        ]
    );
}

#[test]
fn test_rules_loaded_from_yaml() {
    let yaml = r#"
- Rule_ID: 2
  Rule_Desc: Duplicate procedure for member
  Level: DataSet
  Rule_Allegation: member_id = member_id AND procedure_cd = procedure_cd
- Rule_ID: 1
  Rule_Desc: Very high paid amount
  Level: Record
  Rule_Allegation: paid_amount >= 10000
"#;
    let rules = claimscan_rules::RuleSet::from_yaml(yaml).expect("valid rules");
    let claims = ClaimTable::from_records(vec![
        claim("C1", "M1", "2024-03-01", 12000.0),
        claim("C2", "M1", "2024-03-05", 90.0),
        claim("C3", "M1", "2024-03-09", 90.0),
    ]);

    let result = engine().apply_rules(rules.rules(), claims);
    assert_eq!(ids(&result), vec!["C1", "C2", "C3"]);
    assert_eq!(result.violations()[1].rule_desc, "Duplicate procedure for member");
}

#[test]
fn test_backtick_field_with_equals_sign() {
    let claims = ClaimTable::from_records(vec![
        vec![("claim_id", Value::from("C1")), ("a=b", Value::from(1))],
        vec![("claim_id", Value::from("C2")), ("a=b", Value::from(2))],
    ]);
    let rules = vec![Rule::record(1, "Odd column", "`a=b` = 1")];

    let result = engine().apply_rules(&rules, claims);
    assert_eq!(ids(&result), vec!["C1"]);
}
