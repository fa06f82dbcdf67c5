use pretty_assertions::assert_eq;
use ruleplay::{
    evaluation::{EvaluationOptions, EvaluationState},
    playground::PlaygroundState,
    rule::{Rule, RuleAction},
    summary::Report,
    validate, Validation,
};
use serde_json::json;

use super::setup_machine;

#[tokio::test]
async fn test_example_playground_validates_clean() {
    let machine = setup_machine(EvaluationOptions::default());
    let snapshot = PlaygroundState::example();

    let state = machine.evaluate(&snapshot).await.unwrap();
    let EvaluationState::Success { values, updates } = &state else {
        panic!("expected success, got {:?}", state);
    };
    assert_eq!(values.len(), snapshot.rules.len());
    assert_eq!(updates["PreviousListPrice"], json!(1200000));
    assert_eq!(updates["PendingTimestamp"], json!("2024-06-01T12:00:00.000Z"));

    let Validation::Complete(result) = validate(&snapshot, &state) else {
        panic!("expected a complete validation");
    };
    assert!(result.is_clean(), "{:?}", result);

    let report = Report::new(state.clone(), Validation::Complete(result));
    assert!(report.passed());
}

#[tokio::test]
async fn test_failing_rules_produce_field_messages() {
    let machine = setup_machine(EvaluationOptions::default());
    let mut snapshot = PlaygroundState::example();
    snapshot.set_data(
        json!({
            "ListPrice": 0,
            "MlsStatus": "Closed",
            "PublicRemarks": "Call 555-1234",
        })
        .to_string(),
    );

    let state = machine.evaluate(&snapshot).await.unwrap();
    let Validation::Complete(result) = validate(&snapshot, &state) else {
        panic!("expected a complete validation, got {:?}", state);
    };

    assert_eq!(result.messages_for("LastPrice").len(), 1);
    assert_eq!(
        result.messages_for("PublicRemarks")[0].text,
        "Public remarks must not contain a phone number"
    );
    assert_eq!(result.messages_for("ClosePrice").len(), 1);
    assert!(!result.is_clean());
}

#[tokio::test]
async fn test_today_uses_the_callers_offset() {
    let machine = setup_machine(EvaluationOptions::default());
    let mut snapshot = PlaygroundState::initial();
    snapshot.add_rule(Rule::new("Today", RuleAction::Evaluate, ".TODAY.", "today"));

    let state = machine.evaluate(&snapshot).await.unwrap();
    let Validation::Complete(result) = validate(&snapshot, &state) else {
        panic!("expected a complete validation");
    };
    assert_eq!(result.evaluations[0].outcome.to_string(), "\"2024-06-01\"");
}

#[tokio::test]
async fn test_invalid_data_is_a_json_parse_error() {
    let machine = setup_machine(EvaluationOptions::default());
    let mut snapshot = PlaygroundState::example();
    snapshot.set_previous_data("{");

    let state = machine.evaluate(&snapshot).await.unwrap();
    assert!(matches!(state, EvaluationState::JsonParseError { .. }));
    assert_eq!(validate(&snapshot, &state), Validation::Indeterminate);
}

#[tokio::test]
async fn test_strict_mode_reports_parse_errors() {
    let machine = setup_machine(EvaluationOptions { strict: true });
    let mut snapshot = PlaygroundState::initial();
    snapshot.add_rule(Rule::new("MlsStatus", RuleAction::Accept, "MlsStatus =", "x"));

    let state = machine.evaluate(&snapshot).await.unwrap();
    let EvaluationState::ExpressionParseError { error } = state else {
        panic!("expected a parse error, got {:?}", state);
    };
    assert!(error.starts_with("MlsStatus: "), "{}", error);
}

#[tokio::test]
async fn test_latest_snapshot_wins() {
    let machine = setup_machine(EvaluationOptions::default());

    let mut snapshot = PlaygroundState::initial();
    snapshot.add_rule(Rule::new("Price", RuleAction::Evaluate, "Price", "price"));
    for price in 0..20 {
        snapshot.set_data(json!({ "Price": price }).to_string());
        machine.update(&snapshot).unwrap();
    }
    assert_eq!(machine.generation(), 20);

    let state = machine.settled().await.unwrap();
    let Validation::Complete(result) = validate(&snapshot, &state) else {
        panic!("expected a complete validation");
    };
    assert_eq!(result.evaluations[0].outcome.to_string(), "19");
}
