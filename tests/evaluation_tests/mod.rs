use std::sync::Arc;

use chrono::{FixedOffset, TimeZone};
use ruleplay::{
    config::UnitConfig,
    evaluation::{
        clock::{Clock, MockClock},
        EvaluationOptions, EvaluationStateMachine, EvaluationUnit,
    },
    expression::BasicEngine,
};

pub mod end_to_end_test;

/// A clock pinned to 2024-06-01 14:00 at +02:00.
fn fixed_clock() -> Arc<dyn Clock> {
    let mut clock = MockClock::new();
    clock.expect_now().returning(|| {
        FixedOffset::east_opt(2 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 6, 1, 14, 0, 0)
            .unwrap()
    });
    Arc::new(clock)
}

fn setup_machine(options: EvaluationOptions) -> EvaluationStateMachine {
    let config = UnitConfig {
        thread_name: "test-unit".to_string(),
        ..UnitConfig::default()
    };
    let correlator = EvaluationUnit::with_options(BasicEngine, options).connect(&config);
    EvaluationStateMachine::new(Arc::new(correlator), fixed_clock())
}
