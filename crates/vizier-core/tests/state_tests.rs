use proptest::prelude::*;
use vizier_core::{allowed_transitions, validate_transition, PipelineSession, PipelineState};

fn any_state() -> impl Strategy<Value = PipelineState> {
    prop_oneof![
        Just(PipelineState::Mapping),
        Just(PipelineState::Interpreting),
        Just(PipelineState::Executing),
        Just(PipelineState::Validating),
        Just(PipelineState::Done),
        Just(PipelineState::Failed),
    ]
}

#[test]
fn test_mapping_transitions() {
    assert!(validate_transition(PipelineState::Mapping, PipelineState::Interpreting).is_ok());
    assert!(validate_transition(PipelineState::Mapping, PipelineState::Failed).is_ok());

    assert!(validate_transition(PipelineState::Mapping, PipelineState::Executing).is_err());
    assert!(validate_transition(PipelineState::Mapping, PipelineState::Done).is_err());
}

#[test]
fn test_validating_loops_back_to_interpreting() {
    assert!(validate_transition(PipelineState::Validating, PipelineState::Interpreting).is_ok());
    assert!(validate_transition(PipelineState::Validating, PipelineState::Done).is_ok());
    assert!(validate_transition(PipelineState::Validating, PipelineState::Executing).is_err());
}

#[test]
fn test_terminal_states_are_final() {
    assert!(allowed_transitions(PipelineState::Done).is_empty());
    assert!(allowed_transitions(PipelineState::Failed).is_empty());
}

proptest! {
    #[test]
    fn prop_all_transitions_are_subset_of_allowed(from in any_state(), to in any_state()) {
        let res = validate_transition(from, to);
        let allowed = allowed_transitions(from);

        if res.is_ok() {
            prop_assert!(allowed.contains(&to));
        } else {
            prop_assert!(!allowed.contains(&to));
        }
    }

    #[test]
    fn prop_session_walk_ends_in_failed_at_most_once(steps in prop::collection::vec(any_state(), 0..40)) {
        let mut session = PipelineSession::new();
        for to in steps {
            let before = session.history().len();
            if session.advance(to).is_err() {
                prop_assert_eq!(session.history().len(), before);
            }
        }

        let failed = session.history().iter().filter(|s| **s == PipelineState::Failed).count();
        prop_assert!(failed <= 1);
        if failed == 1 {
            prop_assert_eq!(session.state(), PipelineState::Failed);
        }
    }
}
