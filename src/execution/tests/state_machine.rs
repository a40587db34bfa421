use crate::execution::{ExecutionState, can_transition};

#[test]
fn happy_path_transitions_are_allowed() {
    let path = [
        (ExecutionState::Validating, ExecutionState::Assembling),
        (ExecutionState::Assembling, ExecutionState::Dispatching),
        (ExecutionState::Dispatching, ExecutionState::Succeeded),
    ];
    for (from, to) in path {
        assert!(
            can_transition(from, to),
            "expected transition {:?} -> {:?} to be allowed",
            from,
            to
        );
    }
}

#[test]
fn every_active_state_may_fail() {
    let active = [
        ExecutionState::Validating,
        ExecutionState::Assembling,
        ExecutionState::Dispatching,
    ];
    for from in active {
        assert!(
            can_transition(from, ExecutionState::Failed),
            "expected failure from {:?}",
            from
        );
    }
}

#[test]
fn terminal_states_admit_nothing() {
    for terminal in [ExecutionState::Succeeded, ExecutionState::Failed] {
        assert!(terminal.is_terminal());
        for to in [
            ExecutionState::Validating,
            ExecutionState::Assembling,
            ExecutionState::Dispatching,
        ] {
            assert!(!can_transition(terminal, to));
        }
    }
}

#[test]
fn dispatch_cannot_be_skipped() {
    assert!(!can_transition(
        ExecutionState::Validating,
        ExecutionState::Dispatching
    ));
    assert!(!can_transition(
        ExecutionState::Assembling,
        ExecutionState::Succeeded
    ));
}
