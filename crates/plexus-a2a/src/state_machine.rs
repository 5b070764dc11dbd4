//! Task lifecycle state machine (spec §4.7 "Lifecycle", §8 invariant 4).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskState {
    Submitted,
    Working,
    InputRequired,
    AuthRequired,
    Completed,
    Failed,
    Canceled,
    Rejected,
}

impl TaskState {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Submitted => "submitted",
            TaskState::Working => "working",
            TaskState::InputRequired => "input-required",
            TaskState::AuthRequired => "auth-required",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
            TaskState::Canceled => "canceled",
            TaskState::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "submitted" => TaskState::Submitted,
            "working" => TaskState::Working,
            "input-required" => TaskState::InputRequired,
            "auth-required" => TaskState::AuthRequired,
            "completed" => TaskState::Completed,
            "failed" => TaskState::Failed,
            "canceled" => TaskState::Canceled,
            "rejected" => TaskState::Rejected,
            _ => return None,
        })
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Canceled | TaskState::Rejected
        )
    }
}

/// Validates one edge of the lifecycle graph in spec §4.7:
///
/// ```text
/// submitted -> working -> completed | failed | canceled
/// submitted -> working -> input-required | auth-required -> working | canceled
/// submitted -> input-required | auth-required (same as above)
/// submitted -> completed | failed | canceled | rejected (directly)
/// terminal states have no outgoing edges
/// ```
pub fn is_valid_transition(from: TaskState, to: TaskState) -> bool {
    if from.is_terminal() {
        return false;
    }
    use TaskState::*;
    match from {
        Submitted => matches!(
            to,
            Working | InputRequired | AuthRequired | Completed | Failed | Canceled | Rejected
        ),
        Working => matches!(
            to,
            InputRequired | AuthRequired | Completed | Failed | Canceled
        ),
        InputRequired | AuthRequired => matches!(to, Working | Canceled),
        Completed | Failed | Canceled | Rejected => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submitted_can_go_straight_to_every_terminal_state() {
        for terminal in [
            TaskState::Completed,
            TaskState::Failed,
            TaskState::Canceled,
            TaskState::Rejected,
        ] {
            assert!(is_valid_transition(TaskState::Submitted, terminal));
        }
    }

    #[test]
    fn terminal_states_have_no_outgoing_edges() {
        for terminal in [
            TaskState::Completed,
            TaskState::Failed,
            TaskState::Canceled,
            TaskState::Rejected,
        ] {
            for to in [TaskState::Working, TaskState::Submitted, TaskState::InputRequired] {
                assert!(!is_valid_transition(terminal, to));
            }
        }
    }

    #[test]
    fn input_required_can_only_resume_or_cancel() {
        assert!(is_valid_transition(TaskState::InputRequired, TaskState::Working));
        assert!(is_valid_transition(TaskState::InputRequired, TaskState::Canceled));
        assert!(!is_valid_transition(TaskState::InputRequired, TaskState::Completed));
    }

    #[test]
    fn round_trips_through_as_str_and_parse() {
        for state in [
            TaskState::Submitted,
            TaskState::Working,
            TaskState::InputRequired,
            TaskState::AuthRequired,
            TaskState::Completed,
            TaskState::Failed,
            TaskState::Canceled,
            TaskState::Rejected,
        ] {
            assert_eq!(TaskState::parse(state.as_str()), Some(state));
        }
    }
}
