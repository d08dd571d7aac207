//! Pure helpers for the task state machine.
//!
//! All legality checks on state transitions live here so the store, the
//! engine and the bindings agree on one edge graph.

use capstan_types::{TaskState, TaskStatus, TaskStatusUpdateEvent, STATUS_UPDATE_KIND};

/// Creates the `Submitted` status a task is born with, before the engine
/// accepts it for execution.
#[must_use]
pub fn submitted_status() -> TaskStatus {
    TaskStatus {
        state: TaskState::Submitted,
        message: None,
        progress: None,
        timestamp: now(),
    }
}

/// Creates a `TaskStatus` for the `Working` state, used both when a task
/// begins execution and when it resumes after new input.
#[must_use]
pub fn working_status() -> TaskStatus {
    TaskStatus {
        state: TaskState::Working,
        message: None,
        progress: None,
        timestamp: now(),
    }
}

/// Creates a terminal `Completed` status carrying the handler's summary line.
#[must_use]
pub fn completed_status(message: impl Into<String>) -> TaskStatus {
    TaskStatus {
        state: TaskState::Completed,
        message: Some(message.into()),
        progress: Some(100),
        timestamp: now(),
    }
}

/// Creates an `InputRequired` status carrying the handler's prompt.
#[must_use]
pub fn input_required_status(message: impl Into<String>) -> TaskStatus {
    TaskStatus {
        state: TaskState::InputRequired,
        message: Some(message.into()),
        progress: None,
        timestamp: now(),
    }
}

/// Creates a terminal `Failed` status.
#[must_use]
pub fn failed_status(message: impl Into<String>) -> TaskStatus {
    TaskStatus {
        state: TaskState::Failed,
        message: Some(message.into()),
        progress: None,
        timestamp: now(),
    }
}

/// Creates a terminal `Canceled` status.
#[must_use]
pub fn canceled_status(message: impl Into<String>) -> TaskStatus {
    TaskStatus {
        state: TaskState::Canceled,
        message: Some(message.into()),
        progress: None,
        timestamp: now(),
    }
}

/// Whether a state permits no further transitions.
#[must_use]
pub const fn is_terminal(state: TaskState) -> bool {
    matches!(
        state,
        TaskState::Completed | TaskState::Failed | TaskState::Canceled
    )
}

/// Whether a task in this state can accept additional input. Only
/// `input-required` tasks continue; a task that is `working` already has an
/// execution in flight and must not be re-entered.
#[must_use]
pub const fn can_continue(state: TaskState) -> bool {
    matches!(state, TaskState::InputRequired)
}

/// Whether `from -> to` is a legal edge of the state machine.
#[must_use]
pub const fn can_transition(from: TaskState, to: TaskState) -> bool {
    use TaskState::{Canceled, Completed, Failed, InputRequired, Submitted, Working};
    match from {
        Submitted => matches!(to, Working | Canceled | Failed),
        Working => matches!(to, Completed | Failed | Canceled | InputRequired),
        InputRequired => matches!(to, Working | Canceled | Failed),
        Completed | Failed | Canceled => false,
    }
}

/// Builds the status event published on a transition. `is_final` is set for
/// terminal states and for `input-required`, after which the current event
/// stream ends until the task is continued.
#[must_use]
pub fn status_update_event(task_id: &str, status: TaskStatus) -> TaskStatusUpdateEvent {
    let is_final = is_terminal(status.state) || status.state == TaskState::InputRequired;
    TaskStatusUpdateEvent {
        kind: STATUS_UPDATE_KIND.to_string(),
        task_id: task_id.to_string(),
        status,
        is_final,
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_working_status() {
        let status = working_status();
        assert_eq!(status.state, TaskState::Working);
        assert!(status.message.is_none());
        assert!(!status.timestamp.is_empty());
    }

    #[test]
    fn test_is_terminal() {
        assert!(is_terminal(TaskState::Completed));
        assert!(is_terminal(TaskState::Failed));
        assert!(is_terminal(TaskState::Canceled));

        assert!(!is_terminal(TaskState::Submitted));
        assert!(!is_terminal(TaskState::Working));
        assert!(!is_terminal(TaskState::InputRequired));
    }

    #[test]
    fn test_can_continue() {
        assert!(can_continue(TaskState::InputRequired));

        assert!(!can_continue(TaskState::Submitted));
        assert!(!can_continue(TaskState::Working));
        assert!(!can_continue(TaskState::Completed));
        assert!(!can_continue(TaskState::Failed));
        assert!(!can_continue(TaskState::Canceled));
    }

    #[test]
    fn test_no_edges_out_of_terminal_states() {
        for from in [TaskState::Completed, TaskState::Failed, TaskState::Canceled] {
            for to in [
                TaskState::Submitted,
                TaskState::Working,
                TaskState::InputRequired,
                TaskState::Completed,
                TaskState::Canceled,
                TaskState::Failed,
            ] {
                assert!(!can_transition(from, to), "{from:?} -> {to:?} must be illegal");
            }
        }
    }

    #[test]
    fn test_continue_edge() {
        assert!(can_transition(TaskState::InputRequired, TaskState::Working));
        assert!(!can_transition(TaskState::Working, TaskState::Working));
    }

    #[test]
    fn test_status_update_event_finality() {
        let event = status_update_event("t1", working_status());
        assert!(!event.is_final);
        assert_eq!(event.kind, STATUS_UPDATE_KIND);

        let event = status_update_event("t1", completed_status("done"));
        assert!(event.is_final);

        let event = status_update_event("t1", input_required_status("need budget"));
        assert!(event.is_final);
    }
}
