//! Action run status transitions
//!
//! The approver-identity check is not encoded here; it is a
//! precondition the action service enforces before ever computing an
//! Approve transition. This table only knows which statuses connect.

use super::TransitionError;
use crate::store::ActionStatus;
use std::fmt;

/// Events that move an action run through its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionEvent {
    /// An authorized approver confirmed the run
    Approve,
    /// Explicit rejection
    Reject,
    /// Execution handed to the external executor
    Start,
    /// Executor returned success
    Complete,
    /// Executor returned failure
    Fail,
    /// Run abandoned before reaching a result
    Cancel,
}

impl fmt::Display for ActionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionEvent::Approve => "approve",
            ActionEvent::Reject => "reject",
            ActionEvent::Start => "start",
            ActionEvent::Complete => "complete",
            ActionEvent::Fail => "fail",
            ActionEvent::Cancel => "cancel",
        };
        f.write_str(name)
    }
}

/// Pure transition function. Terminal statuses absorb every event.
pub fn transition(
    status: ActionStatus,
    event: ActionEvent,
) -> Result<ActionStatus, TransitionError> {
    use ActionEvent as E;
    use ActionStatus as S;

    if status.is_terminal() {
        return Err(TransitionError::invalid(status, event));
    }

    match (status, event) {
        (S::PendingApproval, E::Approve) => Ok(S::Approved),
        (S::PendingApproval, E::Reject) => Ok(S::Rejected),
        (S::Approved, E::Start) => Ok(S::Running),
        (S::Running, E::Complete) => Ok(S::Completed),
        (S::Running, E::Fail) => Ok(S::Failed),
        (S::PendingApproval | S::Approved | S::Running, E::Cancel) => Ok(S::Cancelled),

        (from, event) => Err(TransitionError::invalid(from, event)),
    }
}
