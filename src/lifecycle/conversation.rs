//! Conversation status transitions

use super::TransitionError;
use crate::store::ConversationStatus;
use std::fmt;

/// Events that move a conversation through its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationEvent {
    /// A summary was drafted and posted for confirmation
    SummaryDrafted,
    /// The requester rejected or edited the drafted summary
    SummaryRejected,
    /// A final answer was delivered with no pending action
    AnswerDelivered,
    /// SLA breach or an explicit escalation request
    Escalate,
    /// An escalated conversation was worked to resolution
    Resolve,
    /// Conversation closed out
    Close,
}

impl fmt::Display for ConversationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConversationEvent::SummaryDrafted => "summary_drafted",
            ConversationEvent::SummaryRejected => "summary_rejected",
            ConversationEvent::AnswerDelivered => "answer_delivered",
            ConversationEvent::Escalate => "escalate",
            ConversationEvent::Resolve => "resolve",
            ConversationEvent::Close => "close",
        };
        f.write_str(name)
    }
}

/// Pure transition function.
///
/// Anything not in the table is rejected without mutation; concurrent
/// handlers racing on stale status views hit this path harmlessly.
pub fn transition(
    status: ConversationStatus,
    event: ConversationEvent,
) -> Result<ConversationStatus, TransitionError> {
    use ConversationEvent as E;
    use ConversationStatus as S;

    if status.is_terminal() {
        return Err(TransitionError::invalid(status, event));
    }

    match (status, event) {
        (S::Active, E::SummaryDrafted) => Ok(S::WaitingApproval),
        (S::WaitingApproval, E::SummaryRejected) => Ok(S::Active),

        (S::Active | S::WaitingApproval, E::AnswerDelivered) => Ok(S::Resolved),

        // Any non-terminal status may escalate
        (S::Active | S::WaitingApproval | S::Resolved | S::Escalated, E::Escalate) => {
            Ok(S::Escalated)
        }

        (S::Escalated, E::Resolve) => Ok(S::Resolved),
        (S::Escalated | S::Resolved, E::Close) => Ok(S::Closed),

        (from, event) => Err(TransitionError::invalid(from, event)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_confirmation_loop() {
        let s = transition(ConversationStatus::Active, ConversationEvent::SummaryDrafted).unwrap();
        assert_eq!(s, ConversationStatus::WaitingApproval);

        let s = transition(s, ConversationEvent::SummaryRejected).unwrap();
        assert_eq!(s, ConversationStatus::Active);
    }

    #[test]
    fn answer_resolves_from_active_or_waiting() {
        assert_eq!(
            transition(ConversationStatus::Active, ConversationEvent::AnswerDelivered).unwrap(),
            ConversationStatus::Resolved
        );
        assert_eq!(
            transition(
                ConversationStatus::WaitingApproval,
                ConversationEvent::AnswerDelivered
            )
            .unwrap(),
            ConversationStatus::Resolved
        );
    }

    #[test]
    fn any_non_terminal_escalates() {
        for status in [
            ConversationStatus::Active,
            ConversationStatus::WaitingApproval,
            ConversationStatus::Resolved,
            ConversationStatus::Escalated,
        ] {
            assert_eq!(
                transition(status, ConversationEvent::Escalate).unwrap(),
                ConversationStatus::Escalated
            );
        }
    }

    #[test]
    fn escalated_can_resolve_or_close() {
        assert_eq!(
            transition(ConversationStatus::Escalated, ConversationEvent::Resolve).unwrap(),
            ConversationStatus::Resolved
        );
        assert_eq!(
            transition(ConversationStatus::Escalated, ConversationEvent::Close).unwrap(),
            ConversationStatus::Closed
        );
    }

    #[test]
    fn closed_is_terminal() {
        for event in [
            ConversationEvent::SummaryDrafted,
            ConversationEvent::SummaryRejected,
            ConversationEvent::AnswerDelivered,
            ConversationEvent::Escalate,
            ConversationEvent::Resolve,
            ConversationEvent::Close,
        ] {
            assert!(transition(ConversationStatus::Closed, event).is_err());
        }
    }

    #[test]
    fn resolved_cannot_unresolve() {
        assert!(transition(
            ConversationStatus::Resolved,
            ConversationEvent::AnswerDelivered
        )
        .is_err());
        assert!(transition(
            ConversationStatus::Resolved,
            ConversationEvent::SummaryDrafted
        )
        .is_err());
    }
}
