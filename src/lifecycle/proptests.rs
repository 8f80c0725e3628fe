//! Property-based tests for the state machines
//!
//! These verify the monotonicity invariants hold across all possible
//! event sequences.

use super::{action, conversation, ActionEvent, ConversationEvent};
use crate::store::{ActionStatus, ConversationStatus};
use proptest::prelude::*;

fn arb_conversation_status() -> impl Strategy<Value = ConversationStatus> {
    prop_oneof![
        Just(ConversationStatus::Active),
        Just(ConversationStatus::WaitingApproval),
        Just(ConversationStatus::Resolved),
        Just(ConversationStatus::Escalated),
        Just(ConversationStatus::Closed),
    ]
}

fn arb_conversation_event() -> impl Strategy<Value = ConversationEvent> {
    prop_oneof![
        Just(ConversationEvent::SummaryDrafted),
        Just(ConversationEvent::SummaryRejected),
        Just(ConversationEvent::AnswerDelivered),
        Just(ConversationEvent::Escalate),
        Just(ConversationEvent::Resolve),
        Just(ConversationEvent::Close),
    ]
}

fn arb_action_status() -> impl Strategy<Value = ActionStatus> {
    prop_oneof![
        Just(ActionStatus::PendingApproval),
        Just(ActionStatus::Approved),
        Just(ActionStatus::Rejected),
        Just(ActionStatus::Running),
        Just(ActionStatus::Completed),
        Just(ActionStatus::Failed),
        Just(ActionStatus::Cancelled),
    ]
}

fn arb_action_event() -> impl Strategy<Value = ActionEvent> {
    prop_oneof![
        Just(ActionEvent::Approve),
        Just(ActionEvent::Reject),
        Just(ActionEvent::Start),
        Just(ActionEvent::Complete),
        Just(ActionEvent::Fail),
        Just(ActionEvent::Cancel),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    // A terminal conversation status never transitions again
    #[test]
    fn prop_closed_conversation_absorbs_all_events(event in arb_conversation_event()) {
        prop_assert!(conversation::transition(ConversationStatus::Closed, event).is_err());
    }

    // A terminal action status never transitions again
    #[test]
    fn prop_terminal_action_absorbs_all_events(
        status in arb_action_status().prop_filter("terminal only", |s| s.is_terminal()),
        event in arb_action_event(),
    ) {
        prop_assert!(action::transition(status, event).is_err());
    }

    // No event sequence ever leaves Closed once reached
    #[test]
    fn prop_conversation_never_leaves_closed(
        events in proptest::collection::vec(arb_conversation_event(), 0..20)
    ) {
        let mut status = ConversationStatus::Active;
        let mut was_closed = false;
        for event in events {
            if let Ok(next) = conversation::transition(status, event) {
                status = next;
            }
            if was_closed {
                prop_assert_eq!(status, ConversationStatus::Closed);
            }
            was_closed = status == ConversationStatus::Closed;
        }
    }

    // Action runs reach at most one terminal status, monotonically
    #[test]
    fn prop_action_terminal_is_final(
        events in proptest::collection::vec(arb_action_event(), 0..20)
    ) {
        let mut status = ActionStatus::PendingApproval;
        let mut terminal: Option<ActionStatus> = None;
        for event in events {
            if let Ok(next) = action::transition(status, event) {
                status = next;
            }
            if let Some(first) = terminal {
                prop_assert_eq!(status, first, "terminal status changed");
            } else if status.is_terminal() {
                terminal = Some(status);
            }
        }
    }

    // Every computed next-status is itself a transition-table row,
    // i.e. transition never invents a status outside the closed set
    #[test]
    fn prop_transitions_stay_in_closed_set(
        status in arb_conversation_status(),
        event in arb_conversation_event(),
    ) {
        if let Ok(next) = conversation::transition(status, event) {
            prop_assert!(ConversationStatus::from_code(next.as_code()).is_some());
        }
    }

    // Approve is only ever reachable from PendingApproval
    #[test]
    fn prop_approve_requires_pending(status in arb_action_status()) {
        let result = action::transition(status, ActionEvent::Approve);
        if status == ActionStatus::PendingApproval {
            prop_assert_eq!(result.unwrap(), ActionStatus::Approved);
        } else {
            prop_assert!(result.is_err());
        }
    }
}
