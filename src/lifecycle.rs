//! Conversation and action state machines
//!
//! Pure transition functions: given a current status and an event they
//! return the next status or reject. No I/O; the store applies the
//! result with a compare-and-swap update, so a transition computed
//! from a stale view simply loses the race.

pub mod action;
pub mod conversation;

#[cfg(test)]
mod proptests;

pub use action::ActionEvent;
pub use conversation::ConversationEvent;

use thiserror::Error;

/// Errors produced by a rejected transition
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("no transition from {from} on {event}")]
    Invalid { from: String, event: String },
}

impl TransitionError {
    pub fn invalid(from: impl ToString, event: impl ToString) -> Self {
        TransitionError::Invalid {
            from: from.to_string(),
            event: event.to_string(),
        }
    }
}
