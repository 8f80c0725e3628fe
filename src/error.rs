//! Error taxonomy for the core
//!
//! Each variant maps to one handling policy at the event boundary:
//! validation failures drop the event, not-found and invalid
//! transitions are reported without mutation, unauthorized attempts
//! are audited, external failures get a fallback outcome, and
//! uniqueness conflicts never surface here at all (the store resolves
//! them by re-fetch).

use crate::lifecycle::TransitionError;
use crate::store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("external service error: {0}")]
    ExternalService(String),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ConversationNotFound(id) => CoreError::NotFound(format!("conversation {id}")),
            StoreError::ActionNotFound(id) => CoreError::NotFound(format!("action run {id}")),
            other => CoreError::Store(other),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
