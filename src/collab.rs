//! External collaborator boundaries
//!
//! Every outbound dependency of the core sits behind one of these
//! traits. Adapters translate to the real services; failures surface
//! as explicit results so callers must handle the no-client and
//! failed-call branches. Nothing here throws across the boundary.

pub mod answer;
pub mod classifier;
pub mod executor;
pub mod notifier;
pub mod ticketing;

pub use answer::{Answer, AnswerService, HttpAnswerService};
pub use classifier::{Classifier, HttpClassifier, KeywordClassifier};
pub use executor::{ActionExecutor, ActionOutput, HttpActionExecutor};
pub use notifier::{EscalationNotifier, SmtpNotifier};
pub use ticketing::{RestTicketing, Ticketing};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CollabError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("smtp error: {0}")]
    Smtp(String),
    #[error("unexpected response: {0}")]
    BadResponse(String),
}

pub type CollabResult<T> = Result<T, CollabError>;
