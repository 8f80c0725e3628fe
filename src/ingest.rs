//! Inbound event boundary
//!
//! Events arrive from the chat transport at-least-once and possibly
//! out of order; signature verification happened upstream. This module
//! validates, gates on channel policy, and dispatches to the services.
//! Nothing thrown below this layer escapes: any unanticipated error is
//! logged with context and converted to a generic failed outcome, so
//! one poisoned event never stalls other conversations.

use crate::audit::{AuditEntry, AuditKind};
use crate::error::CoreError;
use crate::service::{ActionService, ConversationService};
use serde::{Deserialize, Serialize};

/// Inbound events as normalized by the transport adapter
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    /// A message posted in a channel or thread
    Message {
        channel_id: String,
        user_id: String,
        /// Transport-unique message timestamp; the dedup key
        ts: String,
        /// Thread root; absent for a thread-opening message
        #[serde(default)]
        thread_ts: Option<String>,
        #[serde(default)]
        text: String,
        #[serde(default)]
        file_urls: Vec<String>,
        #[serde(default)]
        ocr_text: Option<String>,
        #[serde(default)]
        is_bot_response: bool,
    },
    /// A reaction added to a message
    ReactionAdded {
        channel_id: String,
        user_id: String,
        reaction: String,
        message_ts: String,
    },
    /// An interactive confirmation (button/modal) from the transport
    Interactive {
        channel_id: String,
        user_id: String,
        thread_ts: String,
        action: InteractiveAction,
    },
}

/// The interactive surface exposed to requesters and approvers
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum InteractiveAction {
    ApproveSummary,
    RejectSummary {
        #[serde(default)]
        edited_summary: Option<String>,
    },
    ApproveAction {
        action_id: String,
    },
    RejectAction {
        action_id: String,
    },
    Resolve,
    Escalate {
        #[serde(default = "default_escalation_reason")]
        reason: String,
    },
    Close,
}

fn default_escalation_reason() -> String {
    "manual".to_string()
}

/// Outcome of handling one event
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IngestOutcome {
    Accepted {
        #[serde(skip_serializing_if = "Option::is_none")]
        conversation_id: Option<String>,
    },
    Ignored {
        reason: String,
    },
    Failed {
        error: String,
    },
}

impl IngestOutcome {
    fn accepted(conversation_id: impl Into<String>) -> Self {
        IngestOutcome::Accepted {
            conversation_id: Some(conversation_id.into()),
        }
    }

    fn ignored(reason: impl Into<String>) -> Self {
        IngestOutcome::Ignored {
            reason: reason.into(),
        }
    }
}

/// Dispatches validated events to the services
#[derive(Clone)]
pub struct EventRouter {
    conversations: ConversationService,
    actions: ActionService,
}

impl EventRouter {
    pub fn new(conversations: ConversationService, actions: ActionService) -> Self {
        Self {
            conversations,
            actions,
        }
    }

    pub fn conversations(&self) -> &ConversationService {
        &self.conversations
    }

    pub fn actions(&self) -> &ActionService {
        &self.actions
    }

    /// Handle one inbound event. Never returns an error: the outcome
    /// carries what the caller may show, and everything else goes to
    /// the process log.
    pub async fn handle(&self, event: InboundEvent) -> IngestOutcome {
        match self.dispatch(event).await {
            Ok(outcome) => outcome,
            Err(CoreError::Validation(reason)) => {
                tracing::warn!(reason = %reason, "Dropped invalid event");
                IngestOutcome::ignored(reason)
            }
            Err(CoreError::NotFound(what)) => IngestOutcome::Failed {
                error: format!("not found: {what}"),
            },
            Err(CoreError::Unauthorized(_)) => IngestOutcome::Failed {
                error: "unauthorized".to_string(),
            },
            Err(CoreError::Transition(e)) => IngestOutcome::Failed {
                error: e.to_string(),
            },
            Err(e) => {
                tracing::error!(error = %e, "Event handling failed");
                IngestOutcome::Failed {
                    error: "internal error".to_string(),
                }
            }
        }
    }

    async fn dispatch(&self, event: InboundEvent) -> Result<IngestOutcome, CoreError> {
        match event {
            InboundEvent::Message {
                channel_id,
                user_id,
                ts,
                thread_ts,
                text,
                file_urls,
                ocr_text,
                is_bot_response,
            } => {
                validate_ids(&[("channel_id", &channel_id), ("user_id", &user_id), ("ts", &ts)])?;

                if !self.channels_enabled(&channel_id) {
                    tracing::debug!(channel_id = %channel_id, "Channel not enabled");
                    return Ok(IngestOutcome::ignored("channel not enabled"));
                }

                // A message without a thread root opens its own thread
                let thread_ts = thread_ts.unwrap_or_else(|| ts.clone());

                let (conversation, message) = self.conversations.ingest_message(
                    &channel_id,
                    &thread_ts,
                    &ts,
                    &user_id,
                    &text,
                    &file_urls,
                    ocr_text.as_deref(),
                    is_bot_response,
                )?;

                self.conversations.audit().record(
                    AuditKind::MessageReceived,
                    AuditEntry::new()
                        .actor(user_id)
                        .channel(channel_id)
                        .thread(thread_ts)
                        .result("ok"),
                );

                // First message of a fresh conversation gets classified
                if !message.is_bot_response && conversation.question_type.is_none() {
                    self.conversations.classify(&conversation.id, &text).await?;
                }

                Ok(IngestOutcome::accepted(conversation.id))
            }

            InboundEvent::ReactionAdded {
                channel_id,
                user_id,
                reaction,
                message_ts,
            } => {
                validate_ids(&[
                    ("channel_id", &channel_id),
                    ("user_id", &user_id),
                    ("message_ts", &message_ts),
                ])?;

                if !self.channels_enabled(&channel_id) {
                    return Ok(IngestOutcome::ignored("channel not enabled"));
                }

                match self
                    .conversations
                    .record_reaction(&message_ts, &user_id, &reaction)?
                {
                    Some(feedback) => Ok(IngestOutcome::accepted(feedback.conversation_id)),
                    None => Ok(IngestOutcome::ignored("reaction not mapped to feedback")),
                }
            }

            InboundEvent::Interactive {
                channel_id,
                user_id,
                thread_ts,
                action,
            } => {
                validate_ids(&[
                    ("channel_id", &channel_id),
                    ("user_id", &user_id),
                    ("thread_ts", &thread_ts),
                ])?;

                if !self.channels_enabled(&channel_id) {
                    return Ok(IngestOutcome::ignored("channel not enabled"));
                }

                let conversation = self
                    .conversations
                    .store()
                    .find_conversation_by_thread(&thread_ts)?
                    .ok_or_else(|| CoreError::NotFound(format!("thread {thread_ts}")))?;

                match action {
                    InteractiveAction::ApproveSummary => {
                        self.conversations.approve_summary(&conversation.id, &user_id)?;
                        // Answer generation is best-effort; a retrieval
                        // failure leaves the conversation untouched and
                        // the transport free to retry.
                        if let Err(e) = self.conversations.generate_answer(&conversation.id).await {
                            tracing::warn!(
                                conversation_id = %conversation.id,
                                error = %e,
                                "Answer generation after summary approval failed"
                            );
                        }
                    }
                    InteractiveAction::RejectSummary { edited_summary } => {
                        self.conversations.reject_summary(
                            &conversation.id,
                            &user_id,
                            edited_summary.as_deref(),
                        )?;
                    }
                    InteractiveAction::ApproveAction { action_id } => {
                        self.actions.approve(&action_id, &user_id)?;
                    }
                    InteractiveAction::RejectAction { action_id } => {
                        self.actions.reject(&action_id, &user_id)?;
                    }
                    InteractiveAction::Resolve => {
                        self.conversations.resolve(&conversation.id, Some(&user_id)).await?;
                    }
                    InteractiveAction::Escalate { reason } => {
                        self.conversations
                            .escalate(&conversation.id, Some(&user_id), &reason)
                            .await?;
                    }
                    InteractiveAction::Close => {
                        self.conversations.close(&conversation.id, Some(&user_id))?;
                    }
                }

                Ok(IngestOutcome::accepted(conversation.id))
            }
        }
    }

    fn channels_enabled(&self, channel_id: &str) -> bool {
        // Both services share the same policy store; ask through the
        // conversation service's store of record.
        self.conversations.channels().is_enabled(channel_id)
    }
}

fn validate_ids(fields: &[(&str, &str)]) -> Result<(), CoreError> {
    for (name, value) in fields {
        if value.trim().is_empty() {
            return Err(CoreError::Validation(format!("missing {name}")));
        }
    }
    Ok(())
}
