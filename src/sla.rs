//! SLA deadline evaluation
//!
//! The predicates are pure functions over a conversation and the
//! current clock. The periodic sweep is driven by a scheduler task
//! spawned at startup, never by the ingestion path. Deadlines are
//! fixed at conversation creation and never auto-extend.

use crate::service::conversations::ConversationService;
use crate::store::{Conversation, Store, StoreError};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// True when no reply was recorded before the first-response deadline
pub fn first_response_breached(conversation: &Conversation, now: DateTime<Utc>) -> bool {
    conversation.first_response_at.is_none() && now > conversation.first_response_deadline
}

/// True when the conversation is unresolved past its SLA deadline.
/// Becomes false the moment `resolved_at` is set, regardless of clock.
pub fn sla_breached(conversation: &Conversation, now: DateTime<Utc>) -> bool {
    conversation.resolved_at.is_none() && now > conversation.sla_deadline
}

/// All open conversations with either predicate in breach
pub fn scan_breached(store: &Store, now: DateTime<Utc>) -> Result<Vec<Conversation>, StoreError> {
    let open = store.list_open_conversations()?;
    Ok(open
        .into_iter()
        .filter(|c| first_response_breached(c, now) || sla_breached(c, now))
        .collect())
}

/// Periodic breach sweep. Escalation of each breached conversation
/// goes through the ordinary state machine path, so a conversation
/// that already escalated is not escalated twice.
pub async fn run_scheduler(service: ConversationService, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        sweep(&service).await;
    }
}

async fn sweep(service: &ConversationService) {
    let now = Utc::now();
    let breached = match scan_breached(service.store(), now) {
        Ok(breached) => breached,
        Err(e) => {
            tracing::error!(error = %e, "SLA scan failed");
            return;
        }
    };

    if breached.is_empty() {
        return;
    }

    tracing::info!(count = breached.len(), "SLA scan found breached conversations");
    service.audit().record(
        crate::audit::AuditKind::SlaScan,
        crate::audit::AuditEntry::new().result(format!("{} breached", breached.len())),
    );
    for conversation in breached {
        if conversation.status == crate::store::ConversationStatus::Escalated {
            continue;
        }
        if let Err(e) = service.escalate(&conversation.id, None, "sla_breach").await {
            tracing::warn!(
                conversation_id = %conversation.id,
                error = %e,
                "Escalation for breached conversation failed"
            );
        }
    }
}
