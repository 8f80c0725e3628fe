//! Append-only audit trail
//!
//! Every attempted external side effect appends exactly one event
//! carrying the actor, thread reference, a hash of the request payload
//! (never the raw payload) and an outcome. Appending is best-effort: a
//! failed audit write must not roll back the operation it describes,
//! but it is never silent either: it lands in the process log so
//! operators can detect gaps.

use crate::store::Store;
use sha2::{Digest, Sha256};
use std::fmt;

/// The closed set of audited side-effect kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditKind {
    MessageReceived,
    StatusTransition,
    SummaryApproval,
    ActionRequested,
    ActionApproval,
    ActionRejected,
    ActionExecution,
    AuthorizationCheck,
    EscalationNotice,
    TicketCreate,
    TicketUpdate,
    ChannelReload,
    SlaScan,
}

impl AuditKind {
    pub fn as_code(self) -> &'static str {
        match self {
            AuditKind::MessageReceived => "message_received",
            AuditKind::StatusTransition => "status_transition",
            AuditKind::SummaryApproval => "summary_approval",
            AuditKind::ActionRequested => "action_requested",
            AuditKind::ActionApproval => "action_approval",
            AuditKind::ActionRejected => "action_rejected",
            AuditKind::ActionExecution => "action_execution",
            AuditKind::AuthorizationCheck => "authorization_check",
            AuditKind::EscalationNotice => "escalation_notice",
            AuditKind::TicketCreate => "ticket_create",
            AuditKind::TicketUpdate => "ticket_update",
            AuditKind::ChannelReload => "channel_reload",
            AuditKind::SlaScan => "sla_scan",
        }
    }
}

impl fmt::Display for AuditKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_code())
    }
}

/// SHA-256 hex digest of a request payload. Bounds stored size and
/// keeps user content out of the audit table.
pub fn payload_hash(payload: &serde_json::Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.to_string().as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// One audit entry under construction
#[derive(Debug, Default)]
pub struct AuditEntry {
    actor_id: Option<String>,
    channel_id: Option<String>,
    thread_ts: Option<String>,
    payload_hash: Option<String>,
    result: Option<String>,
    error: Option<String>,
}

impl AuditEntry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    pub fn channel(mut self, channel_id: impl Into<String>) -> Self {
        self.channel_id = Some(channel_id.into());
        self
    }

    pub fn thread(mut self, thread_ts: impl Into<String>) -> Self {
        self.thread_ts = Some(thread_ts.into());
        self
    }

    /// Hash and attach the request payload
    pub fn payload(mut self, payload: &serde_json::Value) -> Self {
        self.payload_hash = Some(payload_hash(payload));
        self
    }

    pub fn result(mut self, result: impl Into<String>) -> Self {
        self.result = Some(result.into());
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Recorder bound to the store
#[derive(Clone)]
pub struct AuditRecorder {
    store: Store,
}

impl AuditRecorder {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Append one event. Failures are reported on the process log
    /// channel instead of propagating into the primary operation.
    pub fn record(&self, kind: AuditKind, entry: AuditEntry) {
        let appended = self.store.append_audit_event(
            kind.as_code(),
            entry.actor_id.as_deref(),
            entry.channel_id.as_deref(),
            entry.thread_ts.as_deref(),
            entry.payload_hash.as_deref(),
            entry.result.as_deref(),
            entry.error.as_deref(),
        );
        if let Err(e) = appended {
            tracing::error!(
                event_type = %kind,
                error = %e,
                "Audit append failed; primary operation unaffected"
            );
        }
    }
}
