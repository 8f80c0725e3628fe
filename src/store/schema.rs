//! Database schema and record types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// SQL schema for initialization
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS conversations (
    id TEXT PRIMARY KEY,
    channel_id TEXT NOT NULL,
    thread_ts TEXT NOT NULL UNIQUE,
    user_id TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'active',
    question_type TEXT,
    summary TEXT,
    summary_confirmed BOOLEAN NOT NULL DEFAULT 0,
    ticket_key TEXT,
    sla_deadline TEXT NOT NULL,
    first_response_deadline TEXT NOT NULL,
    first_response_at TEXT,
    resolved_at TEXT,
    rag_index TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_conversations_channel ON conversations(channel_id);
CREATE INDEX IF NOT EXISTS idx_conversations_status ON conversations(status);
CREATE INDEX IF NOT EXISTS idx_conversations_created ON conversations(created_at DESC);

CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY,
    conversation_id TEXT NOT NULL,
    ts TEXT NOT NULL UNIQUE,
    user_id TEXT NOT NULL,
    text TEXT NOT NULL,
    has_files BOOLEAN NOT NULL DEFAULT 0,
    file_urls TEXT,
    ocr_text TEXT,
    is_bot_response BOOLEAN NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,

    FOREIGN KEY (conversation_id) REFERENCES conversations(id)
);

CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id);

CREATE TABLE IF NOT EXISTS action_runs (
    id TEXT PRIMARY KEY,
    conversation_id TEXT NOT NULL,
    action_name TEXT NOT NULL,
    parameters TEXT,
    status TEXT NOT NULL DEFAULT 'pending_approval',
    approved_by TEXT,
    approved_at TEXT,
    output TEXT,
    error TEXT,
    logs TEXT,
    started_at TEXT,
    completed_at TEXT,
    duration_seconds REAL,
    created_at TEXT NOT NULL,

    FOREIGN KEY (conversation_id) REFERENCES conversations(id)
);

CREATE INDEX IF NOT EXISTS idx_action_runs_conversation ON action_runs(conversation_id);
CREATE INDEX IF NOT EXISTS idx_action_runs_status ON action_runs(status);

CREATE TABLE IF NOT EXISTS feedback (
    id TEXT PRIMARY KEY,
    conversation_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    rating TEXT NOT NULL,
    note TEXT,
    message_ts TEXT,
    created_at TEXT NOT NULL,

    FOREIGN KEY (conversation_id) REFERENCES conversations(id)
);

CREATE INDEX IF NOT EXISTS idx_feedback_conversation ON feedback(conversation_id);

CREATE TABLE IF NOT EXISTS audit_events (
    id TEXT PRIMARY KEY,
    event_type TEXT NOT NULL,
    actor_id TEXT,
    channel_id TEXT,
    thread_ts TEXT,
    payload_hash TEXT,
    result TEXT,
    error TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_audit_events_type ON audit_events(event_type);
CREATE INDEX IF NOT EXISTS idx_audit_events_created ON audit_events(created_at DESC);
"#;

// ============================================================
// Closed label sets
//
// In-memory variants are mapped to stable persisted codes through
// the explicit as_code/from_code tables below. The serde renames
// intentionally produce the same strings so API payloads and the
// database never disagree.
// ============================================================

/// Conversation lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Active,
    WaitingApproval,
    Resolved,
    Escalated,
    Closed,
}

impl ConversationStatus {
    pub fn as_code(self) -> &'static str {
        match self {
            ConversationStatus::Active => "active",
            ConversationStatus::WaitingApproval => "waiting_approval",
            ConversationStatus::Resolved => "resolved",
            ConversationStatus::Escalated => "escalated",
            ConversationStatus::Closed => "closed",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "active" => Some(ConversationStatus::Active),
            "waiting_approval" => Some(ConversationStatus::WaitingApproval),
            "resolved" => Some(ConversationStatus::Resolved),
            "escalated" => Some(ConversationStatus::Escalated),
            "closed" => Some(ConversationStatus::Closed),
            _ => None,
        }
    }

    /// Terminal: no further transition leaves this status
    pub fn is_terminal(self) -> bool {
        matches!(self, ConversationStatus::Closed)
    }
}

impl fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_code())
    }
}

/// Classified question type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    Bug,
    HowTo,
    FeatureRequest,
    OpsAction,
    Other,
}

impl QuestionType {
    pub fn as_code(self) -> &'static str {
        match self {
            QuestionType::Bug => "bug",
            QuestionType::HowTo => "how_to",
            QuestionType::FeatureRequest => "feature_request",
            QuestionType::OpsAction => "ops_action",
            QuestionType::Other => "other",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "bug" => Some(QuestionType::Bug),
            "how_to" => Some(QuestionType::HowTo),
            "feature_request" => Some(QuestionType::FeatureRequest),
            "ops_action" => Some(QuestionType::OpsAction),
            "other" => Some(QuestionType::Other),
            _ => None,
        }
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_code())
    }
}

/// Action run lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    PendingApproval,
    Approved,
    Rejected,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ActionStatus {
    pub fn as_code(self) -> &'static str {
        match self {
            ActionStatus::PendingApproval => "pending_approval",
            ActionStatus::Approved => "approved",
            ActionStatus::Rejected => "rejected",
            ActionStatus::Running => "running",
            ActionStatus::Completed => "completed",
            ActionStatus::Failed => "failed",
            ActionStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "pending_approval" => Some(ActionStatus::PendingApproval),
            "approved" => Some(ActionStatus::Approved),
            "rejected" => Some(ActionStatus::Rejected),
            "running" => Some(ActionStatus::Running),
            "completed" => Some(ActionStatus::Completed),
            "failed" => Some(ActionStatus::Failed),
            "cancelled" => Some(ActionStatus::Cancelled),
            _ => None,
        }
    }

    /// Terminal: no further transition leaves this status
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ActionStatus::Rejected
                | ActionStatus::Completed
                | ActionStatus::Failed
                | ActionStatus::Cancelled
        )
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_code())
    }
}

/// Feedback rating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackRating {
    Helpful,
    NotHelpful,
    Neutral,
}

impl FeedbackRating {
    pub fn as_code(self) -> &'static str {
        match self {
            FeedbackRating::Helpful => "helpful",
            FeedbackRating::NotHelpful => "not_helpful",
            FeedbackRating::Neutral => "neutral",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "helpful" => Some(FeedbackRating::Helpful),
            "not_helpful" => Some(FeedbackRating::NotHelpful),
            "neutral" => Some(FeedbackRating::Neutral),
            _ => None,
        }
    }
}

impl fmt::Display for FeedbackRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_code())
    }
}

// ============================================================
// Records
// ============================================================

/// Conversation record, one per support thread
#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    pub id: String,
    pub channel_id: String,
    pub thread_ts: String,
    pub user_id: String,
    pub status: ConversationStatus,
    pub question_type: Option<QuestionType>,
    pub summary: Option<String>,
    pub summary_confirmed: bool,
    pub ticket_key: Option<String>,
    pub sla_deadline: DateTime<Utc>,
    pub first_response_deadline: DateTime<Utc>,
    pub first_response_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub rag_index: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Message record, one per delivered chat message
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub ts: String,
    pub user_id: String,
    pub text: String,
    pub has_files: bool,
    pub file_urls: Vec<String>,
    pub ocr_text: Option<String>,
    pub is_bot_response: bool,
    pub created_at: DateTime<Utc>,
}

/// Action run record
#[derive(Debug, Clone, Serialize)]
pub struct ActionRun {
    pub id: String,
    pub conversation_id: String,
    pub action_name: String,
    pub parameters: Option<serde_json::Value>,
    pub status: ActionStatus,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub output: Option<String>,
    pub error: Option<String>,
    pub logs: Vec<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// Feedback record, append-only
#[derive(Debug, Clone, Serialize)]
pub struct Feedback {
    pub id: String,
    pub conversation_id: String,
    pub user_id: String,
    pub rating: FeedbackRating,
    pub note: Option<String>,
    pub message_ts: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Audit event record, append-only
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub id: String,
    pub event_type: String,
    pub actor_id: Option<String>,
    pub channel_id: Option<String>,
    pub thread_ts: Option<String>,
    pub payload_hash: Option<String>,
    pub result: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Per-channel conversation counts for the dashboard
#[derive(Debug, Clone, Serialize)]
pub struct ChannelStats {
    pub channel_id: String,
    pub total_conversations: i64,
    pub active_conversations: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_round_trip() {
        for status in [
            ConversationStatus::Active,
            ConversationStatus::WaitingApproval,
            ConversationStatus::Resolved,
            ConversationStatus::Escalated,
            ConversationStatus::Closed,
        ] {
            assert_eq!(ConversationStatus::from_code(status.as_code()), Some(status));
        }
        assert_eq!(ConversationStatus::from_code("bogus"), None);
    }

    #[test]
    fn action_status_codes_round_trip() {
        for status in [
            ActionStatus::PendingApproval,
            ActionStatus::Approved,
            ActionStatus::Rejected,
            ActionStatus::Running,
            ActionStatus::Completed,
            ActionStatus::Failed,
            ActionStatus::Cancelled,
        ] {
            assert_eq!(ActionStatus::from_code(status.as_code()), Some(status));
        }
    }

    #[test]
    fn terminal_statuses() {
        assert!(ConversationStatus::Closed.is_terminal());
        assert!(!ConversationStatus::Escalated.is_terminal());

        assert!(ActionStatus::Rejected.is_terminal());
        assert!(ActionStatus::Completed.is_terminal());
        assert!(ActionStatus::Failed.is_terminal());
        assert!(ActionStatus::Cancelled.is_terminal());
        assert!(!ActionStatus::PendingApproval.is_terminal());
        assert!(!ActionStatus::Approved.is_terminal());
        assert!(!ActionStatus::Running.is_terminal());
    }

    #[test]
    fn serde_names_match_persisted_codes() {
        let json = serde_json::to_string(&ConversationStatus::WaitingApproval).unwrap();
        assert_eq!(json, "\"waiting_approval\"");
        let json = serde_json::to_string(&QuestionType::HowTo).unwrap();
        assert_eq!(json, "\"how_to\"");
        let json = serde_json::to_string(&ActionStatus::PendingApproval).unwrap();
        assert_eq!(json, "\"pending_approval\"");
        let json = serde_json::to_string(&FeedbackRating::NotHelpful).unwrap();
        assert_eq!(json, "\"not_helpful\"");
    }
}
