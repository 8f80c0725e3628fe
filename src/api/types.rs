//! API request and response types

use crate::store::{ActionRun, AuditEvent, Conversation, Message};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub timestamp: DateTime<Utc>,
}

/// Overall statistics for the dashboard
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub total_conversations: i64,
    pub active_conversations: i64,
    pub escalated_conversations: i64,
    pub total_feedback: i64,
    pub helpful_count: i64,
    pub helpful_rate: f64,
    pub type_distribution: HashMap<String, i64>,
    pub timestamp: DateTime<Utc>,
}

/// Recent conversation listing
#[derive(Debug, Serialize)]
pub struct ConversationListResponse {
    pub conversations: Vec<Conversation>,
    pub timestamp: DateTime<Utc>,
}

/// Audit event listing
#[derive(Debug, Serialize)]
pub struct AuditEventsResponse {
    pub events: Vec<AuditEvent>,
    pub timestamp: DateTime<Utc>,
}

/// Conversation detail with its message history
#[derive(Debug, Serialize)]
pub struct ConversationDetailResponse {
    pub conversation: Conversation,
    pub messages: Vec<Message>,
    pub helpful_rate: f64,
}

/// One executed or finished action run
#[derive(Debug, Serialize)]
pub struct ActionRunResponse {
    pub action: ActionRun,
}

/// Per-channel statistics with feedback rates
#[derive(Debug, Serialize)]
pub struct ChannelStatsEntry {
    pub channel_id: String,
    pub total_conversations: i64,
    pub active_conversations: i64,
    pub helpful_rate: f64,
}

/// Per-channel statistics
#[derive(Debug, Serialize)]
pub struct ChannelStatsResponse {
    pub channel_stats: Vec<ChannelStatsEntry>,
    pub timestamp: DateTime<Utc>,
}

/// Result of the audited channel policy reload
#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub reloaded: bool,
    pub channels: usize,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
