//! HTTP request handlers

use super::types::{
    ActionRunResponse, AuditEventsResponse, ChannelStatsEntry, ChannelStatsResponse,
    ConversationDetailResponse, ConversationListResponse, ErrorResponse, HealthResponse,
    ReloadResponse, StatsResponse,
};
use super::AppState;
use crate::audit::{AuditEntry, AuditKind};
use crate::error::CoreError;
use crate::feedback;
use crate::ingest::{InboundEvent, IngestOutcome};
use crate::store::{ConversationStatus, StoreError};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Inbound event transport adapter
        .route("/api/events", post(ingest_event))
        // Monitoring dashboard
        .route("/api/health", get(health))
        .route("/api/stats", get(stats))
        .route("/api/recent_conversations", get(recent_conversations))
        .route("/api/conversations/:id", get(conversation_detail))
        .route("/api/audit_events", get(audit_events))
        .route("/api/channel_stats", get(channel_stats))
        // Operator actions
        .route("/api/channels/reload", post(reload_channels))
        // External execution driver for approved actions
        .route("/api/actions/:id/execute", post(execute_action))
        .with_state(state)
}

// ============================================================
// Event Ingestion
// ============================================================

async fn ingest_event(
    State(state): State<AppState>,
    Json(event): Json<InboundEvent>,
) -> Json<IngestOutcome> {
    Json(state.router.handle(event).await)
}

// ============================================================
// Dashboard
// ============================================================

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: Utc::now(),
    })
}

async fn stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, AppError> {
    let store = &state.store;
    let total_conversations = store.count_conversations().map_err(internal)?;
    let active_conversations = store
        .count_conversations_with_status(ConversationStatus::Active)
        .map_err(internal)?;
    let escalated_conversations = store
        .count_conversations_with_status(ConversationStatus::Escalated)
        .map_err(internal)?;
    let (helpful_count, total_feedback) = store.feedback_counts().map_err(internal)?;

    let type_distribution = store
        .question_type_distribution()
        .map_err(internal)?
        .into_iter()
        .collect();

    Ok(Json(StatsResponse {
        total_conversations,
        active_conversations,
        escalated_conversations,
        total_feedback,
        helpful_count,
        helpful_rate: (feedback::helpful_rate(helpful_count, total_feedback) * 100.0).round() / 100.0,
        type_distribution,
        timestamp: Utc::now(),
    }))
}

#[derive(Debug, Deserialize)]
struct LimitQuery {
    limit: Option<i64>,
}

async fn recent_conversations(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<ConversationListResponse>, AppError> {
    let limit = query.limit.unwrap_or(20).clamp(1, 200);
    let conversations = state.store.list_recent_conversations(limit).map_err(internal)?;
    Ok(Json(ConversationListResponse {
        conversations,
        timestamp: Utc::now(),
    }))
}

#[derive(Debug, Deserialize)]
struct AuditQuery {
    limit: Option<i64>,
    event_type: Option<String>,
}

async fn audit_events(
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<AuditEventsResponse>, AppError> {
    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let events = state
        .store
        .list_audit_events(limit, query.event_type.as_deref())
        .map_err(internal)?;
    Ok(Json(AuditEventsResponse {
        events,
        timestamp: Utc::now(),
    }))
}

async fn conversation_detail(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ConversationDetailResponse>, AppError> {
    let conversation = state.store.get_conversation(&id).map_err(|e| match e {
        StoreError::ConversationNotFound(_) => AppError::NotFound(e.to_string()),
        other => internal(other),
    })?;
    let messages = state.store.get_messages(&id).map_err(internal)?;
    let helpful_rate = feedback::conversation_helpful_rate(&state.store, &id).map_err(internal)?;

    Ok(Json(ConversationDetailResponse {
        conversation,
        messages,
        helpful_rate,
    }))
}

async fn channel_stats(
    State(state): State<AppState>,
) -> Result<Json<ChannelStatsResponse>, AppError> {
    let mut channel_stats = Vec::new();
    for stats in state.store.channel_stats().map_err(internal)? {
        let helpful_rate =
            feedback::channel_helpful_rate(&state.store, &stats.channel_id).map_err(internal)?;
        channel_stats.push(ChannelStatsEntry {
            channel_id: stats.channel_id,
            total_conversations: stats.total_conversations,
            active_conversations: stats.active_conversations,
            helpful_rate,
        });
    }
    Ok(Json(ChannelStatsResponse {
        channel_stats,
        timestamp: Utc::now(),
    }))
}

// ============================================================
// Operator Actions
// ============================================================

/// Explicit, audited reload of the channel policy file
async fn reload_channels(State(state): State<AppState>) -> Result<Json<ReloadResponse>, AppError> {
    let audit = state.router.conversations().audit().clone();
    match state.channels.reload() {
        Ok(count) => {
            audit.record(
                AuditKind::ChannelReload,
                AuditEntry::new().result(format!("ok: {count} channels")),
            );
            Ok(Json(ReloadResponse {
                reloaded: true,
                channels: count,
            }))
        }
        Err(e) => {
            audit.record(
                AuditKind::ChannelReload,
                AuditEntry::new().result("failed").error(e.to_string()),
            );
            Err(AppError::Internal(e.to_string()))
        }
    }
}

/// Drive one approved action to completion. Invoked by the external
/// execution driver; retries are expected and safe because terminal
/// runs reject further transitions.
async fn execute_action(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ActionRunResponse>, AppError> {
    match state.router.actions().execute(&id).await {
        Ok(action) => Ok(Json(ActionRunResponse { action })),
        Err(CoreError::NotFound(what)) => Err(AppError::NotFound(what)),
        Err(CoreError::Transition(e)) => Err(AppError::Conflict(e.to_string())),
        Err(CoreError::ExternalService(e)) => Err(AppError::Unavailable(e)),
        Err(e) => Err(internal(e)),
    }
}

// ============================================================
// Error Handling
// ============================================================

enum AppError {
    NotFound(String),
    Conflict(String),
    Unavailable(String),
    Internal(String),
}

fn internal(err: impl std::fmt::Display) -> AppError {
    AppError::Internal(err.to_string())
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        if status.is_server_error() {
            tracing::error!(status = %status, message = %message, "Request failed");
        }
        (status, Json(ErrorResponse::new(message))).into_response()
    }
}
