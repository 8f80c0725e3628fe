//! Persistence layer
//!
//! All cross-worker synchronization rests on this layer: UNIQUE
//! constraints on `conversations.thread_ts` and `messages.ts`,
//! set-only-if-null timestamp updates, and compare-and-swap status
//! updates. No in-memory lock is assumed to span processes.

mod schema;

pub use schema::*;

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("conversation not found: {0}")]
    ConversationNotFound(String),
    #[error("action run not found: {0}")]
    ActionNotFound(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// True when an INSERT failed because a UNIQUE or PRIMARY KEY
/// constraint already holds the row. This is the signal to re-fetch
/// instead of failing: a concurrent worker won the insert race.
fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

/// Thread-safe store handle
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open or create the database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        // Other worker processes may hold the write lock briefly
        conn.busy_timeout(StdDuration::from_secs(5))?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    // ==================== Conversation Operations ====================

    /// Look up the conversation for a thread, creating it if absent.
    ///
    /// Insert-first: the UNIQUE constraint on `thread_ts` is the
    /// synchronization point. On a uniqueness violation the existing
    /// row is fetched and returned, so concurrent identical calls all
    /// converge on the same conversation.
    pub fn get_or_create_conversation(
        &self,
        channel_id: &str,
        thread_ts: &str,
        user_id: &str,
        sla_minutes: i64,
        first_response_minutes: i64,
    ) -> StoreResult<Conversation> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();
        let id = uuid::Uuid::new_v4().to_string();
        let sla_deadline = now + Duration::minutes(sla_minutes);
        let first_response_deadline = now + Duration::minutes(first_response_minutes);

        let inserted = conn.execute(
            "INSERT INTO conversations
                (id, channel_id, thread_ts, user_id, status, summary_confirmed,
                 sla_deadline, first_response_deadline, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7, ?8, ?8)",
            params![
                id,
                channel_id,
                thread_ts,
                user_id,
                ConversationStatus::Active.as_code(),
                sla_deadline.to_rfc3339(),
                first_response_deadline.to_rfc3339(),
                now.to_rfc3339(),
            ],
        );

        match inserted {
            Ok(_) => {
                tracing::info!(conversation_id = %id, thread_ts = %thread_ts, "Conversation created");
                Ok(Conversation {
                    id,
                    channel_id: channel_id.to_string(),
                    thread_ts: thread_ts.to_string(),
                    user_id: user_id.to_string(),
                    status: ConversationStatus::Active,
                    question_type: None,
                    summary: None,
                    summary_confirmed: false,
                    ticket_key: None,
                    sla_deadline,
                    first_response_deadline,
                    first_response_at: None,
                    resolved_at: None,
                    rag_index: None,
                    created_at: now,
                    updated_at: now,
                })
            }
            Err(e) if is_unique_violation(&e) => {
                Self::query_conversation(&conn, "thread_ts", thread_ts)?
                    .ok_or_else(|| StoreError::ConversationNotFound(thread_ts.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Get conversation by ID
    pub fn get_conversation(&self, id: &str) -> StoreResult<Conversation> {
        let conn = self.conn.lock().unwrap();
        Self::query_conversation(&conn, "id", id)?
            .ok_or_else(|| StoreError::ConversationNotFound(id.to_string()))
    }

    /// Find the conversation owning a thread, if any
    pub fn find_conversation_by_thread(&self, thread_ts: &str) -> StoreResult<Option<Conversation>> {
        let conn = self.conn.lock().unwrap();
        Self::query_conversation(&conn, "thread_ts", thread_ts)
    }

    /// Find the conversation owning a message timestamp, if any
    pub fn find_conversation_by_message(&self, message_ts: &str) -> StoreResult<Option<Conversation>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM conversations c
             INNER JOIN messages m ON m.conversation_id = c.id
             WHERE m.ts = ?1",
            COLUMNS = CONVERSATION_COLUMNS,
        ))?;
        let mut rows = stmt.query_map(params![message_ts], parse_conversation_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    fn query_conversation(
        conn: &Connection,
        column: &str,
        value: &str,
    ) -> StoreResult<Option<Conversation>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations c WHERE c.{column} = ?1"
        ))?;
        let mut rows = stmt.query_map(params![value], parse_conversation_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Most recently created conversations, newest first
    pub fn list_recent_conversations(&self, limit: i64) -> StoreResult<Vec<Conversation>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations c
             ORDER BY c.created_at DESC LIMIT ?1"
        ))?;
        let rows = stmt.query_map(params![limit], parse_conversation_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    /// Conversations still subject to SLA scanning (not resolved/closed)
    pub fn list_open_conversations(&self) -> StoreResult<Vec<Conversation>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations c
             WHERE c.status NOT IN ('resolved', 'closed')
             ORDER BY c.created_at ASC"
        ))?;
        let rows = stmt.query_map([], parse_conversation_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    /// Compare-and-swap status update.
    ///
    /// Returns false when zero rows matched, meaning a concurrent
    /// handler already moved the conversation off `from`; callers
    /// treat that as a harmless lost race, not a failure.
    pub fn transition_conversation_status(
        &self,
        id: &str,
        from: ConversationStatus,
        to: ConversationStatus,
    ) -> StoreResult<bool> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();
        let updated = conn.execute(
            "UPDATE conversations SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
            params![to.as_code(), now.to_rfc3339(), id, from.as_code()],
        )?;
        if updated == 0 && !Self::conversation_exists(&conn, id)? {
            return Err(StoreError::ConversationNotFound(id.to_string()));
        }
        Ok(updated > 0)
    }

    fn conversation_exists(conn: &Connection, id: &str) -> StoreResult<bool> {
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM conversations WHERE id = ?1)",
            params![id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Record the first human-visible response time. Set-only-if-null:
    /// a late duplicate call never overwrites the original value.
    pub fn mark_first_response(&self, id: &str, at: DateTime<Utc>) -> StoreResult<bool> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE conversations SET first_response_at = ?1, updated_at = ?1
             WHERE id = ?2 AND first_response_at IS NULL",
            params![at.to_rfc3339(), id],
        )?;
        if updated == 0 && !Self::conversation_exists(&conn, id)? {
            return Err(StoreError::ConversationNotFound(id.to_string()));
        }
        Ok(updated > 0)
    }

    /// Record resolution time. Set-only-if-null, same contract as
    /// `mark_first_response`.
    pub fn mark_resolved(&self, id: &str, at: DateTime<Utc>) -> StoreResult<bool> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE conversations SET resolved_at = ?1, updated_at = ?1
             WHERE id = ?2 AND resolved_at IS NULL",
            params![at.to_rfc3339(), id],
        )?;
        if updated == 0 && !Self::conversation_exists(&conn, id)? {
            return Err(StoreError::ConversationNotFound(id.to_string()));
        }
        Ok(updated > 0)
    }

    /// Set the classified question type
    pub fn update_question_type(&self, id: &str, question_type: QuestionType) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();
        let updated = conn.execute(
            "UPDATE conversations SET question_type = ?1, updated_at = ?2 WHERE id = ?3",
            params![question_type.as_code(), now.to_rfc3339(), id],
        )?;
        if updated == 0 {
            return Err(StoreError::ConversationNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Set the drafted/confirmed summary text
    pub fn update_summary(&self, id: &str, summary: &str, confirmed: bool) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();
        let updated = conn.execute(
            "UPDATE conversations SET summary = ?1, summary_confirmed = ?2, updated_at = ?3
             WHERE id = ?4",
            params![summary, confirmed, now.to_rfc3339(), id],
        )?;
        if updated == 0 {
            return Err(StoreError::ConversationNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Attach an external ticket reference
    pub fn set_ticket_key(&self, id: &str, ticket_key: &str) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();
        let updated = conn.execute(
            "UPDATE conversations SET ticket_key = ?1, updated_at = ?2 WHERE id = ?3",
            params![ticket_key, now.to_rfc3339(), id],
        )?;
        if updated == 0 {
            return Err(StoreError::ConversationNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Remember which retrieval index answered this conversation
    pub fn set_rag_index(&self, id: &str, rag_index: &str) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();
        let updated = conn.execute(
            "UPDATE conversations SET rag_index = ?1, updated_at = ?2 WHERE id = ?3",
            params![rag_index, now.to_rfc3339(), id],
        )?;
        if updated == 0 {
            return Err(StoreError::ConversationNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Delete a conversation and everything it owns.
    ///
    /// The cascade is explicit: children go first, in one transaction.
    /// Not part of the normal lifecycle (conversations close, they are
    /// not deleted); this exists for operator cleanup.
    #[allow(dead_code)] // Operator cleanup path, exercised in tests
    pub fn delete_conversation(&self, id: &str) -> StoreResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM feedback WHERE conversation_id = ?1", params![id])?;
        tx.execute("DELETE FROM action_runs WHERE conversation_id = ?1", params![id])?;
        tx.execute("DELETE FROM messages WHERE conversation_id = ?1", params![id])?;
        let deleted = tx.execute("DELETE FROM conversations WHERE id = ?1", params![id])?;
        tx.commit()?;
        if deleted == 0 {
            return Err(StoreError::ConversationNotFound(id.to_string()));
        }
        Ok(())
    }

    // ==================== Message Operations ====================

    /// Save a delivered message. Idempotent on `ts`: redelivery returns
    /// the already-saved row unchanged.
    #[allow(clippy::too_many_arguments)]
    pub fn save_message(
        &self,
        conversation_id: &str,
        ts: &str,
        user_id: &str,
        text: &str,
        file_urls: &[String],
        ocr_text: Option<&str>,
        is_bot_response: bool,
    ) -> StoreResult<Message> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();
        let id = uuid::Uuid::new_v4().to_string();
        let has_files = !file_urls.is_empty();
        let file_urls_json = if has_files {
            Some(serde_json::to_string(file_urls).unwrap_or_else(|_| "[]".to_string()))
        } else {
            None
        };

        let inserted = conn.execute(
            "INSERT INTO messages
                (id, conversation_id, ts, user_id, text, has_files, file_urls,
                 ocr_text, is_bot_response, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                id,
                conversation_id,
                ts,
                user_id,
                text,
                has_files,
                file_urls_json,
                ocr_text,
                is_bot_response,
                now.to_rfc3339(),
            ],
        );

        match inserted {
            Ok(_) => {
                tracing::debug!(message_id = %id, conversation_id = %conversation_id, has_files, "Message saved");
                Ok(Message {
                    id,
                    conversation_id: conversation_id.to_string(),
                    ts: ts.to_string(),
                    user_id: user_id.to_string(),
                    text: text.to_string(),
                    has_files,
                    file_urls: file_urls.to_vec(),
                    ocr_text: ocr_text.map(String::from),
                    is_bot_response,
                    created_at: now,
                })
            }
            Err(e) if is_unique_violation(&e) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages WHERE ts = ?1"
                ))?;
                stmt.query_row(params![ts], parse_message_row)
                    .map_err(StoreError::from)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Get all messages for a conversation, oldest first
    pub fn get_messages(&self, conversation_id: &str) -> StoreResult<Vec<Message>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE conversation_id = ?1 ORDER BY ts ASC"
        ))?;
        let rows = stmt.query_map(params![conversation_id], parse_message_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    // ==================== Action Run Operations ====================

    /// Create an action run awaiting approval
    pub fn create_action_run(
        &self,
        conversation_id: &str,
        action_name: &str,
        parameters: Option<&serde_json::Value>,
    ) -> StoreResult<ActionRun> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();
        let id = uuid::Uuid::new_v4().to_string();
        let params_json = parameters.map(|v| v.to_string());

        conn.execute(
            "INSERT INTO action_runs (id, conversation_id, action_name, parameters, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id,
                conversation_id,
                action_name,
                params_json,
                ActionStatus::PendingApproval.as_code(),
                now.to_rfc3339(),
            ],
        )?;

        tracing::info!(action_id = %id, action_name = %action_name, "Action run created");
        Ok(ActionRun {
            id,
            conversation_id: conversation_id.to_string(),
            action_name: action_name.to_string(),
            parameters: parameters.cloned(),
            status: ActionStatus::PendingApproval,
            approved_by: None,
            approved_at: None,
            output: None,
            error: None,
            logs: Vec::new(),
            started_at: None,
            completed_at: None,
            duration_seconds: None,
            created_at: now,
        })
    }

    /// Get action run by ID
    pub fn get_action_run(&self, id: &str) -> StoreResult<ActionRun> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {ACTION_COLUMNS} FROM action_runs WHERE id = ?1"
        ))?;
        stmt.query_row(params![id], parse_action_row)
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::ActionNotFound(id.to_string()),
                other => StoreError::Sqlite(other),
            })
    }

    /// PENDING_APPROVAL -> APPROVED, recording the approver.
    /// CAS on status; false means the run already left PENDING_APPROVAL.
    pub fn approve_action(&self, id: &str, approver: &str, at: DateTime<Utc>) -> StoreResult<bool> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE action_runs SET status = ?1, approved_by = ?2, approved_at = ?3
             WHERE id = ?4 AND status = ?5",
            params![
                ActionStatus::Approved.as_code(),
                approver,
                at.to_rfc3339(),
                id,
                ActionStatus::PendingApproval.as_code(),
            ],
        )?;
        if updated == 0 && !Self::action_exists(&conn, id)? {
            return Err(StoreError::ActionNotFound(id.to_string()));
        }
        Ok(updated > 0)
    }

    /// PENDING_APPROVAL -> REJECTED
    pub fn reject_action(&self, id: &str) -> StoreResult<bool> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE action_runs SET status = ?1 WHERE id = ?2 AND status = ?3",
            params![
                ActionStatus::Rejected.as_code(),
                id,
                ActionStatus::PendingApproval.as_code(),
            ],
        )?;
        if updated == 0 && !Self::action_exists(&conn, id)? {
            return Err(StoreError::ActionNotFound(id.to_string()));
        }
        Ok(updated > 0)
    }

    /// APPROVED -> RUNNING. Committed before the external executor is
    /// invoked, so a crash mid-execution leaves a visible RUNNING row.
    pub fn start_action(&self, id: &str, at: DateTime<Utc>) -> StoreResult<bool> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE action_runs SET status = ?1, started_at = ?2
             WHERE id = ?3 AND status = ?4",
            params![
                ActionStatus::Running.as_code(),
                at.to_rfc3339(),
                id,
                ActionStatus::Approved.as_code(),
            ],
        )?;
        if updated == 0 && !Self::action_exists(&conn, id)? {
            return Err(StoreError::ActionNotFound(id.to_string()));
        }
        Ok(updated > 0)
    }

    /// RUNNING -> COMPLETED, recording output and duration
    pub fn complete_action(
        &self,
        id: &str,
        output: &str,
        logs: &[String],
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let conn = self.conn.lock().unwrap();
        let logs_json = serde_json::to_string(logs).unwrap_or_else(|_| "[]".to_string());
        let updated = conn.execute(
            "UPDATE action_runs SET status = ?1, output = ?2, logs = ?3, completed_at = ?4,
                    duration_seconds = (julianday(?4) - julianday(started_at)) * 86400.0
             WHERE id = ?5 AND status = ?6",
            params![
                ActionStatus::Completed.as_code(),
                output,
                logs_json,
                at.to_rfc3339(),
                id,
                ActionStatus::Running.as_code(),
            ],
        )?;
        if updated == 0 && !Self::action_exists(&conn, id)? {
            return Err(StoreError::ActionNotFound(id.to_string()));
        }
        Ok(updated > 0)
    }

    /// RUNNING -> FAILED, recording the error
    pub fn fail_action(
        &self,
        id: &str,
        error: &str,
        logs: &[String],
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let conn = self.conn.lock().unwrap();
        let logs_json = serde_json::to_string(logs).unwrap_or_else(|_| "[]".to_string());
        let updated = conn.execute(
            "UPDATE action_runs SET status = ?1, error = ?2, logs = ?3, completed_at = ?4,
                    duration_seconds = (julianday(?4) - julianday(started_at)) * 86400.0
             WHERE id = ?5 AND status = ?6",
            params![
                ActionStatus::Failed.as_code(),
                error,
                logs_json,
                at.to_rfc3339(),
                id,
                ActionStatus::Running.as_code(),
            ],
        )?;
        if updated == 0 && !Self::action_exists(&conn, id)? {
            return Err(StoreError::ActionNotFound(id.to_string()));
        }
        Ok(updated > 0)
    }

    /// Any non-terminal status -> CANCELLED
    pub fn cancel_action(&self, id: &str) -> StoreResult<bool> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE action_runs SET status = ?1
             WHERE id = ?2 AND status IN ('pending_approval', 'approved', 'running')",
            params![ActionStatus::Cancelled.as_code(), id],
        )?;
        if updated == 0 && !Self::action_exists(&conn, id)? {
            return Err(StoreError::ActionNotFound(id.to_string()));
        }
        Ok(updated > 0)
    }

    /// Action runs created for a channel since the given instant.
    /// Backs the per-channel daily action cap.
    pub fn count_action_runs_for_channel_since(
        &self,
        channel_id: &str,
        since: DateTime<Utc>,
    ) -> StoreResult<i64> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT COUNT(*) FROM action_runs a
             INNER JOIN conversations c ON c.id = a.conversation_id
             WHERE c.channel_id = ?1 AND a.created_at >= ?2",
            params![channel_id, since.to_rfc3339()],
            |row| row.get(0),
        )
        .map_err(StoreError::from)
    }

    fn action_exists(conn: &Connection, id: &str) -> StoreResult<bool> {
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM action_runs WHERE id = ?1)",
            params![id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    // ==================== Feedback Operations ====================

    /// Append a feedback row. Never updated or deduplicated afterward.
    pub fn save_feedback(
        &self,
        conversation_id: &str,
        user_id: &str,
        rating: FeedbackRating,
        message_ts: Option<&str>,
        note: Option<&str>,
    ) -> StoreResult<Feedback> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();
        let id = uuid::Uuid::new_v4().to_string();

        conn.execute(
            "INSERT INTO feedback (id, conversation_id, user_id, rating, note, message_ts, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id,
                conversation_id,
                user_id,
                rating.as_code(),
                note,
                message_ts,
                now.to_rfc3339(),
            ],
        )?;

        tracing::info!(feedback_id = %id, conversation_id = %conversation_id, rating = %rating, "Feedback saved");
        Ok(Feedback {
            id,
            conversation_id: conversation_id.to_string(),
            user_id: user_id.to_string(),
            rating,
            note: note.map(String::from),
            message_ts: message_ts.map(String::from),
            created_at: now,
        })
    }

    /// (helpful, total) counts over a conversation's full feedback history
    pub fn feedback_counts_for_conversation(&self, conversation_id: &str) -> StoreResult<(i64, i64)> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT COALESCE(SUM(rating = 'helpful'), 0), COUNT(*)
             FROM feedback WHERE conversation_id = ?1",
            params![conversation_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .map_err(StoreError::from)
    }

    /// (helpful, total) counts over a channel's full feedback history
    pub fn feedback_counts_for_channel(&self, channel_id: &str) -> StoreResult<(i64, i64)> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT COALESCE(SUM(f.rating = 'helpful'), 0), COUNT(*)
             FROM feedback f
             INNER JOIN conversations c ON c.id = f.conversation_id
             WHERE c.channel_id = ?1",
            params![channel_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .map_err(StoreError::from)
    }

    /// (helpful, total) counts over all feedback
    pub fn feedback_counts(&self) -> StoreResult<(i64, i64)> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT COALESCE(SUM(rating = 'helpful'), 0), COUNT(*) FROM feedback",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .map_err(StoreError::from)
    }

    // ==================== Audit Operations ====================

    /// Append an audit event. Plain insert; the best-effort policy
    /// lives in the audit recorder, not here.
    #[allow(clippy::too_many_arguments)]
    pub fn append_audit_event(
        &self,
        event_type: &str,
        actor_id: Option<&str>,
        channel_id: Option<&str>,
        thread_ts: Option<&str>,
        payload_hash: Option<&str>,
        result: Option<&str>,
        error: Option<&str>,
    ) -> StoreResult<AuditEvent> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();
        let id = uuid::Uuid::new_v4().to_string();

        conn.execute(
            "INSERT INTO audit_events
                (id, event_type, actor_id, channel_id, thread_ts, payload_hash, result, error, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                id,
                event_type,
                actor_id,
                channel_id,
                thread_ts,
                payload_hash,
                result,
                error,
                now.to_rfc3339(),
            ],
        )?;

        Ok(AuditEvent {
            id,
            event_type: event_type.to_string(),
            actor_id: actor_id.map(String::from),
            channel_id: channel_id.map(String::from),
            thread_ts: thread_ts.map(String::from),
            payload_hash: payload_hash.map(String::from),
            result: result.map(String::from),
            error: error.map(String::from),
            created_at: now,
        })
    }

    /// Recent audit events, newest first, optionally filtered by type
    pub fn list_audit_events(
        &self,
        limit: i64,
        event_type: Option<&str>,
    ) -> StoreResult<Vec<AuditEvent>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, event_type, actor_id, channel_id, thread_ts, payload_hash, result, error, created_at
             FROM audit_events
             WHERE (?1 IS NULL OR event_type = ?1)
             ORDER BY created_at DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![event_type, limit], parse_audit_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    // ==================== Dashboard Counters ====================

    pub fn count_conversations(&self) -> StoreResult<i64> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT COUNT(*) FROM conversations", [], |row| row.get(0))
            .map_err(StoreError::from)
    }

    pub fn count_conversations_with_status(&self, status: ConversationStatus) -> StoreResult<i64> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT COUNT(*) FROM conversations WHERE status = ?1",
            params![status.as_code()],
            |row| row.get(0),
        )
        .map_err(StoreError::from)
    }

    /// Conversation counts grouped by classified question type
    pub fn question_type_distribution(&self) -> StoreResult<Vec<(String, i64)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT question_type, COUNT(*) FROM conversations
             WHERE question_type IS NOT NULL GROUP BY question_type",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    /// Per-channel conversation totals
    pub fn channel_stats(&self) -> StoreResult<Vec<ChannelStats>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT channel_id, COUNT(*), COALESCE(SUM(status = 'active'), 0)
             FROM conversations GROUP BY channel_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(ChannelStats {
                channel_id: row.get(0)?,
                total_conversations: row.get(1)?,
                active_conversations: row.get(2)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }
}

// ==================== Row Parsing ====================

const CONVERSATION_COLUMNS: &str = "c.id, c.channel_id, c.thread_ts, c.user_id, c.status, \
     c.question_type, c.summary, c.summary_confirmed, c.ticket_key, c.sla_deadline, \
     c.first_response_deadline, c.first_response_at, c.resolved_at, c.rag_index, \
     c.created_at, c.updated_at";

const MESSAGE_COLUMNS: &str = "id, conversation_id, ts, user_id, text, has_files, file_urls, \
     ocr_text, is_bot_response, created_at";

const ACTION_COLUMNS: &str = "id, conversation_id, action_name, parameters, status, approved_by, \
     approved_at, output, error, logs, started_at, completed_at, duration_seconds, created_at";

fn parse_conversation_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
    let status_code: String = row.get(4)?;
    let question_type: Option<String> = row.get(5)?;
    Ok(Conversation {
        id: row.get(0)?,
        channel_id: row.get(1)?,
        thread_ts: row.get(2)?,
        user_id: row.get(3)?,
        status: ConversationStatus::from_code(&status_code).unwrap_or(ConversationStatus::Active),
        question_type: question_type.as_deref().and_then(QuestionType::from_code),
        summary: row.get(6)?,
        summary_confirmed: row.get(7)?,
        ticket_key: row.get(8)?,
        sla_deadline: parse_datetime(&row.get::<_, String>(9)?),
        first_response_deadline: parse_datetime(&row.get::<_, String>(10)?),
        first_response_at: row.get::<_, Option<String>>(11)?.as_deref().map(parse_datetime),
        resolved_at: row.get::<_, Option<String>>(12)?.as_deref().map(parse_datetime),
        rag_index: row.get(13)?,
        created_at: parse_datetime(&row.get::<_, String>(14)?),
        updated_at: parse_datetime(&row.get::<_, String>(15)?),
    })
}

fn parse_message_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let file_urls: Option<String> = row.get(6)?;
    Ok(Message {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        ts: row.get(2)?,
        user_id: row.get(3)?,
        text: row.get(4)?,
        has_files: row.get(5)?,
        file_urls: file_urls
            .map(|s| serde_json::from_str(&s).unwrap_or_default())
            .unwrap_or_default(),
        ocr_text: row.get(7)?,
        is_bot_response: row.get(8)?,
        created_at: parse_datetime(&row.get::<_, String>(9)?),
    })
}

fn parse_action_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ActionRun> {
    let status_code: String = row.get(4)?;
    let parameters: Option<String> = row.get(3)?;
    let logs: Option<String> = row.get(9)?;
    Ok(ActionRun {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        action_name: row.get(2)?,
        parameters: parameters.and_then(|s| serde_json::from_str(&s).ok()),
        status: ActionStatus::from_code(&status_code).unwrap_or(ActionStatus::PendingApproval),
        approved_by: row.get(5)?,
        approved_at: row.get::<_, Option<String>>(6)?.as_deref().map(parse_datetime),
        output: row.get(7)?,
        error: row.get(8)?,
        logs: logs
            .map(|s| serde_json::from_str(&s).unwrap_or_default())
            .unwrap_or_default(),
        started_at: row.get::<_, Option<String>>(10)?.as_deref().map(parse_datetime),
        completed_at: row.get::<_, Option<String>>(11)?.as_deref().map(parse_datetime),
        duration_seconds: row.get(12)?,
        created_at: parse_datetime(&row.get::<_, String>(13)?),
    })
}

fn parse_audit_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditEvent> {
    Ok(AuditEvent {
        id: row.get(0)?,
        event_type: row.get(1)?,
        actor_id: row.get(2)?,
        channel_id: row.get(3)?,
        thread_ts: row.get(4)?,
        payload_hash: row.get(5)?,
        result: row.get(6)?,
        error: row.get(7)?,
        created_at: parse_datetime(&row.get::<_, String>(8)?),
    })
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
