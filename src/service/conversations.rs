//! Conversation lifecycle orchestration

use crate::audit::{AuditEntry, AuditKind, AuditRecorder};
use crate::collab::{Answer, AnswerService, Classifier, EscalationNotifier, Ticketing};
use crate::config::ChannelPolicyStore;
use crate::error::{CoreError, CoreResult};
use crate::feedback;
use crate::lifecycle::{conversation, ConversationEvent, TransitionError};
use crate::store::{Conversation, ConversationStatus, Feedback, Message, QuestionType, Store};
use chrono::Utc;
use std::sync::Arc;

/// Defaults applied when a channel has no explicit policy entry
#[derive(Debug, Clone, Copy)]
pub struct DeadlineDefaults {
    pub sla_minutes: i64,
    pub first_response_minutes: i64,
}

#[derive(Clone)]
pub struct ConversationService {
    store: Store,
    audit: AuditRecorder,
    channels: Arc<ChannelPolicyStore>,
    classifier: Arc<dyn Classifier>,
    answerer: Option<Arc<dyn AnswerService>>,
    ticketing: Option<Arc<dyn Ticketing>>,
    notifier: Option<Arc<dyn EscalationNotifier>>,
    escalation_recipient: Option<String>,
    defaults: DeadlineDefaults,
}

impl ConversationService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Store,
        audit: AuditRecorder,
        channels: Arc<ChannelPolicyStore>,
        classifier: Arc<dyn Classifier>,
        answerer: Option<Arc<dyn AnswerService>>,
        ticketing: Option<Arc<dyn Ticketing>>,
        notifier: Option<Arc<dyn EscalationNotifier>>,
        escalation_recipient: Option<String>,
        defaults: DeadlineDefaults,
    ) -> Self {
        Self {
            store,
            audit,
            channels,
            classifier,
            answerer,
            ticketing,
            notifier,
            escalation_recipient,
            defaults,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn audit(&self) -> &AuditRecorder {
        &self.audit
    }

    pub fn channels(&self) -> &ChannelPolicyStore {
        &self.channels
    }

    // ==================== Ingestion & Dedup ====================

    /// Resolve or create the conversation for a thread and record the
    /// message. Both halves are idempotent against redelivery: the
    /// store's uniqueness constraints do the deduplication.
    #[allow(clippy::too_many_arguments)]
    pub fn ingest_message(
        &self,
        channel_id: &str,
        thread_ts: &str,
        ts: &str,
        user_id: &str,
        text: &str,
        file_urls: &[String],
        ocr_text: Option<&str>,
        is_bot_response: bool,
    ) -> CoreResult<(Conversation, Message)> {
        let (sla_minutes, first_response_minutes) = match self.channels.get(channel_id) {
            Some(cfg) => {
                tracing::debug!(channel = %cfg.name, "Applying channel deadlines");
                (cfg.sla_minutes, cfg.first_response_minutes)
            }
            None => (
                self.defaults.sla_minutes,
                self.defaults.first_response_minutes,
            ),
        };

        let conversation = self.store.get_or_create_conversation(
            channel_id,
            thread_ts,
            user_id,
            sla_minutes,
            first_response_minutes,
        )?;

        let message = self.store.save_message(
            &conversation.id,
            ts,
            user_id,
            text,
            file_urls,
            ocr_text,
            is_bot_response,
        )?;

        // A reply from anyone but the opener counts as the first
        // response; set-only-if-null makes duplicates harmless.
        if message.is_bot_response || message.user_id != conversation.user_id {
            self.store.mark_first_response(&conversation.id, Utc::now())?;
        }

        Ok((conversation, message))
    }

    // ==================== Classification & Summary ====================

    /// Classify the opening message and tag the conversation.
    /// The classifier contract guarantees a label even on failure.
    pub async fn classify(&self, conversation_id: &str, text: &str) -> CoreResult<QuestionType> {
        let question_type = self.classifier.classify(text).await;
        self.store.update_question_type(conversation_id, question_type)?;
        tracing::info!(
            conversation_id = %conversation_id,
            question_type = %question_type,
            "Conversation classified"
        );
        Ok(question_type)
    }

    /// Store a drafted summary and move to WAITING_APPROVAL
    pub fn draft_summary(&self, conversation_id: &str, summary: &str) -> CoreResult<bool> {
        self.store.update_summary(conversation_id, summary, false)?;
        self.apply_event(conversation_id, ConversationEvent::SummaryDrafted, None)
    }

    /// Requester confirmed the drafted summary
    pub fn approve_summary(&self, conversation_id: &str, actor: &str) -> CoreResult<()> {
        let conversation = self.store.get_conversation(conversation_id)?;
        let Some(summary) = conversation.summary else {
            return Err(CoreError::Validation(format!(
                "conversation {conversation_id} has no drafted summary"
            )));
        };
        self.store.update_summary(conversation_id, &summary, true)?;

        self.audit.record(
            AuditKind::SummaryApproval,
            AuditEntry::new()
                .actor(actor)
                .channel(conversation.channel_id)
                .thread(conversation.thread_ts)
                .result("approved"),
        );
        Ok(())
    }

    /// Requester rejected (or edited) the drafted summary; back to drafting
    pub fn reject_summary(
        &self,
        conversation_id: &str,
        actor: &str,
        edited: Option<&str>,
    ) -> CoreResult<bool> {
        if let Some(edited) = edited {
            self.store.update_summary(conversation_id, edited, false)?;
        }

        let conversation = self.store.get_conversation(conversation_id)?;
        self.audit.record(
            AuditKind::SummaryApproval,
            AuditEntry::new()
                .actor(actor)
                .channel(conversation.channel_id)
                .thread(conversation.thread_ts)
                .result("rejected"),
        );
        self.apply_event(conversation_id, ConversationEvent::SummaryRejected, Some(actor))
    }

    /// Generate an answer for a confirmed summary through the
    /// retrieval service. `Ok(None)` is the explicit no-client branch;
    /// a failed call is reported and leaves conversation state
    /// untouched.
    pub async fn generate_answer(&self, conversation_id: &str) -> CoreResult<Option<Answer>> {
        let Some(answerer) = self.answerer.clone() else {
            return Ok(None);
        };

        let conversation = self.store.get_conversation(conversation_id)?;
        let summary = conversation.summary.clone().filter(|s| !s.is_empty()).ok_or_else(|| {
            CoreError::Validation(format!(
                "conversation {conversation_id} has no summary to answer"
            ))
        })?;
        if !conversation.summary_confirmed {
            return Err(CoreError::Validation(format!(
                "summary for conversation {conversation_id} is not confirmed"
            )));
        }

        let Some(cfg) = self.channels.get(&conversation.channel_id) else {
            return Ok(None);
        };

        let answer = answerer
            .answer(&summary, &cfg.rag_index, &cfg.retrieval_params)
            .await
            .map_err(|e| CoreError::ExternalService(e.to_string()))?;

        // Follow-up update after the external call
        self.store.set_rag_index(conversation_id, &cfg.rag_index)?;
        tracing::info!(
            conversation_id = %conversation_id,
            index = %cfg.rag_index,
            retrieved = answer.retrieved_count,
            citations = answer.citations.len(),
            "Answer generated"
        );
        Ok(Some(answer))
    }

    // ==================== Resolution & Escalation ====================

    /// Mark the conversation resolved. `resolved_at` is set first and
    /// independently of the status transition, so a duplicate resolve
    /// keeps the original timestamp and loses the CAS harmlessly.
    pub async fn resolve(&self, conversation_id: &str, actor: Option<&str>) -> CoreResult<bool> {
        let conversation = self.store.get_conversation(conversation_id)?;
        self.store.mark_resolved(conversation_id, Utc::now())?;

        let event = if conversation.status == ConversationStatus::Escalated {
            ConversationEvent::Resolve
        } else {
            ConversationEvent::AnswerDelivered
        };
        let applied = self.apply_event(conversation_id, event, actor)?;

        // Follow-up outside the transition: leave a trace on the ticket
        if applied {
            if let (Some(ticketing), Some(key)) = (&self.ticketing, &conversation.ticket_key) {
                let updated = ticketing
                    .update_issue(key, Some("Conversation resolved."), None)
                    .await;
                let entry = AuditEntry::new()
                    .channel(conversation.channel_id.clone())
                    .thread(conversation.thread_ts.clone());
                match updated {
                    Ok(_) => self
                        .audit
                        .record(AuditKind::TicketUpdate, entry.result("ok")),
                    Err(e) => self
                        .audit
                        .record(AuditKind::TicketUpdate, entry.result("failed").error(e.to_string())),
                }
            }
        }
        Ok(applied)
    }

    /// Escalate a conversation: status first (durable), then ticket
    /// and notification as follow-ups. Safe to call repeatedly.
    pub async fn escalate(
        &self,
        conversation_id: &str,
        actor: Option<&str>,
        reason: &str,
    ) -> CoreResult<()> {
        self.apply_event(conversation_id, ConversationEvent::Escalate, actor)?;

        let conversation = self.store.get_conversation(conversation_id)?;
        let summary = conversation
            .summary
            .clone()
            .unwrap_or_else(|| format!("Support thread {}", conversation.thread_ts));
        let thread_link = format!(
            "supportline://{}/{}",
            conversation.channel_id, conversation.thread_ts
        );

        let ticket_key = match (&self.ticketing, &conversation.ticket_key) {
            (_, Some(key)) => Some(key.clone()),
            (Some(ticketing), None) => {
                let description = format!("Escalated ({reason}).\n\nThread: {thread_link}");
                let labels = vec!["escalation".to_string(), reason.to_string()];
                let entry = AuditEntry::new()
                    .channel(conversation.channel_id.clone())
                    .thread(conversation.thread_ts.clone());
                match ticketing.create_issue(&summary, &description, &labels).await {
                    Ok(Some(key)) => {
                        self.store.set_ticket_key(conversation_id, &key)?;
                        self.audit.record(AuditKind::TicketCreate, entry.result("ok"));
                        Some(key)
                    }
                    Ok(None) => {
                        self.audit.record(AuditKind::TicketCreate, entry.result("declined"));
                        None
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Ticket creation failed during escalation");
                        self.audit
                            .record(AuditKind::TicketCreate, entry.result("failed").error(e.to_string()));
                        None
                    }
                }
            }
            (None, None) => None,
        };

        if let (Some(notifier), Some(recipient)) = (&self.notifier, &self.escalation_recipient) {
            let entry = AuditEntry::new()
                .channel(conversation.channel_id.clone())
                .thread(conversation.thread_ts.clone())
                .payload(&serde_json::json!({ "reason": reason, "recipient": recipient }));
            match notifier
                .send_escalation(recipient, &summary, &thread_link, ticket_key.as_deref())
                .await
            {
                Ok(_) => self
                    .audit
                    .record(AuditKind::EscalationNotice, entry.result("sent")),
                Err(e) => {
                    tracing::warn!(error = %e, "Escalation notice failed");
                    self.audit
                        .record(AuditKind::EscalationNotice, entry.result("failed").error(e.to_string()));
                }
            }
        }

        Ok(())
    }

    /// Close out a resolved or escalated conversation
    pub fn close(&self, conversation_id: &str, actor: Option<&str>) -> CoreResult<bool> {
        self.apply_event(conversation_id, ConversationEvent::Close, actor)
    }

    // ==================== Feedback ====================

    /// Record a reaction as feedback. Unmapped symbols produce no row.
    pub fn record_reaction(
        &self,
        message_ts: &str,
        user_id: &str,
        reaction: &str,
    ) -> CoreResult<Option<Feedback>> {
        let Some(rating) = feedback::rating_for_reaction(reaction) else {
            return Ok(None);
        };

        let Some(conversation) = self.store.find_conversation_by_message(message_ts)? else {
            tracing::warn!(message_ts = %message_ts, "Conversation not found for feedback");
            return Ok(None);
        };

        let feedback =
            self.store
                .save_feedback(&conversation.id, user_id, rating, Some(message_ts), None)?;
        Ok(Some(feedback))
    }

    // ==================== Transitions ====================

    /// Validate an event against the pure transition table, then apply
    /// it with a CAS update. A rejected or lost transition performs no
    /// mutation, lands in the audit log, and is non-fatal to callers
    /// racing on stale views.
    fn apply_event(
        &self,
        conversation_id: &str,
        event: ConversationEvent,
        actor: Option<&str>,
    ) -> CoreResult<bool> {
        let current = self.store.get_conversation(conversation_id)?;

        let next = match conversation::transition(current.status, event) {
            Ok(next) => next,
            Err(e) => {
                self.audit_invalid_transition(&current, event, actor);
                return Err(CoreError::Transition(e));
            }
        };

        if next == current.status {
            return Ok(true);
        }

        let applied = self
            .store
            .transition_conversation_status(conversation_id, current.status, next)?;

        if applied {
            tracing::info!(
                conversation_id = %conversation_id,
                from = %current.status,
                to = %next,
                "Conversation status transition"
            );
        } else {
            // A concurrent handler moved the status first
            self.audit_invalid_transition(&current, event, actor);
        }
        Ok(applied)
    }

    fn audit_invalid_transition(
        &self,
        conversation: &Conversation,
        event: ConversationEvent,
        actor: Option<&str>,
    ) {
        let mut entry = AuditEntry::new()
            .channel(conversation.channel_id.clone())
            .thread(conversation.thread_ts.clone())
            .result("invalid_transition")
            .error(TransitionError::invalid(conversation.status, event).to_string());
        if let Some(actor) = actor {
            entry = entry.actor(actor);
        }
        self.audit.record(AuditKind::StatusTransition, entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::CollabResult;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FixedClassifier(QuestionType);

    #[async_trait]
    impl Classifier for FixedClassifier {
        async fn classify(&self, _text: &str) -> QuestionType {
            self.0
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl EscalationNotifier for RecordingNotifier {
        async fn send_escalation(
            &self,
            recipient: &str,
            _summary: &str,
            _thread_link: &str,
            _ticket_key: Option<&str>,
        ) -> CollabResult<bool> {
            self.sent.lock().unwrap().push(recipient.to_string());
            Ok(true)
        }
    }

    struct FixedTicketing;

    #[async_trait]
    impl Ticketing for FixedTicketing {
        async fn create_issue(
            &self,
            _summary: &str,
            _description: &str,
            _labels: &[String],
        ) -> CollabResult<Option<String>> {
            Ok(Some("SUPPORT-42".to_string()))
        }

        async fn update_issue(
            &self,
            _key: &str,
            _comment: Option<&str>,
            _fields: Option<&serde_json::Value>,
        ) -> CollabResult<bool> {
            Ok(true)
        }
    }

    fn service_with(
        store: Store,
        notifier: Option<Arc<dyn EscalationNotifier>>,
        ticketing: Option<Arc<dyn Ticketing>>,
    ) -> ConversationService {
        let audit = AuditRecorder::new(store.clone());
        let channels = Arc::new(ChannelPolicyStore::load("/nonexistent/channels.toml").unwrap());
        ConversationService::new(
            store,
            audit,
            channels,
            Arc::new(FixedClassifier(QuestionType::Bug)),
            None,
            ticketing,
            notifier,
            Some("oncall@example.com".to_string()),
            DeadlineDefaults {
                sla_minutes: 120,
                first_response_minutes: 15,
            },
        )
    }

    fn test_service() -> ConversationService {
        service_with(Store::open_in_memory().unwrap(), None, None)
    }

    #[test]
    fn ingest_creates_and_dedups() {
        let service = test_service();

        let (conv1, msg1) = service
            .ingest_message("C1", "1000.0001", "1000.0001", "U1", "help", &[], None, false)
            .unwrap();
        let (conv2, msg2) = service
            .ingest_message("C1", "1000.0001", "1000.0001", "U1", "help", &[], None, false)
            .unwrap();

        assert_eq!(conv1.id, conv2.id);
        assert_eq!(msg1.id, msg2.id);
        assert_eq!(service.store().count_conversations().unwrap(), 1);
    }

    #[test]
    fn opener_messages_do_not_mark_first_response() {
        let service = test_service();

        let (conv, _) = service
            .ingest_message("C1", "1000.0001", "1000.0001", "U1", "help", &[], None, false)
            .unwrap();
        let fetched = service.store().get_conversation(&conv.id).unwrap();
        assert!(fetched.first_response_at.is_none());

        // A bot reply marks it
        service
            .ingest_message("C1", "1000.0001", "1000.0002", "BOT", "on it", &[], None, true)
            .unwrap();
        let fetched = service.store().get_conversation(&conv.id).unwrap();
        assert!(fetched.first_response_at.is_some());
    }

    #[tokio::test]
    async fn classify_tags_the_conversation() {
        let service = test_service();
        let (conv, _) = service
            .ingest_message("C1", "1000.0001", "1000.0001", "U1", "it broke", &[], None, false)
            .unwrap();

        let question_type = service.classify(&conv.id, "it broke").await.unwrap();
        assert_eq!(question_type, QuestionType::Bug);

        let fetched = service.store().get_conversation(&conv.id).unwrap();
        assert_eq!(fetched.question_type, Some(QuestionType::Bug));
    }

    #[test]
    fn summary_draft_and_reject_loop() {
        let service = test_service();
        let (conv, _) = service
            .ingest_message("C1", "1000.0001", "1000.0001", "U1", "help", &[], None, false)
            .unwrap();

        assert!(service.draft_summary(&conv.id, "User needs help").unwrap());
        let fetched = service.store().get_conversation(&conv.id).unwrap();
        assert_eq!(fetched.status, ConversationStatus::WaitingApproval);
        assert_eq!(fetched.summary.as_deref(), Some("User needs help"));
        assert!(!fetched.summary_confirmed);

        assert!(service
            .reject_summary(&conv.id, "U1", Some("User needs help with billing"))
            .unwrap());
        let fetched = service.store().get_conversation(&conv.id).unwrap();
        assert_eq!(fetched.status, ConversationStatus::Active);
        assert_eq!(
            fetched.summary.as_deref(),
            Some("User needs help with billing")
        );
    }

    #[test]
    fn approve_summary_confirms_and_audits() {
        let service = test_service();
        let (conv, _) = service
            .ingest_message("C1", "1000.0001", "1000.0001", "U1", "help", &[], None, false)
            .unwrap();
        service.draft_summary(&conv.id, "Summary").unwrap();
        service.approve_summary(&conv.id, "U1").unwrap();

        let fetched = service.store().get_conversation(&conv.id).unwrap();
        assert!(fetched.summary_confirmed);

        let events = service
            .store()
            .list_audit_events(10, Some("summary_approval"))
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].result.as_deref(), Some("approved"));
    }

    #[tokio::test]
    async fn resolve_sets_timestamp_and_status() {
        let service = test_service();
        let (conv, _) = service
            .ingest_message("C1", "1000.0001", "1000.0001", "U1", "help", &[], None, false)
            .unwrap();

        assert!(service.resolve(&conv.id, Some("U1")).await.unwrap());
        let fetched = service.store().get_conversation(&conv.id).unwrap();
        assert_eq!(fetched.status, ConversationStatus::Resolved);
        let first_resolved_at = fetched.resolved_at.unwrap();

        // Duplicate resolve keeps the original timestamp and fails the
        // transition non-fatally (audited, no mutation)
        let result = service.resolve(&conv.id, Some("U1")).await;
        assert!(matches!(result, Err(CoreError::Transition(_))));
        let fetched = service.store().get_conversation(&conv.id).unwrap();
        assert_eq!(fetched.resolved_at.unwrap(), first_resolved_at);
    }

    #[tokio::test]
    async fn escalate_transitions_tickets_and_notifies() {
        let notifier = Arc::new(RecordingNotifier::default());
        let store = Store::open_in_memory().unwrap();
        let service = service_with(
            store,
            Some(notifier.clone() as Arc<dyn EscalationNotifier>),
            Some(Arc::new(FixedTicketing) as Arc<dyn Ticketing>),
        );

        let (conv, _) = service
            .ingest_message("C1", "1000.0001", "1000.0001", "U1", "help", &[], None, false)
            .unwrap();

        service.escalate(&conv.id, None, "sla_breach").await.unwrap();

        let fetched = service.store().get_conversation(&conv.id).unwrap();
        assert_eq!(fetched.status, ConversationStatus::Escalated);
        assert_eq!(fetched.ticket_key.as_deref(), Some("SUPPORT-42"));
        assert_eq!(notifier.sent.lock().unwrap().as_slice(), ["oncall@example.com"]);

        let notices = service
            .store()
            .list_audit_events(10, Some("escalation_notice"))
            .unwrap();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].result.as_deref(), Some("sent"));
        let tickets = service
            .store()
            .list_audit_events(10, Some("ticket_create"))
            .unwrap();
        assert_eq!(tickets.len(), 1);
    }

    #[tokio::test]
    async fn escalated_conversation_can_resolve_then_close() {
        let service = test_service();
        let (conv, _) = service
            .ingest_message("C1", "1000.0001", "1000.0001", "U1", "help", &[], None, false)
            .unwrap();

        service.escalate(&conv.id, None, "manual").await.unwrap();
        assert!(service.resolve(&conv.id, None).await.unwrap());
        assert!(service.close(&conv.id, None).unwrap());

        let fetched = service.store().get_conversation(&conv.id).unwrap();
        assert_eq!(fetched.status, ConversationStatus::Closed);
    }

    #[test]
    fn invalid_transition_is_audited_without_mutation() {
        let service = test_service();
        let (conv, _) = service
            .ingest_message("C1", "1000.0001", "1000.0001", "U1", "help", &[], None, false)
            .unwrap();

        // SummaryRejected is not valid from ACTIVE
        let result = service.reject_summary(&conv.id, "U1", None);
        assert!(matches!(result, Err(CoreError::Transition(_))));

        let fetched = service.store().get_conversation(&conv.id).unwrap();
        assert_eq!(fetched.status, ConversationStatus::Active);

        let events = service
            .store()
            .list_audit_events(10, Some("status_transition"))
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].result.as_deref(), Some("invalid_transition"));
    }

    #[tokio::test]
    async fn generate_answer_requires_confirmed_summary() {
        use crate::collab::Answer;
        use std::io::Write;

        struct FixedAnswerService;

        #[async_trait]
        impl crate::collab::AnswerService for FixedAnswerService {
            async fn answer(
                &self,
                _question: &str,
                index_name: &str,
                _params: &crate::config::RetrievalParams,
            ) -> CollabResult<Answer> {
                Ok(Answer {
                    answer: format!("answer from {index_name}"),
                    citations: vec!["doc-1".to_string()],
                    retrieved_count: 1,
                })
            }
        }

        let mut channels_file = tempfile::NamedTempFile::new().unwrap();
        channels_file
            .write_all(
                br#"
[[channels]]
channel_id = "C1"
name = "platform-support"
rag_index = "kb-platform"
"#,
            )
            .unwrap();
        let channels = Arc::new(ChannelPolicyStore::load(channels_file.path()).unwrap());

        let store = Store::open_in_memory().unwrap();
        let audit = AuditRecorder::new(store.clone());
        let service = ConversationService::new(
            store,
            audit,
            channels,
            Arc::new(FixedClassifier(QuestionType::HowTo)),
            Some(Arc::new(FixedAnswerService)),
            None,
            None,
            None,
            DeadlineDefaults {
                sla_minutes: 120,
                first_response_minutes: 15,
            },
        );

        let (conv, _) = service
            .ingest_message("C1", "1000.0001", "1000.0001", "U1", "how do i", &[], None, false)
            .unwrap();
        service.draft_summary(&conv.id, "User asks how to").unwrap();

        // Unconfirmed summary is a validation failure, no state change
        let err = service.generate_answer(&conv.id).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));

        service.approve_summary(&conv.id, "U1").unwrap();
        let answer = service.generate_answer(&conv.id).await.unwrap().unwrap();
        assert_eq!(answer.answer, "answer from kb-platform");
        assert_eq!(answer.retrieved_count, 1);

        let fetched = service.store().get_conversation(&conv.id).unwrap();
        assert_eq!(fetched.rag_index.as_deref(), Some("kb-platform"));
    }

    #[test]
    fn reaction_feedback_paths() {
        let service = test_service();
        let (conv, _) = service
            .ingest_message("C1", "1000.0001", "1000.0001", "U1", "help", &[], None, false)
            .unwrap();
        service
            .ingest_message("C1", "1000.0001", "1000.0002", "BOT", "answer", &[], None, true)
            .unwrap();

        // Mapped reaction creates a row
        let saved = service.record_reaction("1000.0002", "U1", "+1").unwrap();
        assert!(saved.is_some());

        // Unmapped reaction creates nothing
        let ignored = service.record_reaction("1000.0002", "U1", "tada").unwrap();
        assert!(ignored.is_none());

        // Reaction on an unknown message creates nothing
        let missing = service.record_reaction("9999.0000", "U1", "+1").unwrap();
        assert!(missing.is_none());

        assert_eq!(
            service
                .store()
                .feedback_counts_for_conversation(&conv.id)
                .unwrap(),
            (1, 1)
        );
    }
}
