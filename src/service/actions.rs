//! Privileged action orchestration
//!
//! Ordering contract: APPROVED and RUNNING are committed before the
//! external executor is invoked, and the outcome is committed after it
//! returns. A crash mid-execution therefore leaves a resumable,
//! audit-visible RUNNING row. Executors are invoked at least once;
//! idempotency is their burden.

use crate::audit::{AuditEntry, AuditKind, AuditRecorder};
use crate::collab::ActionExecutor;
use crate::config::ChannelPolicyStore;
use crate::error::{CoreError, CoreResult};
use crate::lifecycle::{action, ActionEvent, TransitionError};
use crate::store::{ActionRun, ActionStatus, Conversation, Store};
use chrono::Utc;
use std::sync::Arc;

#[derive(Clone)]
pub struct ActionService {
    store: Store,
    audit: AuditRecorder,
    channels: Arc<ChannelPolicyStore>,
    executor: Option<Arc<dyn ActionExecutor>>,
}

impl ActionService {
    pub fn new(
        store: Store,
        audit: AuditRecorder,
        channels: Arc<ChannelPolicyStore>,
        executor: Option<Arc<dyn ActionExecutor>>,
    ) -> Self {
        Self {
            store,
            audit,
            channels,
            executor,
        }
    }

    /// Request a privileged action for a conversation. The action name
    /// must be on the channel's whitelist; everything starts in
    /// PENDING_APPROVAL.
    pub fn request(
        &self,
        conversation_id: &str,
        action_name: &str,
        parameters: Option<&serde_json::Value>,
    ) -> CoreResult<ActionRun> {
        let conversation = self.store.get_conversation(conversation_id)?;

        let allowed = self
            .channels
            .get(&conversation.channel_id)
            .is_some_and(|cfg| cfg.allows_action(action_name));
        if !allowed {
            self.audit.record(
                AuditKind::ActionRequested,
                self.entry_for(&conversation, action_name, parameters)
                    .result("rejected_not_whitelisted"),
            );
            return Err(CoreError::Validation(format!(
                "action '{action_name}' is not whitelisted for channel {}",
                conversation.channel_id
            )));
        }

        // Per-channel daily cap over the append-only run history
        let cap = self
            .channels
            .get(&conversation.channel_id)
            .map(|cfg| cfg.policies.max_actions_per_day)
            .unwrap_or_default();
        let since = Utc::now() - chrono::Duration::days(1);
        let recent = self
            .store
            .count_action_runs_for_channel_since(&conversation.channel_id, since)?;
        if recent >= cap {
            self.audit.record(
                AuditKind::ActionRequested,
                self.entry_for(&conversation, action_name, parameters)
                    .result("rejected_daily_cap"),
            );
            return Err(CoreError::Validation(format!(
                "channel {} reached its daily action cap ({cap})",
                conversation.channel_id
            )));
        }

        let run = self
            .store
            .create_action_run(conversation_id, action_name, parameters)?;

        self.audit.record(
            AuditKind::ActionRequested,
            self.entry_for(&conversation, action_name, parameters)
                .result("pending_approval"),
        );
        Ok(run)
    }

    /// Approve a pending action.
    ///
    /// The approver-set membership check is a hard precondition: it
    /// runs before any state mutation, and a failing identity leaves
    /// the run untouched with a single "unauthorized" audit event.
    pub fn approve(&self, action_id: &str, actor: &str) -> CoreResult<ActionRun> {
        let run = self.store.get_action_run(action_id)?;
        let conversation = self.store.get_conversation(&run.conversation_id)?;

        let authorized = self
            .channels
            .get(&conversation.channel_id)
            .is_some_and(|cfg| cfg.is_approver(actor));
        if !authorized {
            self.audit.record(
                AuditKind::AuthorizationCheck,
                self.entry_for(&conversation, &run.action_name, run.parameters.as_ref())
                    .actor(actor)
                    .result("unauthorized"),
            );
            return Err(CoreError::Unauthorized(format!(
                "{actor} is not an approver for channel {}",
                conversation.channel_id
            )));
        }

        self.check_transition(&run, ActionEvent::Approve, Some(actor), &conversation)?;

        let applied = self.store.approve_action(action_id, actor, Utc::now())?;
        if !applied {
            return Err(self.lost_race(action_id, ActionEvent::Approve, Some(actor), &conversation)?);
        }

        self.audit.record(
            AuditKind::ActionApproval,
            self.entry_for(&conversation, &run.action_name, run.parameters.as_ref())
                .actor(actor)
                .result("approved"),
        );
        self.store.get_action_run(action_id).map_err(CoreError::from)
    }

    /// Reject a pending action
    pub fn reject(&self, action_id: &str, actor: &str) -> CoreResult<ActionRun> {
        let run = self.store.get_action_run(action_id)?;
        let conversation = self.store.get_conversation(&run.conversation_id)?;

        self.check_transition(&run, ActionEvent::Reject, Some(actor), &conversation)?;

        let applied = self.store.reject_action(action_id)?;
        if !applied {
            return Err(self.lost_race(action_id, ActionEvent::Reject, Some(actor), &conversation)?);
        }

        self.audit.record(
            AuditKind::ActionRejected,
            self.entry_for(&conversation, &run.action_name, run.parameters.as_ref())
                .actor(actor)
                .result("rejected"),
        );
        self.store.get_action_run(action_id).map_err(CoreError::from)
    }

    /// Execute an approved action through the external executor.
    ///
    /// RUNNING is committed before the call; the outcome afterward.
    pub async fn execute(&self, action_id: &str) -> CoreResult<ActionRun> {
        let run = self.store.get_action_run(action_id)?;
        let conversation = self.store.get_conversation(&run.conversation_id)?;

        let Some(executor) = self.executor.clone() else {
            // No-client branch: the run stays APPROVED and resumable
            return Err(CoreError::ExternalService(
                "action executor is not configured".to_string(),
            ));
        };

        self.check_transition(&run, ActionEvent::Start, None, &conversation)?;
        let applied = self.store.start_action(action_id, Utc::now())?;
        if !applied {
            return Err(self.lost_race(action_id, ActionEvent::Start, None, &conversation)?);
        }

        let outcome = executor.execute(&run.action_name, run.parameters.as_ref()).await;

        let entry = self.entry_for(&conversation, &run.action_name, run.parameters.as_ref());
        match outcome {
            Ok(output) => {
                self.store
                    .complete_action(action_id, &output.output, &output.logs, Utc::now())?;
                self.audit
                    .record(AuditKind::ActionExecution, entry.result("completed"));
            }
            Err(e) => {
                tracing::warn!(action_id = %action_id, error = %e, "Action execution failed");
                self.store
                    .fail_action(action_id, &e.to_string(), &[], Utc::now())?;
                self.audit
                    .record(AuditKind::ActionExecution, entry.result("failed").error(e.to_string()));
            }
        }

        self.store.get_action_run(action_id).map_err(CoreError::from)
    }

    /// Cancel a run that has not yet reached a terminal status
    pub fn cancel(&self, action_id: &str, actor: &str) -> CoreResult<ActionRun> {
        let run = self.store.get_action_run(action_id)?;
        let conversation = self.store.get_conversation(&run.conversation_id)?;

        self.check_transition(&run, ActionEvent::Cancel, Some(actor), &conversation)?;

        let applied = self.store.cancel_action(action_id)?;
        if !applied {
            return Err(self.lost_race(action_id, ActionEvent::Cancel, Some(actor), &conversation)?);
        }
        self.store.get_action_run(action_id).map_err(CoreError::from)
    }

    fn entry_for(
        &self,
        conversation: &Conversation,
        action_name: &str,
        parameters: Option<&serde_json::Value>,
    ) -> AuditEntry {
        AuditEntry::new()
            .channel(conversation.channel_id.clone())
            .thread(conversation.thread_ts.clone())
            .payload(&serde_json::json!({
                "action": action_name,
                "parameters": parameters,
            }))
    }

    /// Validate against the pure table; a rejection is audited and
    /// performs no mutation.
    fn check_transition(
        &self,
        run: &ActionRun,
        event: ActionEvent,
        actor: Option<&str>,
        conversation: &Conversation,
    ) -> CoreResult<()> {
        if let Err(e) = action::transition(run.status, event) {
            self.audit_invalid(run.status, event, actor, conversation);
            return Err(CoreError::Transition(e));
        }
        Ok(())
    }

    /// A CAS that matched zero rows: re-read and report the transition
    /// the concurrent winner made impossible.
    fn lost_race(
        &self,
        action_id: &str,
        event: ActionEvent,
        actor: Option<&str>,
        conversation: &Conversation,
    ) -> CoreResult<CoreError> {
        let current = self.store.get_action_run(action_id)?;
        self.audit_invalid(current.status, event, actor, conversation);
        Ok(CoreError::Transition(TransitionError::invalid(
            current.status,
            event,
        )))
    }

    fn audit_invalid(
        &self,
        from: ActionStatus,
        event: ActionEvent,
        actor: Option<&str>,
        conversation: &Conversation,
    ) {
        let mut entry = AuditEntry::new()
            .channel(conversation.channel_id.clone())
            .thread(conversation.thread_ts.clone())
            .result("invalid_transition")
            .error(TransitionError::invalid(from, event).to_string());
        if let Some(actor) = actor {
            entry = entry.actor(actor);
        }
        self.audit.record(AuditKind::StatusTransition, entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{ActionOutput, CollabError, CollabResult};
    use async_trait::async_trait;
    use std::io::Write;
    use std::sync::atomic::{AtomicU32, Ordering};

    const CHANNELS: &str = r#"
[[channels]]
channel_id = "C1"
name = "platform-support"
rag_index = "kb-platform"
approvers = ["U100"]

[channels.policies]
action_whitelist = ["restart_service"]
max_actions_per_day = 3
"#;

    struct FixedExecutor {
        fail: bool,
        calls: AtomicU32,
    }

    impl FixedExecutor {
        fn new(fail: bool) -> Self {
            Self {
                fail,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl ActionExecutor for FixedExecutor {
        async fn execute(
            &self,
            _action_name: &str,
            _parameters: Option<&serde_json::Value>,
        ) -> CollabResult<ActionOutput> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(CollabError::BadResponse("boom".to_string()))
            } else {
                Ok(ActionOutput {
                    output: "restarted".to_string(),
                    logs: vec!["stopping".to_string(), "starting".to_string()],
                })
            }
        }
    }

    struct Fixture {
        store: Store,
        service: ActionService,
        conversation_id: String,
        _channels_file: tempfile::NamedTempFile,
    }

    fn fixture(executor: Option<Arc<dyn ActionExecutor>>) -> Fixture {
        let mut channels_file = tempfile::NamedTempFile::new().unwrap();
        channels_file.write_all(CHANNELS.as_bytes()).unwrap();
        let channels = Arc::new(ChannelPolicyStore::load(channels_file.path()).unwrap());

        let store = Store::open_in_memory().unwrap();
        let conversation = store
            .get_or_create_conversation("C1", "1000.0001", "U1", 120, 15)
            .unwrap();

        let audit = AuditRecorder::new(store.clone());
        let service = ActionService::new(store.clone(), audit, channels, executor);
        Fixture {
            store,
            service,
            conversation_id: conversation.id,
            _channels_file: channels_file,
        }
    }

    #[test]
    fn request_requires_whitelist() {
        let f = fixture(None);

        let run = f
            .service
            .request(&f.conversation_id, "restart_service", None)
            .unwrap();
        assert_eq!(run.status, ActionStatus::PendingApproval);

        let err = f
            .service
            .request(&f.conversation_id, "drop_database", None)
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));

        let requested = f.store.list_audit_events(10, Some("action_requested")).unwrap();
        assert_eq!(requested.len(), 2);
    }

    #[test]
    fn request_enforces_daily_cap() {
        let f = fixture(None);

        for _ in 0..3 {
            f.service
                .request(&f.conversation_id, "restart_service", None)
                .unwrap();
        }

        let err = f
            .service
            .request(&f.conversation_id, "restart_service", None)
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));

        let requested = f.store.list_audit_events(10, Some("action_requested")).unwrap();
        assert_eq!(requested.len(), 4);
        assert!(requested
            .iter()
            .any(|e| e.result.as_deref() == Some("rejected_daily_cap")));
    }

    #[test]
    fn unauthorized_approval_leaves_pending_and_audits_once() {
        let f = fixture(None);
        let run = f
            .service
            .request(&f.conversation_id, "restart_service", None)
            .unwrap();

        let err = f.service.approve(&run.id, "U999").unwrap_err();
        assert!(matches!(err, CoreError::Unauthorized(_)));

        let fetched = f.store.get_action_run(&run.id).unwrap();
        assert_eq!(fetched.status, ActionStatus::PendingApproval);

        let checks = f
            .store
            .list_audit_events(10, Some("authorization_check"))
            .unwrap();
        assert_eq!(checks.len(), 1);
        assert_eq!(checks[0].result.as_deref(), Some("unauthorized"));
        assert_eq!(checks[0].actor_id.as_deref(), Some("U999"));
    }

    #[test]
    fn authorized_approval_moves_to_approved() {
        let f = fixture(None);
        let run = f
            .service
            .request(&f.conversation_id, "restart_service", None)
            .unwrap();

        let approved = f.service.approve(&run.id, "U100").unwrap();
        assert_eq!(approved.status, ActionStatus::Approved);
        assert_eq!(approved.approved_by.as_deref(), Some("U100"));
        assert!(approved.approved_at.is_some());
    }

    #[tokio::test]
    async fn execute_commits_running_then_completed() {
        let executor = Arc::new(FixedExecutor::new(false));
        let f = fixture(Some(executor.clone() as Arc<dyn ActionExecutor>));
        let run = f
            .service
            .request(&f.conversation_id, "restart_service", None)
            .unwrap();
        f.service.approve(&run.id, "U100").unwrap();

        let finished = f.service.execute(&run.id).await.unwrap();
        assert_eq!(finished.status, ActionStatus::Completed);
        assert_eq!(finished.output.as_deref(), Some("restarted"));
        assert_eq!(finished.logs.len(), 2);
        assert!(finished.started_at.is_some());
        assert!(finished.completed_at.is_some());
        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);

        let executions = f.store.list_audit_events(10, Some("action_execution")).unwrap();
        assert_eq!(executions.len(), 1);
        assert_eq!(executions[0].result.as_deref(), Some("completed"));
    }

    #[tokio::test]
    async fn executor_failure_marks_run_failed() {
        let f = fixture(Some(Arc::new(FixedExecutor::new(true)) as Arc<dyn ActionExecutor>));
        let run = f
            .service
            .request(&f.conversation_id, "restart_service", None)
            .unwrap();
        f.service.approve(&run.id, "U100").unwrap();

        let finished = f.service.execute(&run.id).await.unwrap();
        assert_eq!(finished.status, ActionStatus::Failed);
        assert!(finished.error.as_deref().unwrap().contains("boom"));

        let executions = f.store.list_audit_events(10, Some("action_execution")).unwrap();
        assert_eq!(executions[0].result.as_deref(), Some("failed"));
    }

    #[tokio::test]
    async fn missing_executor_leaves_run_approved() {
        let f = fixture(None);
        let run = f
            .service
            .request(&f.conversation_id, "restart_service", None)
            .unwrap();
        f.service.approve(&run.id, "U100").unwrap();

        let err = f.service.execute(&run.id).await.unwrap_err();
        assert!(matches!(err, CoreError::ExternalService(_)));

        let fetched = f.store.get_action_run(&run.id).unwrap();
        assert_eq!(fetched.status, ActionStatus::Approved, "resumable");
    }

    #[tokio::test]
    async fn terminal_run_rejects_everything() {
        let f = fixture(Some(Arc::new(FixedExecutor::new(false)) as Arc<dyn ActionExecutor>));
        let run = f
            .service
            .request(&f.conversation_id, "restart_service", None)
            .unwrap();
        f.service.reject(&run.id, "U100").unwrap();

        assert!(matches!(
            f.service.approve(&run.id, "U100").unwrap_err(),
            CoreError::Transition(_)
        ));
        assert!(matches!(
            f.service.execute(&run.id).await.unwrap_err(),
            CoreError::Transition(_)
        ));
        assert!(matches!(
            f.service.cancel(&run.id, "U100").unwrap_err(),
            CoreError::Transition(_)
        ));

        let fetched = f.store.get_action_run(&run.id).unwrap();
        assert_eq!(fetched.status, ActionStatus::Rejected);
    }

    #[test]
    fn cancel_pending_run() {
        let f = fixture(None);
        let run = f
            .service
            .request(&f.conversation_id, "restart_service", None)
            .unwrap();

        let cancelled = f.service.cancel(&run.id, "U1").unwrap();
        assert_eq!(cancelled.status, ActionStatus::Cancelled);
    }

    #[test]
    fn unknown_action_is_not_found() {
        let f = fixture(None);
        let err = f.service.approve("missing", "U100").unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }
}
