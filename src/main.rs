//! Supportline - support conversation orchestration backend
//!
//! A Rust backend implementing the conversation and action approval
//! state machines behind a chat-based support assistant.

mod api;
mod audit;
mod collab;
mod config;
mod error;
mod feedback;
mod ingest;
mod lifecycle;
mod service;
mod sla;
mod store;

use api::{create_router, AppState};
use audit::AuditRecorder;
use collab::{
    ActionExecutor, AnswerService, Classifier, EscalationNotifier, HttpActionExecutor,
    HttpAnswerService, HttpClassifier, KeywordClassifier, RestTicketing, SmtpNotifier, Ticketing,
};
use config::{ChannelPolicyStore, Settings};
use ingest::EventRouter;
use service::conversations::DeadlineDefaults;
use service::{ActionService, ConversationService};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use store::Store;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "supportline=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    // Configuration is read once and injected; only the channel policy
    // has a reload operation, and that goes through the audited API.
    let settings = Settings::from_env();

    // Ensure database directory exists
    if let Some(parent) = PathBuf::from(&settings.db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %settings.db_path, "Opening store");
    let store = Store::open(&settings.db_path)?;

    let channels = Arc::new(ChannelPolicyStore::load(&settings.channels_path)?);
    if channels.list().is_empty() {
        tracing::warn!(
            path = %settings.channels_path,
            "No channels configured; all inbound events will be ignored"
        );
    }

    let audit = AuditRecorder::new(store.clone());

    // Collaborator adapters; each is optional and absent adapters make
    // the corresponding branch an explicit no-client outcome.
    let classifier: Arc<dyn Classifier> = match &settings.classifier_url {
        Some(url) => Arc::new(HttpClassifier::new(url.clone())),
        None => {
            tracing::warn!("No classifier endpoint configured; using keyword fallback");
            Arc::new(KeywordClassifier)
        }
    };

    let answerer: Option<Arc<dyn AnswerService>> = settings
        .answer_url
        .as_ref()
        .map(|url| Arc::new(HttpAnswerService::new(url.clone())) as Arc<dyn AnswerService>);
    if answerer.is_none() {
        tracing::warn!("No answer endpoint configured; summaries will not produce answers");
    }

    let ticketing: Option<Arc<dyn Ticketing>> = match (
        &settings.ticket_base_url,
        &settings.ticket_username,
        &settings.ticket_api_token,
    ) {
        (Some(url), Some(username), Some(token)) => Some(Arc::new(RestTicketing::new(
            url.clone(),
            username.clone(),
            token.clone(),
            settings.ticket_project_key.clone(),
        ))),
        _ => {
            tracing::warn!("Ticketing not configured");
            None
        }
    };

    let notifier: Option<Arc<dyn EscalationNotifier>> = match (&settings.smtp_host, &settings.smtp_from)
    {
        (Some(host), Some(from)) => match SmtpNotifier::new(
            host,
            settings.smtp_port,
            settings.smtp_username.as_deref(),
            settings.smtp_password.as_deref(),
            from,
        ) {
            Ok(notifier) => Some(Arc::new(notifier)),
            Err(e) => {
                tracing::warn!(error = %e, "SMTP notifier unavailable");
                None
            }
        },
        _ => {
            tracing::warn!("Escalation email not configured");
            None
        }
    };

    let executor: Option<Arc<dyn ActionExecutor>> = settings
        .executor_url
        .as_ref()
        .map(|url| Arc::new(HttpActionExecutor::new(url.clone())) as Arc<dyn ActionExecutor>);
    if executor.is_none() {
        tracing::warn!("Action executor not configured; approved actions will not run");
    }

    let conversations = ConversationService::new(
        store.clone(),
        audit.clone(),
        channels.clone(),
        classifier,
        answerer,
        ticketing,
        notifier,
        settings.escalation_recipient.clone(),
        DeadlineDefaults {
            sla_minutes: settings.default_sla_minutes,
            first_response_minutes: settings.default_first_response_minutes,
        },
    );
    let actions = ActionService::new(store.clone(), audit, channels.clone(), executor);
    let router = EventRouter::new(conversations.clone(), actions);

    // SLA sweeps run on their own schedule, never from ingestion
    tokio::spawn(sla::run_scheduler(
        conversations,
        Duration::from_secs(settings.sla_scan_interval_secs),
    ));

    let state = AppState::new(router, store, channels);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state).layer(cors);

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    tracing::info!("Supportline listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
