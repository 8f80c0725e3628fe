//! Runtime configuration
//!
//! Settings are read once from the environment at startup and injected
//! as an immutable value. The per-channel policy file is the one piece
//! with an explicit reload operation, and that reload is audited.

pub mod channels;

pub use channels::{ChannelConfig, ChannelPolicies, ChannelPolicyStore, RetrievalParams};

/// Immutable application settings, constructed once in main
#[derive(Debug, Clone)]
pub struct Settings {
    pub db_path: String,
    pub port: u16,
    pub channels_path: String,
    pub sla_scan_interval_secs: u64,
    pub default_sla_minutes: i64,
    pub default_first_response_minutes: i64,
    pub classifier_url: Option<String>,
    pub answer_url: Option<String>,
    pub executor_url: Option<String>,
    pub ticket_base_url: Option<String>,
    pub ticket_username: Option<String>,
    pub ticket_api_token: Option<String>,
    pub ticket_project_key: String,
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_from: Option<String>,
    pub escalation_recipient: Option<String>,
}

impl Settings {
    pub fn from_env() -> Self {
        let db_path = std::env::var("SUPPORTLINE_DB_PATH").unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            format!("{home}/.supportline/supportline.db")
        });

        let port = std::env::var("SUPPORTLINE_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8000);

        let channels_path = std::env::var("SUPPORTLINE_CHANNELS_PATH")
            .unwrap_or_else(|_| "config/channels.toml".to_string());

        let sla_scan_interval_secs = std::env::var("SUPPORTLINE_SLA_SCAN_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60);

        let default_sla_minutes = std::env::var("SUPPORTLINE_DEFAULT_SLA_MINUTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(120);

        let default_first_response_minutes =
            std::env::var("SUPPORTLINE_DEFAULT_FIRST_RESPONSE_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(15);

        Self {
            db_path,
            port,
            channels_path,
            sla_scan_interval_secs,
            default_sla_minutes,
            default_first_response_minutes,
            classifier_url: std::env::var("SUPPORTLINE_CLASSIFIER_URL").ok(),
            answer_url: std::env::var("SUPPORTLINE_ANSWER_URL").ok(),
            executor_url: std::env::var("SUPPORTLINE_EXECUTOR_URL").ok(),
            ticket_base_url: std::env::var("SUPPORTLINE_TICKET_URL").ok(),
            ticket_username: std::env::var("SUPPORTLINE_TICKET_USERNAME").ok(),
            ticket_api_token: std::env::var("SUPPORTLINE_TICKET_TOKEN").ok(),
            ticket_project_key: std::env::var("SUPPORTLINE_TICKET_PROJECT")
                .unwrap_or_else(|_| "SUPPORT".to_string()),
            smtp_host: std::env::var("SUPPORTLINE_SMTP_HOST").ok(),
            smtp_port: std::env::var("SUPPORTLINE_SMTP_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(587),
            smtp_username: std::env::var("SUPPORTLINE_SMTP_USERNAME").ok(),
            smtp_password: std::env::var("SUPPORTLINE_SMTP_PASSWORD").ok(),
            smtp_from: std::env::var("SUPPORTLINE_SMTP_FROM").ok(),
            escalation_recipient: std::env::var("SUPPORTLINE_ESCALATION_RECIPIENT").ok(),
        }
    }
}
