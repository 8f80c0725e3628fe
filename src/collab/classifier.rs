//! Question type classification
//!
//! The classifier contract is infallible by design: whatever goes
//! wrong inside an adapter, the state machine receives a default label
//! rather than an error.

use crate::store::QuestionType;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classify a message. Must return `QuestionType::Other` on any
    /// internal failure, never an error.
    async fn classify(&self, text: &str) -> QuestionType;
}

/// Adapter for an HTTP classification endpoint
pub struct HttpClassifier {
    client: Client,
    endpoint: String,
}

#[derive(Deserialize)]
struct ClassifyResponse {
    label: String,
}

impl HttpClassifier {
    pub fn new(endpoint: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { client, endpoint }
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, text: &str) -> QuestionType {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await;

        let parsed: Result<ClassifyResponse, _> = match response {
            Ok(resp) => resp.json().await,
            Err(e) => {
                tracing::warn!(error = %e, "Classifier request failed, defaulting to 'other'");
                return QuestionType::Other;
            }
        };

        match parsed {
            Ok(body) => QuestionType::from_code(&body.label).unwrap_or_else(|| {
                tracing::warn!(label = %body.label, "Classifier returned unknown label");
                QuestionType::Other
            }),
            Err(e) => {
                tracing::warn!(error = %e, "Classifier response unreadable, defaulting to 'other'");
                QuestionType::Other
            }
        }
    }
}

/// Keyword fallback used when no classifier endpoint is configured
pub struct KeywordClassifier;

#[async_trait]
impl Classifier for KeywordClassifier {
    async fn classify(&self, text: &str) -> QuestionType {
        let lower = text.to_lowercase();

        if ["error", "bug", "broken", "crash", "not working", "doesn't work"]
            .iter()
            .any(|kw| lower.contains(kw))
        {
            QuestionType::Bug
        } else if ["restart", "clear cache", "redeploy", "rotate", "provision"]
            .iter()
            .any(|kw| lower.contains(kw))
        {
            QuestionType::OpsAction
        } else if lower.starts_with("how ") || lower.contains("how to") || lower.contains("how do i")
        {
            QuestionType::HowTo
        } else if ["feature request", "could you add", "would be great if", "please add"]
            .iter()
            .any(|kw| lower.contains(kw))
        {
            QuestionType::FeatureRequest
        } else {
            QuestionType::Other
        }
    }
}
