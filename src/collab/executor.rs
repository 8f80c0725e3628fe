//! Approved-action execution boundary
//!
//! The core commits RUNNING before calling an executor and commits the
//! outcome after it returns. Drivers may retry, so invocation is
//! at-least-once: concrete actions must be idempotent.

use super::{CollabError, CollabResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

/// Result of one action execution
#[derive(Debug, Clone, Deserialize)]
pub struct ActionOutput {
    pub output: String,
    #[serde(default)]
    pub logs: Vec<String>,
}

#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(
        &self,
        action_name: &str,
        parameters: Option<&serde_json::Value>,
    ) -> CollabResult<ActionOutput>;
}

/// Adapter for an HTTP action runner
pub struct HttpActionExecutor {
    client: Client,
    endpoint: String,
}

impl HttpActionExecutor {
    pub fn new(endpoint: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .unwrap_or_default();
        Self { client, endpoint }
    }
}

#[async_trait]
impl ActionExecutor for HttpActionExecutor {
    async fn execute(
        &self,
        action_name: &str,
        parameters: Option<&serde_json::Value>,
    ) -> CollabResult<ActionOutput> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({
                "action": action_name,
                "parameters": parameters,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(CollabError::BadResponse(format!(
                "action runner returned {}",
                response.status()
            )));
        }

        Ok(response.json::<ActionOutput>().await?)
    }
}
