//! Ticketing system boundary

use super::{CollabError, CollabResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

#[async_trait]
pub trait Ticketing: Send + Sync {
    /// Create an issue; `Ok(None)` means the backend declined without
    /// failing (e.g. not configured upstream).
    async fn create_issue(
        &self,
        summary: &str,
        description: &str,
        labels: &[String],
    ) -> CollabResult<Option<String>>;

    /// Comment on and/or update fields of an existing issue
    async fn update_issue(
        &self,
        key: &str,
        comment: Option<&str>,
        fields: Option<&serde_json::Value>,
    ) -> CollabResult<bool>;
}

/// Jira-style REST adapter
pub struct RestTicketing {
    client: Client,
    base_url: String,
    username: String,
    api_token: String,
    project_key: String,
}

#[derive(Deserialize)]
struct CreateIssueResponse {
    key: String,
}

impl RestTicketing {
    pub fn new(base_url: String, username: String, api_token: String, project_key: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            username,
            api_token,
            project_key,
        }
    }
}

#[async_trait]
impl Ticketing for RestTicketing {
    async fn create_issue(
        &self,
        summary: &str,
        description: &str,
        labels: &[String],
    ) -> CollabResult<Option<String>> {
        let mut fields = serde_json::json!({
            "project": { "key": self.project_key },
            "summary": summary,
            "description": description,
            "issuetype": { "name": "Task" },
        });
        if !labels.is_empty() {
            fields["labels"] = serde_json::json!(labels);
        }

        let response = self
            .client
            .post(format!("{}/rest/api/2/issue", self.base_url))
            .basic_auth(&self.username, Some(&self.api_token))
            .json(&serde_json::json!({ "fields": fields }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(CollabError::BadResponse(format!(
                "ticket create returned {}",
                response.status()
            )));
        }

        let created: CreateIssueResponse = response.json().await?;
        tracing::info!(issue_key = %created.key, "Ticket created");
        Ok(Some(created.key))
    }

    async fn update_issue(
        &self,
        key: &str,
        comment: Option<&str>,
        fields: Option<&serde_json::Value>,
    ) -> CollabResult<bool> {
        if let Some(comment) = comment {
            let response = self
                .client
                .post(format!("{}/rest/api/2/issue/{key}/comment", self.base_url))
                .basic_auth(&self.username, Some(&self.api_token))
                .json(&serde_json::json!({ "body": comment }))
                .send()
                .await?;
            if !response.status().is_success() {
                return Ok(false);
            }
        }

        if let Some(fields) = fields {
            let response = self
                .client
                .put(format!("{}/rest/api/2/issue/{key}", self.base_url))
                .basic_auth(&self.username, Some(&self.api_token))
                .json(&serde_json::json!({ "fields": fields }))
                .send()
                .await?;
            if !response.status().is_success() {
                return Ok(false);
            }
        }

        tracing::info!(issue_key = %key, "Ticket updated");
        Ok(true)
    }
}
